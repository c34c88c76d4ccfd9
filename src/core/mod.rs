//! 核心层：错误、领域类型、会话门、设备注册表、计划请求、审批门、执行分发、工作流状态机与主控循环

pub mod approval;
pub mod dispatcher;
pub mod error;
pub mod orchestrator;
pub mod planner;
pub mod registry;
pub mod session;
pub mod state;
pub mod types;
pub mod workflow;

pub use approval::{ApprovalGate, ApprovedCommand, PendingApproval};
pub use dispatcher::ExecutionDispatcher;
pub use error::{
    ApprovalError, AuthError, ExecutionError, PlanError, TransportError, WorkflowError,
};
pub use orchestrator::{
    backends_from_config, create_workflow, spawn_workflow, Command, Services, WorkflowHandle,
};
pub use planner::PlanRequester;
pub use registry::DeviceRegistry;
pub use session::SessionGate;
pub use state::{reduce, Breadcrumb, UiState, WorkflowPhase, WorkflowSnapshot};
pub use types::{
    Device, DeviceKind, ExecutionResult, FileEntry, FileKind, Outcome, Plan, PlanStep,
};
pub use workflow::{Ticket, Workflow};
