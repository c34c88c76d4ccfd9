//! 工作流错误类型
//!
//! 每个外部边界调用的传输失败统一为 TransportError，再包进对应的领域错误（AuthError / PlanError / ExecutionError）；
//! 任何错误都只影响本地状态并展示给用户，不会终止进程。

use thiserror::Error;

/// 边界调用的传输层失败（网络、HTTP 状态、响应格式）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// 401：会话不存在或已过期，需要重新探测会话
    #[error("session expired or not authenticated")]
    Unauthorized,

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("malformed response: {0}")]
    Decode(String),

    /// 远端以结构化响应报告失败（如 `{"files": [], "error": "..."}`）
    #[error("{0}")]
    Remote(String),
}

/// 会话相关错误：登录失败、未登录、修改密码被拒
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("{0}")]
    InvalidCredentials(String),

    #[error("not logged in")]
    NotAuthenticated,

    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// 计划请求错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Please select a device first.")]
    NoDeviceSelected,

    #[error("Goal must not be empty.")]
    EmptyGoal,

    /// Planner 返回的错误，原样带上原始诊断内容
    #[error("Error: {message}\nRaw:\n{raw}")]
    Rejected { message: String, raw: String },

    /// 既没有 plan 也没有 error 的响应
    #[error("Unexpected planner response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// 审批门错误：没有待审批命令、设备不匹配
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("No planned command is awaiting approval.")]
    NothingPending,

    #[error("Please select a device first.")]
    NoDeviceSelected,

    /// 审批绑定的设备与当前选中设备不一致，拒绝执行
    #[error("Approval is bound to device {bound}, but {selected} is selected.")]
    DeviceMismatch { bound: String, selected: String },
}

/// 远程执行错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// 本地危险关键字拦截，未发出任何网络请求
    #[error("Command contains dangerous keyword: {0}")]
    Forbidden(String),

    #[error("{detail}")]
    Remote { detail: String, output: Option<String> },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// 工作流层面的错误（前置条件 + 各组件错误）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("not logged in")]
    NotAuthenticated,

    #[error("An approved command is already executing.")]
    ExecutionInFlight,

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Approval(#[from] ApprovalError),
}

impl TransportError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TransportError::Unauthorized)
    }
}

impl AuthError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AuthError::Transport(t) if t.is_unauthorized())
    }
}

impl PlanError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, PlanError::Transport(t) if t.is_unauthorized())
    }
}

impl ExecutionError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ExecutionError::Transport(t) if t.is_unauthorized())
    }

    /// 失败时展示的输出：有远端输出用输出，否则用错误信息
    pub fn display_output(&self) -> String {
        match self {
            ExecutionError::Remote {
                output: Some(out), ..
            } if !out.is_empty() => out.clone(),
            other => other.to_string(),
        }
    }
}
