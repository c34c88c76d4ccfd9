//! 状态定义：WorkflowSnapshot（显式、可序列化的领域状态）与 UiState 投影
//!
//! reduce 是纯函数：只根据快照计算每个动作的可用性、阶段、提示与面包屑，不修改任何领域状态。

use serde::Serialize;

use crate::core::approval::PendingApproval;
use crate::core::types::{Device, ExecutionResult, FileEntry, Plan, PlanStep};

pub const APPROVE_LABEL: &str = "Approve & Execute";
pub const EXECUTING_LABEL: &str = "Executing...";
pub const PLAN_MARKER: &str = "CourseCheck";
pub const APPROVAL_MARKER: &str = "Approve";

/// 工作流阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum WorkflowPhase {
    NoPlan,
    Planned,
    AwaitingApproval,
    Executing,
    Reviewed,
}

/// 与设备上下文绑定的错误提示；换设备时一起清空
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Banners {
    pub login: Option<String>,
    pub plan: Option<String>,
    pub approve: Option<String>,
    pub general: Option<String>,
}

impl Banners {
    pub fn clear_device_context(&mut self) {
        self.plan = None;
        self.approve = None;
        self.general = None;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileTreeView {
    pub device: String,
    pub path: String,
    pub entries: Vec<FileEntry>,
}

/// 工作流的完整领域状态快照
#[derive(Clone, Debug, Default, Serialize)]
pub struct WorkflowSnapshot {
    pub authenticated: bool,
    pub primary_devices: Vec<Device>,
    pub secondary_devices: Vec<Device>,
    pub selected_device: Option<Device>,
    pub plan: Option<Plan>,
    pub plan_in_flight: bool,
    pub pending_approval: Option<PendingApproval>,
    /// 任意一次执行仍在进行（批准按钮加锁）
    pub execution_in_flight: bool,
    /// 当前上下文下正在执行的命令
    pub executing_command: Option<String>,
    pub execution_result: Option<ExecutionResult>,
    pub banners: Banners,
    pub notice: Option<String>,
    pub session_log: Option<String>,
    pub file_tree: Option<FileTreeView>,
}

impl WorkflowSnapshot {
    pub fn phase(&self) -> WorkflowPhase {
        if self.executing_command.is_some() {
            WorkflowPhase::Executing
        } else if self.execution_result.is_some() {
            WorkflowPhase::Reviewed
        } else if self.pending_approval.is_some() {
            WorkflowPhase::AwaitingApproval
        } else if self.plan.is_some() {
            WorkflowPhase::Planned
        } else {
            WorkflowPhase::NoPlan
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    pub label: String,
    pub active: bool,
}

/// UI 看到的「投影」状态，轻量且易于渲染
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UiState {
    pub authenticated: bool,
    pub phase: WorkflowPhase,
    pub primary_devices: Vec<Device>,
    pub secondary_devices: Vec<Device>,
    pub selected_device: Option<Device>,
    pub plan_steps: Vec<PlanStep>,
    pub planning: bool,
    pub approval: Option<PendingApproval>,
    pub executing_command: Option<String>,
    pub execution: Option<ExecutionResult>,
    pub can_request_plan: bool,
    pub can_approve: bool,
    pub approve_label: String,
    pub status_hint: String,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub login_error: Option<String>,
    pub plan_error: Option<String>,
    pub approve_error: Option<String>,
    pub banner: Option<String>,
    pub notice: Option<String>,
    pub session_log: Option<String>,
    pub file_tree: Option<FileTreeView>,
}

impl Default for UiState {
    fn default() -> Self {
        reduce(&WorkflowSnapshot::default())
    }
}

fn breadcrumbs(snapshot: &WorkflowSnapshot) -> Vec<Breadcrumb> {
    let mut labels = vec!["Dashboard".to_string(), "Devices".to_string()];
    if let Some(device) = &snapshot.selected_device {
        labels.push(device.display_name.clone());
    }
    labels.push(PLAN_MARKER.to_string());
    if snapshot.pending_approval.is_some() {
        labels.push(APPROVAL_MARKER.to_string());
    }
    let last = labels.len() - 1;
    labels
        .into_iter()
        .enumerate()
        .map(|(i, label)| Breadcrumb {
            label,
            active: i == last,
        })
        .collect()
}

/// 由快照计算 UiState
pub fn reduce(snapshot: &WorkflowSnapshot) -> UiState {
    let can_request_plan = snapshot.selected_device.is_some();
    let can_approve = snapshot.pending_approval.is_some() && !snapshot.execution_in_flight;

    let status_hint = if !snapshot.authenticated {
        "Log in to continue."
    } else if snapshot.selected_device.is_none() {
        "Select a device to enable planning and execution."
    } else {
        "Device selected. You may run CourseCheck."
    };

    UiState {
        authenticated: snapshot.authenticated,
        phase: snapshot.phase(),
        primary_devices: snapshot.primary_devices.clone(),
        secondary_devices: snapshot.secondary_devices.clone(),
        selected_device: snapshot.selected_device.clone(),
        plan_steps: snapshot
            .plan
            .as_ref()
            .map(|p| p.steps.clone())
            .unwrap_or_default(),
        planning: snapshot.plan_in_flight,
        approval: snapshot.pending_approval.clone(),
        executing_command: snapshot.executing_command.clone(),
        execution: snapshot.execution_result.clone(),
        can_request_plan,
        can_approve,
        approve_label: if snapshot.execution_in_flight {
            EXECUTING_LABEL
        } else {
            APPROVE_LABEL
        }
        .to_string(),
        status_hint: status_hint.to_string(),
        breadcrumbs: breadcrumbs(snapshot),
        login_error: snapshot.banners.login.clone(),
        plan_error: snapshot.banners.plan.clone(),
        approve_error: snapshot.banners.approve.clone(),
        banner: snapshot.banners.general.clone(),
        notice: snapshot.notice.clone(),
        session_log: snapshot.session_log.clone(),
        file_tree: snapshot.file_tree.clone(),
    }
}
