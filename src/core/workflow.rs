//! Workflow：计划 → 审阅 → 批准 → 执行 状态机
//!
//! 所有领域状态的修改都是对单个事件（用户动作或网络调用完成）的原子反应。
//! 需要网络的操作分两段：begin_* 检查前置条件、修改本地状态并返回 Ticket；finish_* 带着 Ticket 回来，
//! 若期间发生了换设备 / 新计划 / 登录 / 登出（epoch 变化），结果被丢弃而不会落到新的上下文上。

use crate::core::approval::{ApprovalGate, ApprovedCommand, PendingApproval};
use crate::core::error::{
    ApprovalError, AuthError, ExecutionError, PlanError, TransportError, WorkflowError,
};
use crate::core::planner::validate_request;
use crate::core::state::{Banners, FileTreeView, WorkflowSnapshot};
use crate::core::types::{Device, DeviceKind, ExecutionResult, FileEntry, Outcome, Plan};

/// 异步调用发起时的上下文标记
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    /// 登录 / 登出时递增
    session: u64,
    /// 任何使下游失效的事件都递增（包含 session 变化）
    context: u64,
}

#[derive(Debug)]
struct InFlightExecution {
    ticket: Ticket,
    approval_id: uuid::Uuid,
    device: String,
    command: String,
}

#[derive(Debug, Default)]
pub struct Workflow {
    authenticated: bool,
    primary_devices: Vec<Device>,
    secondary_devices: Vec<Device>,
    selected: Option<Device>,
    plan: Option<Plan>,
    gate: ApprovalGate,
    execution: Option<ExecutionResult>,
    plan_in_flight: Option<Ticket>,
    execution_in_flight: Option<InFlightExecution>,
    banners: Banners,
    notice: Option<String>,
    session_log: Option<String>,
    file_tree: Option<FileTreeView>,
    /// 本轮刷新中尚未返回的设备池
    pools_pending: Vec<DeviceKind>,
    session_epoch: u64,
    context_epoch: u64,
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn selected_device(&self) -> Option<&Device> {
        self.selected.as_ref()
    }

    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    /// 通过 Approval Gate 读取当前 PendingApproval
    pub fn approval(&self) -> Option<&PendingApproval> {
        self.gate.current()
    }

    pub fn execution_result(&self) -> Option<&ExecutionResult> {
        self.execution.as_ref()
    }

    pub fn execution_in_flight(&self) -> bool {
        self.execution_in_flight.is_some()
    }

    pub fn ticket(&self) -> Ticket {
        Ticket {
            session: self.session_epoch,
            context: self.context_epoch,
        }
    }

    fn is_current(&self, ticket: Ticket) -> bool {
        ticket == self.ticket()
    }

    fn is_current_session(&self, ticket: Ticket) -> bool {
        ticket.session == self.session_epoch
    }

    /// 清空计划、审批、执行结果与设备相关提示，并让所有在途结果失效
    fn invalidate_downstream(&mut self) {
        self.gate.invalidate();
        self.plan = None;
        self.plan_in_flight = None;
        self.execution = None;
        self.file_tree = None;
        self.banners.clear_device_context();
        self.context_epoch += 1;
    }

    /// 登录 / 登出 / 会话过期：全量重置
    fn reset_session(&mut self, authenticated: bool) {
        self.invalidate_downstream();
        self.session_epoch += 1;
        self.authenticated = authenticated;
        self.primary_devices.clear();
        self.secondary_devices.clear();
        self.selected = None;
        self.pools_pending.clear();
        self.execution_in_flight = None;
        self.session_log = None;
        self.notice = None;
        self.banners = Banners::default();
    }

    fn require_session(&self) -> Result<(), WorkflowError> {
        if self.authenticated {
            Ok(())
        } else {
            Err(WorkflowError::NotAuthenticated)
        }
    }

    /// 会话探测结果；返回 true 表示刚进入已认证状态（调用方应加载仪表盘数据）。
    /// 发起后会话已变化（登录 / 登出）的探测结果被丢弃
    pub fn on_probe(&mut self, ticket: Ticket, authenticated: bool) -> bool {
        if !self.is_current_session(ticket) {
            tracing::debug!("dropping probe result from a previous session");
            return false;
        }
        if authenticated == self.authenticated {
            return false;
        }
        if authenticated {
            tracing::info!("session is authenticated");
        } else {
            tracing::warn!("session is no longer authenticated, resetting workflow");
        }
        self.reset_session(authenticated);
        authenticated
    }

    /// 登录结果；成功返回 true。失败只显示内联错误，不改变其它状态
    pub fn on_login(&mut self, ticket: Ticket, result: Result<(), AuthError>) -> bool {
        if !self.is_current_session(ticket) {
            tracing::debug!("dropping login result from a previous session");
            return false;
        }
        match result {
            Ok(()) => {
                self.reset_session(true);
                true
            }
            Err(e) => {
                self.banners.login = Some(e.to_string());
                false
            }
        }
    }

    /// 本地立即登出（远端登出尽力而为，由调用方另行发起）
    pub fn on_logout(&mut self) {
        tracing::info!("logged out locally");
        self.reset_session(false);
    }

    pub fn on_password_changed(&mut self, result: Result<String, AuthError>) {
        match result {
            Ok(detail) => {
                self.notice = Some(detail);
                self.banners.general = None;
            }
            Err(e) => {
                self.notice = None;
                self.banners.general = Some(format!("Password change failed: {e}"));
            }
        }
    }

    /// 开始刷新两个设备池
    pub fn begin_device_load(&mut self) -> Result<Ticket, WorkflowError> {
        self.require_session()?;
        self.pools_pending = DeviceKind::ALL.to_vec();
        Ok(self.ticket())
    }

    /// 刷新后已选设备不在任何设备池中：取消选择并清空下游（保留设备池加载错误提示）
    fn reconcile_selection(&mut self) {
        let Some(selected) = self.selected.as_ref() else {
            return;
        };
        let listed = self
            .primary_devices
            .iter()
            .chain(self.secondary_devices.iter())
            .any(|d| d.same_identity(selected));
        if listed {
            return;
        }
        tracing::warn!(device = %selected.identifier, "selected device is no longer listed, clearing selection");
        let pool_banner = self.banners.general.take();
        self.invalidate_downstream();
        self.banners.general = pool_banner;
        self.selected = None;
    }

    /// 设备池加载完成；会话已变化则丢弃。本轮两个池都返回后核对已选设备
    pub fn on_devices_loaded(
        &mut self,
        ticket: Ticket,
        kind: DeviceKind,
        result: Result<Vec<Device>, TransportError>,
    ) -> bool {
        if !self.is_current_session(ticket) {
            tracing::debug!(?kind, "dropping device list from a previous session");
            return false;
        }
        let loaded = match result {
            Ok(devices) => {
                match kind {
                    DeviceKind::Primary => self.primary_devices = devices,
                    DeviceKind::Secondary => self.secondary_devices = devices,
                }
                true
            }
            Err(e) => {
                match kind {
                    DeviceKind::Primary => self.primary_devices.clear(),
                    DeviceKind::Secondary => self.secondary_devices.clear(),
                }
                let pool = match kind {
                    DeviceKind::Primary => "primary",
                    DeviceKind::Secondary => "secondary",
                };
                tracing::warn!(pool, error = %e, "device pool failed to load");
                self.banners.general = Some(format!("Could not load {pool} devices: {e}"));
                false
            }
        };
        self.pools_pending.retain(|k| *k != kind);
        if self.pools_pending.is_empty() {
            self.reconcile_selection();
        }
        loaded
    }

    /// 选择设备；换成不同设备时清空下游一切。返回是否发生了变化
    pub fn select_device(&mut self, device: Device) -> Result<bool, WorkflowError> {
        self.require_session()?;
        if self
            .selected
            .as_ref()
            .map(|d| d.same_identity(&device))
            .unwrap_or(false)
        {
            return Ok(false);
        }
        tracing::info!(device = %device.identifier, name = %device.display_name, "device selected");
        self.invalidate_downstream();
        self.selected = Some(device);
        Ok(true)
    }

    /// 开始计划请求：先使旧审批失效（无论请求最终成功与否），返回 Ticket 与目标设备
    pub fn begin_plan(&mut self, goal: &str) -> Result<(Ticket, String, Device), WorkflowError> {
        self.require_session()?;
        let (goal, device) = match validate_request(goal, self.selected.as_ref()) {
            Ok((goal, device)) => (goal.to_string(), device.clone()),
            Err(e) => {
                self.plan = None;
                self.banners.plan = Some(e.to_string());
                return Err(e.into());
            }
        };

        self.gate.invalidate();
        self.plan = None;
        self.execution = None;
        self.banners.plan = None;
        self.banners.approve = None;
        self.context_epoch += 1;

        let ticket = self.ticket();
        self.plan_in_flight = Some(ticket);
        Ok((ticket, goal, device))
    }

    /// 计划请求完成。成功：整体替换计划并用第一步 bind；失败：清空计划并原样显示错误
    pub fn finish_plan(&mut self, ticket: Ticket, result: Result<Plan, PlanError>) -> bool {
        if !self.is_current(ticket) || self.plan_in_flight != Some(ticket) {
            tracing::warn!("dropping stale plan result");
            return false;
        }
        self.plan_in_flight = None;
        match result {
            Ok(plan) => {
                if let (Some(step), Some(device)) = (plan.first(), self.selected.as_ref()) {
                    if step.action.trim().is_empty() {
                        tracing::warn!("first plan step has no action; nothing to approve");
                    } else {
                        self.gate.bind(step, device);
                    }
                }
                self.plan = Some(plan);
            }
            Err(e) => {
                self.plan = None;
                self.banners.plan = Some(e.to_string());
            }
        }
        true
    }

    /// 批准并开始执行：同一时刻只允许一个执行在途；命令只能来自 Approval Gate
    pub fn begin_execution(&mut self) -> Result<(Ticket, ApprovedCommand), WorkflowError> {
        self.require_session()?;
        if self.execution_in_flight.is_some() {
            return Err(WorkflowError::ExecutionInFlight);
        }
        let approved = {
            let selected = self.selected.as_ref().ok_or(ApprovalError::NoDeviceSelected);
            match selected.and_then(|device| self.gate.approve(device)) {
                Ok(approved) => approved,
                Err(e) => {
                    self.banners.approve = Some(e.to_string());
                    return Err(e.into());
                }
            }
        };

        let ticket = self.ticket();
        self.banners.approve = None;
        self.execution = None;
        self.execution_in_flight = Some(InFlightExecution {
            ticket,
            approval_id: approved.id(),
            device: approved.device().to_string(),
            command: approved.command().to_string(),
        });
        Ok((ticket, approved))
    }

    /// 执行完成：释放执行锁；若上下文已变化则丢弃结果。失败转为 outcome=failed 的 ExecutionResult
    pub fn finish_execution(
        &mut self,
        ticket: Ticket,
        result: Result<ExecutionResult, ExecutionError>,
    ) -> bool {
        let in_flight = match self.execution_in_flight.take() {
            Some(f) if f.ticket == ticket => f,
            other => {
                self.execution_in_flight = other;
                tracing::warn!("dropping execution result from a previous session");
                return false;
            }
        };
        if !self.is_current(ticket) {
            tracing::warn!(
                approval_id = %in_flight.approval_id,
                device = %in_flight.device,
                "execution finished after its device context was replaced; result discarded"
            );
            return false;
        }
        let result = match result {
            Ok(r) => r,
            Err(e) => {
                self.banners.approve = Some(e.to_string());
                ExecutionResult {
                    outcome: Outcome::Failed,
                    output: e.display_output(),
                    error_detail: Some(e.to_string()),
                    approval_id: in_flight.approval_id,
                    device: in_flight.device,
                    command: in_flight.command,
                    finished_at: chrono::Utc::now(),
                }
            }
        };
        self.execution = Some(result);
        true
    }

    pub fn on_session_log(&mut self, ticket: Ticket, result: Result<Vec<String>, TransportError>) {
        if !self.is_current_session(ticket) {
            return;
        }
        match result {
            Ok(log) => self.session_log = log.into_iter().next(),
            Err(e) => tracing::debug!(error = %e, "session log unavailable"),
        }
    }

    /// 文件树浏览：需要已选设备
    pub fn begin_file_tree(&mut self) -> Result<(Ticket, Device), WorkflowError> {
        self.require_session()?;
        let device = self.selected.clone().ok_or(PlanError::NoDeviceSelected)?;
        Ok((self.ticket(), device))
    }

    pub fn finish_file_tree(
        &mut self,
        ticket: Ticket,
        path: String,
        result: Result<Vec<FileEntry>, TransportError>,
    ) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        let Some(device) = self.selected.as_ref() else {
            return false;
        };
        match result {
            Ok(entries) => {
                self.file_tree = Some(FileTreeView {
                    device: device.identifier.clone(),
                    path,
                    entries,
                });
            }
            Err(e) => {
                self.file_tree = None;
                self.banners.general = Some(format!("Could not list {path}: {e}"));
            }
        }
        true
    }

    /// 导出显式、可序列化的状态对象，供 reduce 使用
    pub fn snapshot(&self) -> WorkflowSnapshot {
        let current = self.ticket();
        WorkflowSnapshot {
            authenticated: self.authenticated,
            primary_devices: self.primary_devices.clone(),
            secondary_devices: self.secondary_devices.clone(),
            selected_device: self.selected.clone(),
            plan: self.plan.clone(),
            plan_in_flight: self.plan_in_flight.is_some(),
            pending_approval: self.gate.current().cloned(),
            execution_in_flight: self.execution_in_flight.is_some(),
            executing_command: self
                .execution_in_flight
                .as_ref()
                .filter(|f| f.ticket == current)
                .map(|f| f.command.clone()),
            execution_result: self.execution.clone(),
            banners: self.banners.clone(),
            notice: self.notice.clone(),
            session_log: self.session_log.clone(),
            file_tree: self.file_tree.clone(),
        }
    }
}
