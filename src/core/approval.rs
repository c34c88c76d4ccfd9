//! Approval Gate：唯一持有 PendingApproval 的组件
//!
//! - bind：计划成功后用第一步创建 PendingApproval，绑定当时选中的设备
//! - approve：只有当前选中设备与绑定设备一致时才交出命令；成功即消费（一次批准至多一次执行）
//! - invalidate：换设备、登出、新计划请求时无条件清空
//!
//! 交出的命令是 ApprovedCommand，字段私有、不可 Clone，只能由本模块构造；
//! 执行端只接受 ApprovedCommand，因此任何执行都必须经过本门。

use serde::Serialize;
use uuid::Uuid;

use crate::core::error::ApprovalError;
use crate::core::types::{Device, PlanStep};

/// 等待人工确认的唯一命令
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingApproval {
    /// 关联 ID：贯穿审批、执行审计日志与执行结果
    pub id: Uuid,
    pub bound_device: String,
    pub command: String,
    /// 来源步骤的理由，供审阅显示
    pub rationale: String,
}

/// 通过审批的命令（执行凭证）
#[derive(Debug, PartialEq, Eq)]
pub struct ApprovedCommand {
    id: Uuid,
    device: String,
    command: String,
}

impl ApprovedCommand {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[derive(Debug, Default)]
pub struct ApprovalGate {
    pending: Option<PendingApproval>,
}

impl ApprovalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以 step 与 device 创建新的 PendingApproval，覆盖已有的
    pub fn bind(&mut self, step: &PlanStep, device: &Device) -> &PendingApproval {
        let pending = PendingApproval {
            id: Uuid::new_v4(),
            bound_device: device.identifier.clone(),
            command: step.action.clone(),
            rationale: step.rationale.clone(),
        };
        tracing::info!(
            approval_id = %pending.id,
            device = %pending.bound_device,
            command = %pending.command,
            "command bound for approval"
        );
        self.pending.insert(pending)
    }

    pub fn current(&self) -> Option<&PendingApproval> {
        self.pending.as_ref()
    }

    pub fn invalidate(&mut self) {
        if let Some(stale) = self.pending.take() {
            tracing::info!(approval_id = %stale.id, device = %stale.bound_device, "approval invalidated");
        }
    }

    /// 设备一致时交出命令并清空 PendingApproval；不一致时返回 DeviceMismatch，PendingApproval 保持不变
    pub fn approve(&mut self, selected: &Device) -> Result<ApprovedCommand, ApprovalError> {
        let pending = self.pending.as_ref().ok_or(ApprovalError::NothingPending)?;
        if pending.bound_device != selected.identifier {
            tracing::warn!(
                approval_id = %pending.id,
                bound = %pending.bound_device,
                selected = %selected.identifier,
                "approval refused: device mismatch"
            );
            return Err(ApprovalError::DeviceMismatch {
                bound: pending.bound_device.clone(),
                selected: selected.identifier.clone(),
            });
        }
        let pending = self.pending.take().ok_or(ApprovalError::NothingPending)?;
        tracing::info!(approval_id = %pending.id, device = %pending.bound_device, "command approved");
        Ok(ApprovedCommand {
            id: pending.id,
            device: pending.bound_device,
            command: pending.command,
        })
    }
}
