//! 领域类型：设备、计划、执行结果、文件树条目

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 设备池：两个独立加载的设备列表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Primary,
    Secondary,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 2] = [DeviceKind::Primary, DeviceKind::Secondary];
}

/// 远程设备；identifier 是后续计划、审批、执行的作用域键
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub identifier: String,
    pub display_name: String,
    /// 设备登录用户（注册表提供时），仅用于文件树浏览
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
}

impl Device {
    pub fn new(identifier: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: display_name.into(),
            principal: None,
        }
    }

    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// 只比较 identifier：显示名变化不算换设备
    pub fn same_identity(&self, other: &Device) -> bool {
        self.identifier == other.identifier
    }
}

/// 计划中的一步：理由 + 不透明的命令字符串
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub rationale: String,
    pub action: String,
}

impl PlanStep {
    pub fn new(rationale: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            rationale: rationale.into(),
            action: action.into(),
        }
    }
}

/// 有序计划；每次请求整体替换，不做增量合并
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self { steps }
    }

    pub fn first(&self) -> Option<&PlanStep> {
        self.steps.first()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    Failed,
}

/// 一次已批准执行的结果（瞬态，每次批准一份）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub outcome: Outcome,
    pub output: String,
    pub error_detail: Option<String>,
    /// 对应 PendingApproval 的关联 ID，用于把显示的计划步骤与实际执行的命令对应起来
    pub approval_id: Uuid,
    pub device: String,
    pub command: String,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn is_ok(&self) -> bool {
        self.outcome == Outcome::Ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Dir,
    File,
}

/// 远程文件树中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub kind: FileKind,
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_identity_ignores_display_name() {
        let a = Device::new("100.64.0.1", "pi");
        let renamed = Device::new("100.64.0.1", "raspberry");
        let other = Device::new("100.64.0.2", "pi");
        assert!(a.same_identity(&renamed));
        assert!(!a.same_identity(&other));
    }

    #[test]
    fn test_plan_first() {
        assert!(Plan::default().first().is_none());
        let plan = Plan::new(vec![
            PlanStep::new("check dir", "ls /home/pi"),
            PlanStep::new("disk", "df -h"),
        ]);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.first().map(|s| s.action.as_str()), Some("ls /home/pi"));
    }
}
