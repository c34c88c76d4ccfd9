//! 外部协作方抽象
//!
//! 会话、设备注册表、Planner、Executor 与只读控制台（文件树 / 会话日志）都是黑盒服务，
//! 核心只依赖这里的 trait；HTTP 实现见 http.rs，内存实现见 mock.rs。

use async_trait::async_trait;

use crate::core::error::{AuthError, ExecutionError, PlanError, TransportError};
use crate::core::types::{Device, DeviceKind, FileEntry, Plan};

/// 会话服务：探测、登录、登出、修改密码
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// 已认证返回 Ok(true)；未认证（401）返回 Ok(false)
    async fn probe(&self) -> Result<bool, TransportError>;

    async fn login(&self, username: &str, password: &str) -> Result<(), AuthError>;

    async fn logout(&self) -> Result<(), TransportError>;

    /// 成功时返回服务端的 detail 文本
    async fn set_password(&self, new_password: &str) -> Result<String, AuthError>;
}

/// 设备注册表：按池返回有序设备列表
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn list_devices(&self, kind: DeviceKind) -> Result<Vec<Device>, TransportError>;
}

/// Planner：目标 + 设备 → 有序计划
#[async_trait]
pub trait Planner: Send + Sync {
    async fn request_plan(&self, goal: &str, device: &Device) -> Result<Plan, PlanError>;
}

/// Executor：在指定设备上执行一条命令，返回输出
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run_action(&self, command: &str, device_id: &str) -> Result<String, ExecutionError>;
}

/// 只读控制台：文件树与会话日志（不在审批核心范围内）
#[async_trait]
pub trait RemoteConsole: Send + Sync {
    async fn file_tree(&self, device: &Device, path: &str) -> Result<Vec<FileEntry>, TransportError>;

    async fn session_log(&self) -> Result<Vec<String>, TransportError>;
}
