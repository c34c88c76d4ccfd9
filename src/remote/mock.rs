//! 内存后端（用于测试与未配置 base_url 时的演示模式，无需真实服务端）
//!
//! 按脚本返回计划与执行结果，并记录每次 Planner / Executor 调用，便于断言「显示的步骤」与「实际执行的命令」一致。

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::core::error::{AuthError, ExecutionError, PlanError, TransportError};
use crate::core::types::{Device, DeviceKind, FileEntry, FileKind, Plan, PlanStep};
use crate::remote::traits::{DeviceDirectory, Executor, Planner, RemoteConsole, SessionBackend};

#[derive(Default)]
struct MockState {
    users: HashMap<String, String>,
    current_user: Option<String>,
    devices: HashMap<DeviceKind, Vec<Device>>,
    plans: VecDeque<Result<Plan, PlanError>>,
    default_plan: Option<Plan>,
    executions: VecDeque<Result<String, ExecutionError>>,
    execution_delay: Option<Duration>,
    logout_delay: Option<Duration>,
    plan_requests: Vec<(String, String)>,
    executed: Vec<(String, String)>,
    files: Vec<FileEntry>,
    session_log: Vec<String>,
}

/// 内存后端：同时实现会话、设备、Planner、Executor、控制台五个 trait
#[derive(Default)]
pub struct InMemoryBackend {
    inner: Mutex<MockState>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 演示数据：admin/admin，两台 Pi 与一台笔记本，固定的 5 步计划
    pub fn demo() -> Self {
        Self::new()
            .with_user("admin", "admin")
            .with_devices(
                DeviceKind::Primary,
                vec![
                    Device::new("100.64.0.1", "pi-kitchen").with_principal("pi"),
                    Device::new("100.64.0.2", "pi-garage").with_principal("pi"),
                ],
            )
            .with_devices(
                DeviceKind::Secondary,
                vec![Device::new("100.64.0.10", "laptop")],
            )
            .with_default_plan(Plan::new(vec![
                PlanStep::new("Check the home directory contents", "ls -la /home/pi"),
                PlanStep::new("Check free disk space", "df -h"),
                PlanStep::new("Check memory usage", "free -m"),
                PlanStep::new("Check system uptime", "uptime"),
                PlanStep::new("Check recent logins", "last -n 5"),
            ]))
            .with_files(vec![
                FileEntry {
                    name: "projects".to_string(),
                    kind: FileKind::Dir,
                    path: "/home/pi/projects".to_string(),
                },
                FileEntry {
                    name: "notes.md".to_string(),
                    kind: FileKind::File,
                    path: "/home/pi/notes.md".to_string(),
                },
            ])
            .with_session_log(vec!["# Demo session\n\nNo remote commands yet.".to_string()])
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_user(self, username: &str, password: &str) -> Self {
        self.state()
            .users
            .insert(username.to_string(), password.to_string());
        self
    }

    pub fn with_devices(self, kind: DeviceKind, devices: Vec<Device>) -> Self {
        self.state().devices.insert(kind, devices);
        self
    }

    /// 脚本队列为空时使用的计划
    pub fn with_default_plan(self, plan: Plan) -> Self {
        self.state().default_plan = Some(plan);
        self
    }

    pub fn with_execution_delay(self, delay: Duration) -> Self {
        self.state().execution_delay = Some(delay);
        self
    }

    /// 模拟较慢的远端登出
    pub fn with_logout_delay(self, delay: Duration) -> Self {
        self.state().logout_delay = Some(delay);
        self
    }

    pub fn with_files(self, files: Vec<FileEntry>) -> Self {
        self.state().files = files;
        self
    }

    pub fn with_session_log(self, log: Vec<String>) -> Self {
        self.state().session_log = log;
        self
    }

    /// 追加一个计划响应（先进先出）
    pub fn push_plan(&self, result: Result<Plan, PlanError>) {
        self.state().plans.push_back(result);
    }

    /// 追加一个执行响应（先进先出）
    pub fn push_execution(&self, result: Result<String, ExecutionError>) {
        self.state().executions.push_back(result);
    }

    /// 模拟服务端会话过期
    pub fn expire_session(&self) {
        self.state().current_user = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().current_user.is_some()
    }

    /// 已收到的计划请求：(goal, device identifier)
    pub fn plan_requests(&self) -> Vec<(String, String)> {
        self.state().plan_requests.clone()
    }

    /// 已执行的命令：(command, device identifier)
    pub fn executed(&self) -> Vec<(String, String)> {
        self.state().executed.clone()
    }

    fn require_session(&self) -> Result<(), TransportError> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(TransportError::Unauthorized)
        }
    }
}

#[async_trait]
impl SessionBackend for InMemoryBackend {
    async fn probe(&self) -> Result<bool, TransportError> {
        Ok(self.is_authenticated())
    }

    async fn login(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let mut state = self.state();
        let matches = state
            .users
            .get(username)
            .map(|expected| expected == password)
            .unwrap_or(false);
        if !matches {
            return Err(AuthError::InvalidCredentials(
                "Incorrect username or password".to_string(),
            ));
        }
        state.current_user = Some(username.to_string());
        Ok(())
    }

    async fn logout(&self) -> Result<(), TransportError> {
        let delay = self.state().logout_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state().current_user = None;
        Ok(())
    }

    async fn set_password(&self, new_password: &str) -> Result<String, AuthError> {
        let mut state = self.state();
        let user = state.current_user.clone().ok_or(AuthError::NotAuthenticated)?;
        state.users.insert(user, new_password.to_string());
        Ok("Password updated".to_string())
    }
}

#[async_trait]
impl DeviceDirectory for InMemoryBackend {
    async fn list_devices(&self, kind: DeviceKind) -> Result<Vec<Device>, TransportError> {
        self.require_session()?;
        Ok(self.state().devices.get(&kind).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl Planner for InMemoryBackend {
    async fn request_plan(&self, goal: &str, device: &Device) -> Result<Plan, PlanError> {
        self.require_session()?;
        let mut state = self.state();
        state
            .plan_requests
            .push((goal.to_string(), device.identifier.clone()));
        match state.plans.pop_front() {
            Some(result) => result,
            None => state
                .default_plan
                .clone()
                .ok_or_else(|| PlanError::Malformed("no plan scripted".to_string())),
        }
    }
}

#[async_trait]
impl Executor for InMemoryBackend {
    async fn run_action(&self, command: &str, device_id: &str) -> Result<String, ExecutionError> {
        self.require_session()?;
        let delay = {
            let mut state = self.state();
            state
                .executed
                .push((command.to_string(), device_id.to_string()));
            state.execution_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.state().executions.pop_front() {
            Some(result) => result,
            None => Ok(format!("[demo] {} on {}", command, device_id)),
        }
    }
}

#[async_trait]
impl RemoteConsole for InMemoryBackend {
    async fn file_tree(&self, _device: &Device, path: &str) -> Result<Vec<FileEntry>, TransportError> {
        self.require_session()?;
        let files = self.state().files.clone();
        Ok(files
            .into_iter()
            .filter(|f| path == "/" || f.path.starts_with(path))
            .collect())
    }

    async fn session_log(&self) -> Result<Vec<String>, TransportError> {
        self.require_session()?;
        Ok(self.state().session_log.clone())
    }
}
