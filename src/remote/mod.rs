//! 远程边界：外部服务 trait、HTTP 实现（reqwest）、内存实现（测试 / 演示）

pub mod http;
pub mod mock;
pub mod traits;
pub mod wire;

use std::sync::Arc;

pub use http::HttpBackend;
pub use mock::InMemoryBackend;
pub use traits::{DeviceDirectory, Executor, Planner, RemoteConsole, SessionBackend};

/// 一组外部服务句柄；同一个后端对象通常同时实现所有 trait
#[derive(Clone)]
pub struct Backends {
    pub session: Arc<dyn SessionBackend>,
    pub devices: Arc<dyn DeviceDirectory>,
    pub planner: Arc<dyn Planner>,
    pub executor: Arc<dyn Executor>,
    pub console: Arc<dyn RemoteConsole>,
}

impl Backends {
    pub fn from_shared<T>(backend: Arc<T>) -> Self
    where
        T: SessionBackend + DeviceDirectory + Planner + Executor + RemoteConsole + 'static,
    {
        Self {
            session: backend.clone(),
            devices: backend.clone(),
            planner: backend.clone(),
            executor: backend.clone(),
            console: backend,
        }
    }
}
