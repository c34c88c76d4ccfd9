//! Session Gate：判断调用方是否已认证
//!
//! 「是否登录」永远由 probe 重新推导，不在本地缓存一个可信标志；probe 不抛错，任何传输失败都视为未认证。

use std::sync::Arc;

use crate::core::error::AuthError;
use crate::remote::SessionBackend;

#[derive(Clone)]
pub struct SessionGate {
    backend: Arc<dyn SessionBackend>,
}

impl SessionGate {
    pub fn new(backend: Arc<dyn SessionBackend>) -> Self {
        Self { backend }
    }

    pub async fn probe(&self) -> bool {
        match self.backend.probe().await {
            Ok(authenticated) => authenticated,
            Err(e) => {
                tracing::warn!(error = %e, "session probe failed, treating as unauthenticated");
                false
            }
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let result = self.backend.login(username, password).await;
        match &result {
            Ok(()) => tracing::info!(user = %username, "login succeeded"),
            Err(e) => tracing::info!(user = %username, error = %e, "login rejected"),
        }
        result
    }

    /// 尽力而为：远端失败只记日志，调用方总是把本地状态切到未认证
    pub async fn logout(&self) {
        if let Err(e) = self.backend.logout().await {
            tracing::warn!(error = %e, "remote logout failed; local session cleared anyway");
        }
    }

    pub async fn set_password(&self, new_password: &str) -> Result<String, AuthError> {
        if new_password.is_empty() {
            return Err(AuthError::Rejected("Password must not be empty.".to_string()));
        }
        self.backend.set_password(new_password).await
    }
}
