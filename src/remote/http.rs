//! HTTP 后端：通过 reqwest 调用 web 服务端的各个端点
//!
//! 会话凭据是服务端下发的 httpOnly Cookie，由 reqwest 的 cookie store 自动携带，核心从不读取。
//! 任意端点返回 401 都映射为 TransportError::Unauthorized，由编排器触发重新探测会话。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::config::RemoteSection;
use crate::core::error::{AuthError, ExecutionError, PlanError, TransportError};
use crate::core::types::{Device, DeviceKind, FileEntry, Plan};
use crate::remote::traits::{DeviceDirectory, Executor, Planner, RemoteConsole, SessionBackend};
use crate::remote::wire::{
    DetailResponse, DeviceEntry, FileTreeResponse, LoginForm, PlanRequestBody, PlanResponse,
    RunForm, RunResponse, SessionLogResponse, SetPasswordBody,
};

const ME_PATH: &str = "/me";
const LOGIN_PATH: &str = "/login";
const LOGOUT_PATH: &str = "/logout";
const SET_PASSWORD_PATH: &str = "/set_password";
const PLAN_PATH: &str = "/course-check";
const RUN_PATH: &str = "/course-run";
const FILETREE_PATH: &str = "/filetree";
const SESSION_LOG_PATH: &str = "/session-log";

/// 基于 reqwest 的后端：一个 Client（带 Cookie 存储与超时）对应一个会话
pub struct HttpBackend {
    client: Client,
    base_url: String,
    primary_devices_path: String,
    secondary_devices_path: String,
    action_prefix: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, section: &RemoteSection) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(section.timeout_secs))
            .cookie_store(true)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            primary_devices_path: section.primary_devices_path.clone(),
            secondary_devices_path: section.secondary_devices_path.clone(),
            action_prefix: section.action_prefix.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn devices_path(&self, kind: DeviceKind) -> &str {
        match kind {
            DeviceKind::Primary => &self.primary_devices_path,
            DeviceKind::Secondary => &self.secondary_devices_path,
        }
    }
}

fn request_error(e: reqwest::Error) -> TransportError {
    TransportError::Request(e.to_string())
}

/// 检查状态码（401 → Unauthorized，其它非 2xx → Status）；返回 2xx 响应
async fn check_status(resp: Response) -> Result<Response, TransportError> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(TransportError::Unauthorized);
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(TransportError::Status {
            status: status.as_u16(),
            body: DetailResponse::extract(&body),
        });
    }
    Ok(resp)
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, TransportError> {
    let resp = check_status(resp).await?;
    resp.json::<T>()
        .await
        .map_err(|e| TransportError::Decode(e.to_string()))
}

#[async_trait]
impl SessionBackend for HttpBackend {
    async fn probe(&self) -> Result<bool, TransportError> {
        let resp = self
            .client
            .get(self.url(ME_PATH))
            .send()
            .await
            .map_err(request_error)?;
        match check_status(resp).await {
            Ok(_) => Ok(true),
            Err(TransportError::Unauthorized) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn login(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let resp = self
            .client
            .post(self.url(LOGIN_PATH))
            .form(&LoginForm { username, password })
            .send()
            .await
            .map_err(request_error)?;
        match check_status(resp).await {
            Ok(_) => Ok(()),
            Err(TransportError::Status { status, body }) if status == 400 || status == 403 => {
                Err(AuthError::InvalidCredentials(body))
            }
            Err(TransportError::Unauthorized) => Err(AuthError::InvalidCredentials(
                "Incorrect username or password".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn logout(&self) -> Result<(), TransportError> {
        let resp = self
            .client
            .post(self.url(LOGOUT_PATH))
            .send()
            .await
            .map_err(request_error)?;
        check_status(resp).await.map(|_| ())
    }

    async fn set_password(&self, new_password: &str) -> Result<String, AuthError> {
        let resp = self
            .client
            .post(self.url(SET_PASSWORD_PATH))
            .json(&SetPasswordBody { new_password })
            .send()
            .await
            .map_err(request_error)?;
        match read_json::<DetailResponse>(resp).await {
            Ok(d) => match (d.detail, d.error) {
                (_, Some(err)) => Err(AuthError::Rejected(err)),
                (Some(detail), None) => Ok(detail),
                (None, None) => Ok("Changed".to_string()),
            },
            Err(TransportError::Unauthorized) => Err(AuthError::NotAuthenticated),
            Err(TransportError::Status { body, .. }) => Err(AuthError::Rejected(body)),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl DeviceDirectory for HttpBackend {
    async fn list_devices(&self, kind: DeviceKind) -> Result<Vec<Device>, TransportError> {
        let resp = self
            .client
            .get(self.url(self.devices_path(kind)))
            .send()
            .await
            .map_err(request_error)?;
        let entries: Vec<DeviceEntry> = read_json(resp).await?;
        Ok(entries.into_iter().map(Device::from).collect())
    }
}

#[async_trait]
impl Planner for HttpBackend {
    async fn request_plan(&self, goal: &str, device: &Device) -> Result<Plan, PlanError> {
        let resp = self
            .client
            .post(self.url(PLAN_PATH))
            .json(&PlanRequestBody {
                conversation: goal,
                device: &device.identifier,
            })
            .send()
            .await
            .map_err(request_error)?;
        let body: PlanResponse = read_json(resp).await?;
        body.into_result()
    }
}

#[async_trait]
impl Executor for HttpBackend {
    async fn run_action(&self, command: &str, device_id: &str) -> Result<String, ExecutionError> {
        let action = format!("{}{}", self.action_prefix, command);
        let resp = self
            .client
            .post(self.url(RUN_PATH))
            .form(&RunForm {
                action: &action,
                device_ip: device_id,
            })
            .send()
            .await
            .map_err(request_error)?;
        let body: RunResponse = read_json(resp).await?;
        body.into_result()
    }
}

#[async_trait]
impl RemoteConsole for HttpBackend {
    async fn file_tree(&self, device: &Device, path: &str) -> Result<Vec<FileEntry>, TransportError> {
        let mut query: Vec<(&str, &str)> = vec![("device", device.identifier.as_str()), ("path", path)];
        if let Some(user) = device.principal.as_deref() {
            query.push(("ssh_user", user));
        }
        let resp = self
            .client
            .get(self.url(FILETREE_PATH))
            .query(&query)
            .send()
            .await
            .map_err(request_error)?;
        let body: FileTreeResponse = read_json(resp).await?;
        body.into_result()
    }

    async fn session_log(&self) -> Result<Vec<String>, TransportError> {
        let resp = self
            .client
            .get(self.url(SESSION_LOG_PATH))
            .send()
            .await
            .map_err(request_error)?;
        let body: SessionLogResponse = read_json(resp).await?;
        body.into_result()
    }
}
