//! HTTP 线上格式（与 web 后端的 JSON 约定一致）及到领域类型的转换

use serde::{Deserialize, Serialize};

use crate::core::error::{ExecutionError, PlanError, TransportError};
use crate::core::types::{Device, FileEntry, FileKind, Plan, PlanStep};

/// 设备列表项：对象 `{name, ip, ssh_user}` 或裸字符串
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DeviceEntry {
    Full {
        #[serde(default)]
        name: Option<String>,
        ip: String,
        #[serde(default)]
        ssh_user: Option<String>,
    },
    Bare(String),
}

impl From<DeviceEntry> for Device {
    fn from(entry: DeviceEntry) -> Self {
        match entry {
            DeviceEntry::Full { name, ip, ssh_user } => {
                let display = name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| ip.clone());
                Device {
                    identifier: ip,
                    display_name: display,
                    principal: ssh_user.filter(|u| !u.is_empty()),
                }
            }
            DeviceEntry::Bare(ip) => Device::new(ip.clone(), ip),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginForm<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SetPasswordBody<'a> {
    pub new_password: &'a str,
}

/// `{detail}` / `{error}` 形式的通用响应
#[derive(Debug, Default, Deserialize)]
pub struct DetailResponse {
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl DetailResponse {
    /// 从响应体中取出人类可读的说明；不是 JSON 时返回原文
    pub fn extract(body: &str) -> String {
        match serde_json::from_str::<DetailResponse>(body) {
            Ok(d) => d.detail.or(d.error).unwrap_or_else(|| body.to_string()),
            Err(_) => body.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlanRequestBody<'a> {
    pub conversation: &'a str,
    pub device: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct WireStep {
    #[serde(default, alias = "rationale")]
    pub prompt: String,
    #[serde(default)]
    pub action: String,
}

/// `{plan: [...]}` 或 `{plan: null, error, raw}`
#[derive(Debug, Deserialize)]
pub struct PlanResponse {
    #[serde(default)]
    pub plan: Option<Vec<WireStep>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub raw: Option<String>,
}

impl PlanResponse {
    pub fn into_result(self) -> Result<Plan, PlanError> {
        if let Some(steps) = self.plan {
            return Ok(Plan::new(
                steps
                    .into_iter()
                    .map(|s| PlanStep::new(s.prompt, s.action))
                    .collect(),
            ));
        }
        match self.error {
            Some(message) => Err(PlanError::Rejected {
                message,
                raw: self.raw.unwrap_or_default(),
            }),
            None => Err(PlanError::Malformed(self.raw.unwrap_or_default())),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunForm<'a> {
    pub action: &'a str,
    pub device_ip: &'a str,
}

/// `{status: "ok"|other, output?, error?}`
#[derive(Debug, Deserialize)]
pub struct RunResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RunResponse {
    pub fn into_result(self) -> Result<String, ExecutionError> {
        if self.status == "ok" {
            return Ok(self.output.unwrap_or_default());
        }
        Err(ExecutionError::Remote {
            detail: self
                .error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "Command failed.".to_string()),
            output: self.output,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct WireFile {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct FileTreeResponse {
    #[serde(default)]
    pub files: Vec<WireFile>,
    #[serde(default)]
    pub error: Option<String>,
}

impl FileTreeResponse {
    pub fn into_result(self) -> Result<Vec<FileEntry>, TransportError> {
        if let Some(err) = self.error {
            return Err(TransportError::Remote(err));
        }
        Ok(self
            .files
            .into_iter()
            .map(|f| FileEntry {
                kind: if f.kind == "dir" { FileKind::Dir } else { FileKind::File },
                name: f.name,
                path: f.path,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionLogResponse {
    #[serde(default)]
    pub log: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl SessionLogResponse {
    pub fn into_result(self) -> Result<Vec<String>, TransportError> {
        match self.error {
            Some(err) if self.log.is_empty() => Err(TransportError::Remote(err)),
            _ => Ok(self.log),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_entries_object_and_bare() {
        let entries: Vec<DeviceEntry> = serde_json::from_str(
            r#"[{"name": "pi", "ip": "100.64.0.1", "ssh_user": "pi"}, "100.64.0.9", {"ip": "100.64.0.2"}]"#,
        )
        .unwrap();
        let devices: Vec<Device> = entries.into_iter().map(Device::from).collect();
        assert_eq!(devices[0], Device::new("100.64.0.1", "pi").with_principal("pi"));
        assert_eq!(devices[1], Device::new("100.64.0.9", "100.64.0.9"));
        assert_eq!(devices[2].display_name, "100.64.0.2");
    }

    #[test]
    fn test_plan_response_maps_prompt_to_rationale() {
        let resp: PlanResponse = serde_json::from_str(
            r#"{"plan": [{"prompt": "check dir", "action": "ls /home/pi", "raw": {}}], "raw": "[...]"}"#,
        )
        .unwrap();
        let plan = resp.into_result().unwrap();
        assert_eq!(plan.steps, vec![PlanStep::new("check dir", "ls /home/pi")]);
    }

    #[test]
    fn test_plan_response_error_with_raw() {
        let resp: PlanResponse =
            serde_json::from_str(r#"{"plan": null, "error": "timeout", "raw": "<empty>"}"#).unwrap();
        let err = resp.into_result().unwrap_err();
        assert!(err.to_string().contains("timeout"));
        assert!(err.to_string().contains("<empty>"));
    }

    #[test]
    fn test_plan_response_without_plan_or_error() {
        let resp: PlanResponse = serde_json::from_str(r#"{"plan": null}"#).unwrap();
        assert!(matches!(resp.into_result(), Err(PlanError::Malformed(_))));
    }

    #[test]
    fn test_run_response() {
        let ok: RunResponse = serde_json::from_str(r#"{"status": "ok", "output": "file1\nfile2"}"#).unwrap();
        assert_eq!(ok.into_result().unwrap(), "file1\nfile2");

        let failed: RunResponse =
            serde_json::from_str(r#"{"status": "error", "error": "Connection refused"}"#).unwrap();
        assert_eq!(
            failed.into_result().unwrap_err(),
            ExecutionError::Remote {
                detail: "Connection refused".to_string(),
                output: None
            }
        );

        let bare: RunResponse = serde_json::from_str(r#"{"status": "failed"}"#).unwrap();
        assert_eq!(bare.into_result().unwrap_err().to_string(), "Command failed.");
    }

    #[test]
    fn test_detail_extract() {
        assert_eq!(
            DetailResponse::extract(r#"{"detail": "Incorrect username or password"}"#),
            "Incorrect username or password"
        );
        assert_eq!(DetailResponse::extract("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_file_tree_response() {
        let resp: FileTreeResponse = serde_json::from_str(
            r#"{"files": [{"name": "docs", "type": "dir", "path": "/home/pi/docs"}, {"name": "a.txt", "type": "file", "path": "/home/pi/a.txt"}]}"#,
        )
        .unwrap();
        let files = resp.into_result().unwrap();
        assert_eq!(files[0].kind, FileKind::Dir);
        assert_eq!(files[1].kind, FileKind::File);

        let failed: FileTreeResponse =
            serde_json::from_str(r#"{"files": [], "error": "auth failed"}"#).unwrap();
        assert_eq!(failed.into_result().unwrap_err(), TransportError::Remote("auth failed".into()));
    }
}
