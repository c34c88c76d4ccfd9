//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `COURSECHECK__*` 覆盖（双下划线表示嵌套，如 `COURSECHECK__REMOTE__BASE_URL=http://pi:8000`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub remote: RemoteSection,
    #[serde(default)]
    pub executor: ExecutorSection,
}

/// [app] 段：应用名、默认目标
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 请求计划时使用的默认目标（可在界面中修改）
    #[serde(default = "default_goal")]
    pub default_goal: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            default_goal: default_goal(),
        }
    }
}

fn default_goal() -> String {
    "List files in /home/pi".to_string()
}

/// [remote] 段：后端地址、超时与设备列表路径
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSection {
    /// 未设置时使用内存演示后端
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_devices_path")]
    pub primary_devices_path: String,
    #[serde(default = "default_devices_path")]
    pub secondary_devices_path: String,
    /// 发往执行端的动作前缀（`ssh:<command>`）
    #[serde(default = "default_action_prefix")]
    pub action_prefix: String,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_timeout_secs(),
            primary_devices_path: default_devices_path(),
            secondary_devices_path: default_devices_path(),
            action_prefix: default_action_prefix(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_devices_path() -> String {
    "/devices".to_string()
}

fn default_action_prefix() -> String {
    "ssh:".to_string()
}

/// [executor] 段：本地拒绝的危险关键字（子串匹配）
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSection {
    #[serde(default = "default_forbidden_keywords")]
    pub forbidden_keywords: Vec<String>,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            forbidden_keywords: default_forbidden_keywords(),
        }
    }
}

fn default_forbidden_keywords() -> Vec<String> {
    vec![
        "rm ".into(),
        "dd ".into(),
        "mkfs".into(),
        "shutdown".into(),
        "reboot".into(),
        "init 0".into(),
        "halt".into(),
        "poweroff".into(),
    ]
}

/// 从 config 目录加载配置，环境变量 COURSECHECK__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 COURSECHECK__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("COURSECHECK")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
