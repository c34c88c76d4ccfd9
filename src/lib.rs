//! CourseCheck - 远程设备上的「计划 → 审阅 → 批准 → 执行」工作流客户端
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 领域类型、审批门、执行分发、工作流状态机、主控循环
//! - **observability**: tracing 日志初始化
//! - **remote**: 外部服务 trait 与 HTTP / 内存实现
//! - **ui**: Ratatui TUI 界面

pub mod config;
pub mod core;
pub mod observability;
pub mod remote;
pub mod ui;
