//! CourseCheck 入口：初始化日志、创建工作流编排器与 TUI，并运行主循环。
//!
//! 用法：`coursecheck [config.toml]`

use std::path::PathBuf;

use anyhow::Context;
use coursecheck::{core::create_workflow, observability, ui::run_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);

    let handle = create_workflow(config_path)
        .await
        .context("Failed to create workflow")?;

    run_app(handle).await.context("App run failed")?;

    Ok(())
}
