//! 可观测性：tracing 日志
//!
//! 日志写到 stderr（stdout 留给 TUI），默认级别 info，可通过 RUST_LOG 覆盖。
//! 运行 TUI 时建议重定向：`coursecheck 2>coursecheck.log`。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
