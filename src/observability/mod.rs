//! 可观测性：tracing 初始化
//!
//! RUST_LOG 未设置时默认 info；工具审计日志（tool_audit）走 info 级。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
