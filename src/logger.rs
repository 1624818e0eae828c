//! 日志初始化
//!
//! 默认 info 级别，可通过 RUST_LOG 覆盖（例如 `RUST_LOG=jobproof=debug`）。

use tracing_subscriber::EnvFilter;

/// 初始化全局日志订阅器
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
