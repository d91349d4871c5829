//! 日志系统
//!
//! 诊断日志写到标准错误，标准输出留给控制台交互。
//! 持久化的事件记录见 `journal` 模块。

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_FILTER: &str = "warn,counter_warden=info";

/// 初始化日志系统
///
/// `log_level` 优先；为 None 时读取 `RUST_LOG`，都没有则使用 [`DEFAULT_FILTER`]。
///
/// ```no_run
/// use counter_warden::utils::logger::init_logger;
///
/// init_logger(Some("debug")).unwrap();
/// ```
pub fn init_logger(log_level: Option<&str>) -> Result<()> {
    let env_filter = match log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .with_ansi(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    tracing::debug!("Logger initialized");
    Ok(())
}
