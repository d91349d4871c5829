//! CLI 命令处理模块
//!
//! 命令行解析、交互式控制台以及只读的 status 视图

pub mod console;
pub mod parser;
pub mod status;

pub use console::{Console, ConsoleCommand, ExitReason};
pub use parser::{Cli, Commands};
