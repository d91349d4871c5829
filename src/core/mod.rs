//! 核心模块
//!
//! 共享记录、跨进程互斥锁以及数据模型

pub mod models;
pub mod shared_record;

pub use models::{Role, SharedRecord, WorkerRole, WorkerSlot};
pub use shared_record::SharedStore;
