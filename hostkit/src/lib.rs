//! HostKit Library
//!
//! Deploy governance for a multi-project host: build classification, admission
//! control, the auto-pause circuit breaker and checkpointed migrations.

pub mod app;
pub mod checkpoint;
pub mod clock;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod notify;
pub mod storage;
pub mod sync;
pub mod utils;
