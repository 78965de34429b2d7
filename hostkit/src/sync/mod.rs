//! File sync to project directories

pub mod ownership;
pub mod rsync;
