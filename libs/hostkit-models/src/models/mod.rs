//! HostKit wire models

pub mod build;
pub mod checkpoint;
pub mod deploy;
pub mod envelope;
pub mod gates;
pub mod migration;
