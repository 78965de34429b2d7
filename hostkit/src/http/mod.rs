//! HTTP plumbing shared by the checkpoint and alert clients

pub mod client;
