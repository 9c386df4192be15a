//! HTTP plumbing and the Remote Adapter built on top of it.

pub mod client;
pub mod workflows;
