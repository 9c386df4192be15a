//! Bidirectional sync engine between a local JSON workflow directory and an
//! n8n-compatible remote server.

pub mod cli;
pub mod config;
pub mod errors;
pub mod filesys;
pub mod fingerprint;
pub mod http;
pub mod local;
pub mod logs;
pub mod models;
pub mod sanitize;
pub mod sync;
pub mod workers;
