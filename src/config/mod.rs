//! Typed configuration assembled from environment variables and CLI flags.

pub mod settings;
