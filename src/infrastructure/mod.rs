//! Infrastructure layer module
//!
//! - Configuration management (figment)
//! - Logging setup (tracing-subscriber, tracing-appender)
//!
//! Port adapters live in [`crate::adapters`].

pub mod config;
pub mod logging;
