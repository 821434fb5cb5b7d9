//! Configuration loading
//!
//! Layered figment configuration:
//! - programmatic defaults
//! - project YAML files under `.adaptive-weights/`
//! - `ADAPTIVE_WEIGHTS_*` environment overrides
//! - validation of every tunable after merging

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
