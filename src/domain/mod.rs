//! Domain layer for the adaptive weight learning loop
//!
//! This module contains the records, error taxonomy and collaborator ports.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{LearningError, LearningResult};
