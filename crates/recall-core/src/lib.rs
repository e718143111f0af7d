//! Shared types, configuration, and error taxonomy for the Recall memory
//! service.

pub mod config;
pub mod error;
pub mod project;
pub mod tokens;
pub mod types;

pub use error::{MemoryError, Result};
