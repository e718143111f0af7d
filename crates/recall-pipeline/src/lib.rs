//! The memory consolidation pipeline and the context composer.
//!
//! A flush turns buffered chat blobs into a committed profile delta plus an
//! event-log entry; composition renders the stored memory back into a
//! token-budgeted context string.

pub mod consolidate;
pub mod context;
pub mod error;
pub mod prompts;

pub use consolidate::Consolidator;
pub use context::{ContextComposer, ContextParams};
pub use error::{PipelineError, Result};
