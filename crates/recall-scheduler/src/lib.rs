//! Flush scheduling: size triggers, explicit flushes, and the per-user
//! background queue worker.

pub mod flush;

pub use flush::FlushScheduler;
