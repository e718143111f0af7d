//! SQLite-backed stores: projects, users, blobs, the consolidation buffer,
//! profile slots, and the event log.
//!
//! Every store wraps the same shared connection; multi-row mutations run in
//! one transaction so readers never observe partial commits.

pub mod blobs;
pub mod buffer;
pub mod db;
pub mod error;
pub mod events;
pub mod profiles;
pub mod projects;
pub mod status;
pub mod types;
pub mod users;

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

pub use error::{Result, StoreError};

/// Shared handle to the single SQLite connection.
pub type Db = Arc<Mutex<Connection>>;

/// Open (creating parent directories if needed) and initialise the database.
pub fn open_db(path: &str) -> Result<Db> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let conn = Connection::open(path)?;
    db::init_db(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// In-memory database for tests.
pub fn open_in_memory() -> Result<Db> {
    let conn = Connection::open_in_memory()?;
    db::init_db(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
