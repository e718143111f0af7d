use chrono::{DateTime, Utc};
use recall_core::types::{Blob, BlobType};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::types::BlobRecord;
use crate::{now_rfc3339, Db};

pub struct BlobStore {
    db: Db,
}

impl BlobStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Persist a blob. Durable before the id is returned.
    pub fn put(&self, project_id: &str, user_id: &str, blob: &Blob) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let data = serde_json::to_string(blob)?;
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO blobs (id, project_id, user_id, blob_type, blob_data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                id,
                project_id,
                user_id,
                blob.blob_type().to_string(),
                data,
                now_rfc3339()
            ],
        )?;
        Ok(id)
    }

    pub fn get(&self, project_id: &str, user_id: &str, blob_id: &str) -> Result<BlobRecord> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, blob_type, blob_data, created_at FROM blobs
             WHERE id = ?1 AND user_id = ?2 AND project_id = ?3",
            rusqlite::params![blob_id, user_id, project_id],
            row_to_blob,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound {
                kind: "blob",
                id: blob_id.to_string(),
            },
            e => StoreError::Database(e),
        })
    }

    pub fn delete(&self, project_id: &str, user_id: &str, blob_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "DELETE FROM blobs WHERE id = ?1 AND user_id = ?2 AND project_id = ?3",
            rusqlite::params![blob_id, user_id, project_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                kind: "blob",
                id: blob_id.to_string(),
            });
        }
        Ok(())
    }

    /// Page through a user's blob ids of one type, oldest first.
    pub fn list_ids(
        &self,
        project_id: &str,
        user_id: &str,
        blob_type: BlobType,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<String>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id FROM blobs
             WHERE project_id = ?1 AND user_id = ?2 AND blob_type = ?3
             ORDER BY created_at, rowid
             LIMIT ?4 OFFSET ?5",
        )?;
        let ids = stmt
            .query_map(
                rusqlite::params![
                    project_id,
                    user_id,
                    blob_type.to_string(),
                    page_size as i64,
                    (page * page_size) as i64
                ],
                |row| row.get(0),
            )?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    /// Tombstone consolidated chat blobs: removes the blobs and their (done)
    /// buffer entries. No-op when chat persistence is enabled upstream.
    #[instrument(skip(self, blob_ids))]
    pub fn gc_consolidated(
        &self,
        project_id: &str,
        user_id: &str,
        blob_ids: &[String],
    ) -> Result<()> {
        if blob_ids.is_empty() {
            return Ok(());
        }
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        for blob_id in blob_ids {
            tx.execute(
                "DELETE FROM blobs WHERE id = ?1 AND user_id = ?2 AND project_id = ?3",
                rusqlite::params![blob_id, user_id, project_id],
            )?;
            tx.execute(
                "DELETE FROM buffer_zone
                 WHERE blob_id = ?1 AND user_id = ?2 AND project_id = ?3 AND status = 'done'",
                rusqlite::params![blob_id, user_id, project_id],
            )?;
        }
        tx.commit()?;
        debug!(count = blob_ids.len(), "consolidated chat blobs removed");
        Ok(())
    }
}

pub(crate) fn row_to_blob(row: &rusqlite::Row<'_>) -> rusqlite::Result<BlobRecord> {
    let type_str: String = row.get(1)?;
    let data: String = row.get(2)?;
    let created_at: String = row.get(3)?;
    let blob: Blob = serde_json::from_str(&data).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(BlobRecord {
        id: row.get(0)?,
        blob_type: type_str.parse().unwrap_or(BlobType::Doc),
        blob,
        created_at: parse_rfc3339(&created_at),
    })
}

pub(crate) fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
