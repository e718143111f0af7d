use recall_core::types::{BlobType, BufferStatus};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::blobs::parse_rfc3339;
use crate::error::{Result, StoreError};
use crate::types::{BufferEntry, BufferedBlob};
use crate::{now_rfc3339, Db};

/// Per-(user, blob type) queue of blobs awaiting consolidation.
///
/// The buffer only tracks state; deciding when to flush, and running the
/// flush, is the scheduler's job.
pub struct BufferStore {
    db: Db,
}

impl BufferStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Link a stored blob to a pending processing slot.
    pub fn enqueue(
        &self,
        project_id: &str,
        user_id: &str,
        blob_type: BlobType,
        blob_id: &str,
        token_size: usize,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO buffer_zone
             (id, project_id, user_id, blob_id, blob_type, token_size, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'idle', ?7)",
            rusqlite::params![
                id,
                project_id,
                user_id,
                blob_id,
                blob_type.to_string(),
                token_size as i64,
                now_rfc3339()
            ],
        )?;
        Ok(id)
    }

    /// Entry ids in arrival order, filtered by status.
    pub fn pending_ids(
        &self,
        project_id: &str,
        user_id: &str,
        blob_type: BlobType,
        status: BufferStatus,
    ) -> Result<Vec<String>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id FROM buffer_zone
             WHERE project_id = ?1 AND user_id = ?2 AND blob_type = ?3 AND status = ?4
             ORDER BY created_at, rowid",
        )?;
        let ids = stmt
            .query_map(
                rusqlite::params![project_id, user_id, blob_type.to_string(), status.to_string()],
                |row| row.get(0),
            )?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    pub fn entries(
        &self,
        project_id: &str,
        user_id: &str,
        blob_type: BlobType,
        status: BufferStatus,
    ) -> Result<Vec<BufferEntry>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, blob_id, blob_type, token_size, status, created_at FROM buffer_zone
             WHERE project_id = ?1 AND user_id = ?2 AND blob_type = ?3 AND status = ?4
             ORDER BY created_at, rowid",
        )?;
        let entries = stmt
            .query_map(
                rusqlite::params![project_id, user_id, blob_type.to_string(), status.to_string()],
                row_to_entry,
            )?
            .filter_map(|r| r.ok())
            .collect();
        Ok(entries)
    }

    /// Total token size of entries in the given status.
    pub fn token_sum(
        &self,
        project_id: &str,
        user_id: &str,
        blob_type: BlobType,
        status: BufferStatus,
    ) -> Result<i64> {
        let db = self.db.lock().unwrap();
        let sum = db.query_row(
            "SELECT COALESCE(SUM(token_size), 0) FROM buffer_zone
             WHERE project_id = ?1 AND user_id = ?2 AND blob_type = ?3 AND status = ?4",
            rusqlite::params![project_id, user_id, blob_type.to_string(), status.to_string()],
            |row| row.get(0),
        )?;
        Ok(sum)
    }

    pub fn count(
        &self,
        project_id: &str,
        user_id: &str,
        blob_type: BlobType,
        status: BufferStatus,
    ) -> Result<i64> {
        let db = self.db.lock().unwrap();
        let count = db.query_row(
            "SELECT COUNT(*) FROM buffer_zone
             WHERE project_id = ?1 AND user_id = ?2 AND blob_type = ?3 AND status = ?4",
            rusqlite::params![project_id, user_id, blob_type.to_string(), status.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Transition entries through the status lattice. `idle` is never a legal
    /// target; `processing` only follows `idle`; `done`/`failed` only follow
    /// `processing`. Returns how many rows actually moved.
    #[instrument(skip(self, entry_ids))]
    pub fn mark(&self, entry_ids: &[String], to: BufferStatus) -> Result<usize> {
        let sources: &[BufferStatus] = match to {
            BufferStatus::Idle => {
                return Err(StoreError::InvalidTransition {
                    from: "*".into(),
                    to: to.to_string(),
                })
            }
            BufferStatus::Processing => &[BufferStatus::Idle],
            BufferStatus::Done | BufferStatus::Failed => &[BufferStatus::Processing],
        };
        self.mark_from(entry_ids, sources, to)
    }

    /// Internal transition that also allows `failed -> processing` for
    /// operator-driven retries of a failed batch.
    pub(crate) fn mark_from(
        &self,
        entry_ids: &[String],
        sources: &[BufferStatus],
        to: BufferStatus,
    ) -> Result<usize> {
        if entry_ids.is_empty() {
            return Ok(0);
        }
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        let mut moved = 0;
        for id in entry_ids {
            for source in sources {
                moved += tx.execute(
                    "UPDATE buffer_zone SET status = ?1 WHERE id = ?2 AND status = ?3",
                    rusqlite::params![to.to_string(), id, source.to_string()],
                )?;
            }
        }
        tx.commit()?;
        debug!(moved, status = %to, "buffer entries transitioned");
        Ok(moved)
    }

    /// Claim entries for processing, returning the ids that actually moved
    /// (entries that changed status since selection are left out).
    pub fn claim(&self, entry_ids: &[String], from: BufferStatus) -> Result<Vec<String>> {
        if entry_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        let mut claimed = Vec::with_capacity(entry_ids.len());
        for id in entry_ids {
            let moved = tx.execute(
                "UPDATE buffer_zone SET status = 'processing' WHERE id = ?1 AND status = ?2",
                rusqlite::params![id, from.to_string()],
            )?;
            if moved > 0 {
                claimed.push(id.clone());
            }
        }
        tx.commit()?;
        Ok(claimed)
    }

    /// Select the requested entries that still hold `expect_status`, joined
    /// with their blob payloads in arrival order, and atomically mark them
    /// `processing`. Entries already `processing` (background pre-claimed) are
    /// returned as-is.
    pub fn take_batch(
        &self,
        project_id: &str,
        user_id: &str,
        blob_type: BlobType,
        entry_ids: &[String],
        expect_status: BufferStatus,
    ) -> Result<Vec<BufferedBlob>> {
        if entry_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        let mut batch = Vec::new();
        {
            let mut stmt = tx.prepare(
                "SELECT z.id, z.blob_id, z.token_size, b.id, b.blob_type, b.blob_data, b.created_at
                 FROM buffer_zone z
                 JOIN blobs b ON z.blob_id = b.id
                 WHERE z.id = ?1 AND z.project_id = ?2 AND z.user_id = ?3
                   AND z.blob_type = ?4 AND z.status = ?5
                   AND b.project_id = ?2 AND b.user_id = ?3",
            )?;
            for entry_id in entry_ids {
                let row = stmt.query_row(
                    rusqlite::params![
                        entry_id,
                        project_id,
                        user_id,
                        blob_type.to_string(),
                        expect_status.to_string()
                    ],
                    |row| {
                        let blob_rec = row_to_blob_at(row, 3)?;
                        Ok(BufferedBlob {
                            entry_id: row.get(0)?,
                            blob_id: row.get(1)?,
                            token_size: row.get(2)?,
                            blob: blob_rec.blob,
                            blob_created_at: blob_rec.created_at,
                        })
                    },
                );
                match row {
                    Ok(b) => batch.push(b),
                    Err(rusqlite::Error::QueryReturnedNoRows) => continue,
                    Err(e) => return Err(StoreError::Database(e)),
                }
            }
        }
        if expect_status != BufferStatus::Processing {
            for b in &batch {
                tx.execute(
                    "UPDATE buffer_zone SET status = 'processing' WHERE id = ?1",
                    [&b.entry_id],
                )?;
            }
        }
        tx.commit()?;
        // keep the caller's (arrival) order
        let order: std::collections::HashMap<&str, usize> = entry_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        batch.sort_by_key(|b| order.get(b.entry_id.as_str()).copied().unwrap_or(usize::MAX));
        Ok(batch)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<BufferEntry> {
    let type_str: String = row.get(2)?;
    let status_str: String = row.get(4)?;
    Ok(BufferEntry {
        id: row.get(0)?,
        blob_id: row.get(1)?,
        blob_type: type_str.parse().unwrap_or(BlobType::Chat),
        token_size: row.get(3)?,
        status: status_str.parse().unwrap_or(BufferStatus::Idle),
        created_at: row.get(5)?,
    })
}

/// Like [`row_to_blob`] but reading from a column offset (for joined rows).
fn row_to_blob_at(
    row: &rusqlite::Row<'_>,
    offset: usize,
) -> rusqlite::Result<crate::types::BlobRecord> {
    let type_str: String = row.get(offset + 1)?;
    let data: String = row.get(offset + 2)?;
    let created_at: String = row.get(offset + 3)?;
    let blob = serde_json::from_str(&data).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            offset + 2,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })?;
    Ok(crate::types::BlobRecord {
        id: row.get(offset)?,
        blob_type: type_str.parse().unwrap_or(recall_core::types::BlobType::Doc),
        blob,
        created_at: parse_rfc3339(&created_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobs::BlobStore;
    use crate::open_in_memory;
    use recall_core::types::{Blob, ChatMessage, MessageRole};

    const PROJECT: &str = "__root__";
    const USER: &str = "u-1";

    fn seeded_db() -> Db {
        let db = open_in_memory().unwrap();
        crate::projects::ProjectStore::new(db.clone())
            .ensure_root()
            .unwrap();
        crate::users::UserStore::new(db.clone())
            .create(PROJECT, Some(USER.to_string()), None)
            .unwrap();
        db
    }

    fn seed(db: &Db, text: &str, tokens: usize) -> (String, String) {
        let blobs = BlobStore::new(db.clone());
        let buffer = BufferStore::new(db.clone());
        let blob = Blob::Chat {
            messages: vec![ChatMessage {
                role: MessageRole::User,
                content: text.into(),
                alias: None,
                created_at: None,
            }],
        };
        let blob_id = blobs.put(PROJECT, USER, &blob).unwrap();
        let entry_id = buffer
            .enqueue(PROJECT, USER, BlobType::Chat, &blob_id, tokens)
            .unwrap();
        (blob_id, entry_id)
    }

    #[test]
    fn enqueue_orders_and_sums() {
        let db = seeded_db();
        let buffer = BufferStore::new(db.clone());
        let (_, e1) = seed(&db, "one", 10);
        let (_, e2) = seed(&db, "two", 20);
        let ids = buffer
            .pending_ids(PROJECT, USER, BlobType::Chat, BufferStatus::Idle)
            .unwrap();
        assert_eq!(ids, vec![e1.clone(), e2.clone()]);
        assert_eq!(
            buffer
                .token_sum(PROJECT, USER, BlobType::Chat, BufferStatus::Idle)
                .unwrap(),
            30
        );
        assert_eq!(
            buffer
                .count(PROJECT, USER, BlobType::Chat, BufferStatus::Idle)
                .unwrap(),
            2
        );
    }

    #[test]
    fn mark_enforces_lattice() {
        let db = seeded_db();
        let buffer = BufferStore::new(db.clone());
        let (_, entry) = seed(&db, "x", 5);
        let ids = vec![entry];

        // done requires processing first
        assert_eq!(buffer.mark(&ids, BufferStatus::Done).unwrap(), 0);
        assert_eq!(buffer.mark(&ids, BufferStatus::Processing).unwrap(), 1);
        // idle can never be a target
        assert!(buffer.mark(&ids, BufferStatus::Idle).is_err());
        // a second processing claim is a no-op
        assert_eq!(buffer.mark(&ids, BufferStatus::Processing).unwrap(), 0);
        assert_eq!(buffer.mark(&ids, BufferStatus::Done).unwrap(), 1);
        // terminal states stay put
        assert_eq!(buffer.mark(&ids, BufferStatus::Failed).unwrap(), 0);
    }

    #[test]
    fn take_batch_joins_blobs_and_claims() {
        let db = seeded_db();
        let buffer = BufferStore::new(db.clone());
        let (b1, e1) = seed(&db, "first", 5);
        let (_b2, e2) = seed(&db, "second", 7);

        let batch = buffer
            .take_batch(
                PROJECT,
                USER,
                BlobType::Chat,
                &[e1.clone(), e2.clone()],
                BufferStatus::Idle,
            )
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].blob_id, b1);
        assert_eq!(batch[0].token_size, 5);
        // entries got claimed; a second idle take finds nothing
        let again = buffer
            .take_batch(PROJECT, USER, BlobType::Chat, &[e1, e2], BufferStatus::Idle)
            .unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn failed_entries_can_be_retried_internally() {
        let db = seeded_db();
        let buffer = BufferStore::new(db.clone());
        let (_, entry) = seed(&db, "x", 5);
        let ids = vec![entry];
        buffer.mark(&ids, BufferStatus::Processing).unwrap();
        buffer.mark(&ids, BufferStatus::Failed).unwrap();
        let moved = buffer
            .mark_from(&ids, &[BufferStatus::Failed], BufferStatus::Processing)
            .unwrap();
        assert_eq!(moved, 1);
    }
}
