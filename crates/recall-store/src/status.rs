use tracing::instrument;
use uuid::Uuid;

use crate::error::Result;
use crate::types::StatusRow;
use crate::{now_rfc3339, Db};

/// Typed append-only status records attached to a user (e.g. roleplay plot
/// state). Same discipline as events: written once, read newest-first.
pub struct UserStatusStore {
    db: Db,
}

impl UserStatusStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    #[instrument(skip(self, attributes))]
    pub fn append(
        &self,
        project_id: &str,
        user_id: &str,
        status_type: &str,
        attributes: serde_json::Value,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO user_statuses (id, project_id, user_id, type, attributes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            rusqlite::params![
                id,
                project_id,
                user_id,
                status_type,
                serde_json::to_string(&attributes)?,
                now_rfc3339()
            ],
        )?;
        Ok(id)
    }

    /// Newest-first page of one status type.
    pub fn list(
        &self,
        project_id: &str,
        user_id: &str,
        status_type: &str,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<StatusRow>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, type, attributes, created_at, updated_at FROM user_statuses
             WHERE project_id = ?1 AND user_id = ?2 AND type = ?3
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?4 OFFSET ?5",
        )?;
        let rows = stmt
            .query_map(
                rusqlite::params![
                    project_id,
                    user_id,
                    status_type,
                    page_size as i64,
                    (page * page_size) as i64
                ],
                |row| {
                    let attrs: String = row.get(2)?;
                    Ok(StatusRow {
                        id: row.get(0)?,
                        status_type: row.get(1)?,
                        attributes: serde_json::from_str(&attrs).unwrap_or_default(),
                        created_at: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                },
            )?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_in_memory;

    #[test]
    fn append_and_page_newest_first() {
        let store = UserStatusStore::new(open_in_memory().unwrap());
        for i in 0..3 {
            store
                .append(
                    "__root__",
                    "u-1",
                    "plot",
                    serde_json::json!({"chapter": i}),
                )
                .unwrap();
        }
        let page = store.list("__root__", "u-1", "plot", 0, 2).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].attributes["chapter"], 2);
        assert!(store.list("__root__", "u-1", "other", 0, 10).unwrap().is_empty());
    }
}
