use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::types::{UserOverview, UserRecord};
use crate::{now_rfc3339, Db};

pub struct UserStore {
    db: Db,
}

impl UserStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Create a user, honouring a client-supplied UUID when given.
    #[instrument(skip(self, additional_fields))]
    pub fn create(
        &self,
        project_id: &str,
        user_id: Option<String>,
        additional_fields: Option<serde_json::Value>,
    ) -> Result<String> {
        let id = user_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let fields = additional_fields
            .map(|f| serde_json::to_string(&f))
            .transpose()?;
        let now = now_rfc3339();
        let db = self.db.lock().unwrap();
        let inserted = db.execute(
            "INSERT OR IGNORE INTO users (id, project_id, additional_fields, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            rusqlite::params![id, project_id, fields, now],
        )?;
        if inserted == 0 {
            return Err(StoreError::InvalidProfile(format!(
                "user {id} already exists"
            )));
        }
        Ok(id)
    }

    pub fn get(&self, project_id: &str, user_id: &str) -> Result<UserRecord> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, project_id, additional_fields, created_at, updated_at
             FROM users WHERE id = ?1 AND project_id = ?2",
            rusqlite::params![user_id, project_id],
            row_to_user,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound {
                kind: "user",
                id: user_id.to_string(),
            },
            e => StoreError::Database(e),
        })
    }

    pub fn update(
        &self,
        project_id: &str,
        user_id: &str,
        additional_fields: Option<serde_json::Value>,
    ) -> Result<()> {
        let fields = additional_fields
            .map(|f| serde_json::to_string(&f))
            .transpose()?;
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE users SET additional_fields = ?1, updated_at = ?2
             WHERE id = ?3 AND project_id = ?4",
            rusqlite::params![fields, now_rfc3339(), user_id, project_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                kind: "user",
                id: user_id.to_string(),
            });
        }
        Ok(())
    }

    /// Delete a user and everything hanging off it: blobs, buffer entries,
    /// profiles, events. One transaction so readers never see a half-gone
    /// user.
    #[instrument(skip(self))]
    pub fn delete(&self, project_id: &str, user_id: &str) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        let user_rows = tx.execute(
            "DELETE FROM users WHERE id = ?1 AND project_id = ?2",
            rusqlite::params![user_id, project_id],
        )?;
        if user_rows == 0 {
            return Err(StoreError::NotFound {
                kind: "user",
                id: user_id.to_string(),
            });
        }
        for table in [
            "blobs",
            "buffer_zone",
            "user_profiles",
            "user_events",
            "user_statuses",
        ] {
            tx.execute(
                &format!("DELETE FROM {table} WHERE user_id = ?1 AND project_id = ?2"),
                rusqlite::params![user_id, project_id],
            )?;
        }
        tx.commit()?;
        info!(user_id, "user deleted with cascade");
        Ok(())
    }

    /// Admin listing: users with profile/event counts, most recently updated
    /// first. `search` filters by id substring.
    pub fn list(
        &self,
        project_id: &str,
        search: &str,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<UserOverview>, i64)> {
        let pattern = format!("%{search}%");
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT u.id, u.project_id, u.additional_fields, u.created_at, u.updated_at,
                    (SELECT COUNT(*) FROM user_profiles p
                      WHERE p.user_id = u.id AND p.project_id = u.project_id),
                    (SELECT COUNT(*) FROM user_events e
                      WHERE e.user_id = u.id AND e.project_id = u.project_id)
             FROM users u
             WHERE u.project_id = ?1 AND u.id LIKE ?2
             ORDER BY u.updated_at DESC
             LIMIT ?3 OFFSET ?4",
        )?;
        let users = stmt
            .query_map(
                rusqlite::params![project_id, pattern, limit as i64, offset as i64],
                |row| {
                    Ok(UserOverview {
                        user: row_to_user(row)?,
                        profile_count: row.get(5)?,
                        event_count: row.get(6)?,
                    })
                },
            )?
            .filter_map(|r| r.ok())
            .collect();
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM users WHERE project_id = ?1 AND id LIKE ?2",
            rusqlite::params![project_id, pattern],
            |row| row.get(0),
        )?;
        Ok((users, count))
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
    let fields: Option<String> = row.get(2)?;
    Ok(UserRecord {
        id: row.get(0)?,
        project_id: row.get(1)?,
        additional_fields: fields.and_then(|f| serde_json::from_str(&f).ok()),
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_in_memory;

    const PROJECT: &str = "__root__";

    fn seeded_db() -> Db {
        let db = open_in_memory().unwrap();
        crate::projects::ProjectStore::new(db.clone())
            .ensure_root()
            .unwrap();
        db
    }

    #[test]
    fn create_get_update_delete() {
        let store = UserStore::new(seeded_db());
        let id = store
            .create(PROJECT, None, Some(serde_json::json!({"plan": "pro"})))
            .unwrap();
        let user = store.get(PROJECT, &id).unwrap();
        assert_eq!(user.additional_fields.unwrap()["plan"], "pro");

        store
            .update(PROJECT, &id, Some(serde_json::json!({"plan": "free"})))
            .unwrap();
        let user = store.get(PROJECT, &id).unwrap();
        assert_eq!(user.additional_fields.unwrap()["plan"], "free");

        store.delete(PROJECT, &id).unwrap();
        assert!(store.get(PROJECT, &id).is_err());
    }

    #[test]
    fn client_supplied_id_and_duplicate_rejection() {
        let store = UserStore::new(seeded_db());
        let id = store
            .create(PROJECT, Some("fixed-id".into()), None)
            .unwrap();
        assert_eq!(id, "fixed-id");
        assert!(store.create(PROJECT, Some("fixed-id".into()), None).is_err());
    }

    #[test]
    fn delete_cascades_to_owned_rows() {
        let db = seeded_db();
        let store = UserStore::new(db.clone());
        let id = store.create(PROJECT, None, None).unwrap();
        {
            let conn = db.lock().unwrap();
            conn.execute(
                "INSERT INTO user_profiles (id, project_id, user_id, topic, sub_topic, content, created_at, updated_at)
                 VALUES ('p1', ?1, ?2, 't', 's', 'c', '2025', '2025')",
                rusqlite::params![PROJECT, id],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO buffer_zone (id, project_id, user_id, blob_id, blob_type, created_at)
                 VALUES ('b1', ?1, ?2, 'blob', 'chat', '2025')",
                rusqlite::params![PROJECT, id],
            )
            .unwrap();
        }
        store.delete(PROJECT, &id).unwrap();
        let conn = db.lock().unwrap();
        let profiles: i64 = conn
            .query_row("SELECT COUNT(*) FROM user_profiles", [], |r| r.get(0))
            .unwrap();
        let buffered: i64 = conn
            .query_row("SELECT COUNT(*) FROM buffer_zone", [], |r| r.get(0))
            .unwrap();
        assert_eq!(profiles, 0);
        assert_eq!(buffered, 0);
    }
}
