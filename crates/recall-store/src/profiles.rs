use std::sync::Arc;
use std::time::Duration;

use recall_core::types::ProfileAttributes;
use recall_coord::{profile_cache_key, Cache};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::types::ProfileRow;
use crate::{now_rfc3339, Db};

/// One slot mutation inside a delta commit.
#[derive(Debug, Clone)]
pub struct SlotUpdate {
    pub id: String,
    pub content: String,
    /// `None` keeps the slot's current attributes.
    pub attributes: Option<ProfileAttributes>,
}

/// Profile slots with a write-through list cache.
///
/// The cache holds the serialized list view per (project, user) and is
/// invalidated by every successful mutation; it is an optimization, never the
/// source of truth. Corrupt entries are dropped and rehydrated.
pub struct ProfileStore {
    db: Db,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl ProfileStore {
    pub fn new(db: Db, cache: Arc<Cache>, cache_ttl: Duration) -> Self {
        Self {
            db,
            cache,
            cache_ttl,
        }
    }

    /// All slots for a user, ordered `updated_at desc`, served from cache
    /// when fresh.
    pub fn list(&self, project_id: &str, user_id: &str) -> Result<Vec<ProfileRow>> {
        let key = profile_cache_key(project_id, user_id);
        if let Some(cached) = self.cache.get(&key) {
            match serde_json::from_str::<Vec<ProfileRow>>(&cached) {
                Ok(rows) => return Ok(rows),
                Err(e) => {
                    warn!(user_id, error = %e, "dropping corrupt profile cache entry");
                    self.cache.remove(&key);
                }
            }
        }
        let rows = self.list_uncached(project_id, user_id)?;
        if let Ok(serialized) = serde_json::to_string(&rows) {
            self.cache.set(&key, serialized, self.cache_ttl);
        }
        Ok(rows)
    }

    fn list_uncached(&self, project_id: &str, user_id: &str) -> Result<Vec<ProfileRow>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, topic, sub_topic, content, update_hits, created_at, updated_at
             FROM user_profiles
             WHERE project_id = ?1 AND user_id = ?2
             ORDER BY updated_at DESC, rowid DESC",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![project_id, user_id], row_to_profile)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn get(&self, project_id: &str, user_id: &str, profile_id: &str) -> Result<ProfileRow> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, topic, sub_topic, content, update_hits, created_at, updated_at
             FROM user_profiles
             WHERE id = ?1 AND project_id = ?2 AND user_id = ?3",
            rusqlite::params![profile_id, project_id, user_id],
            row_to_profile,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound {
                kind: "profile",
                id: profile_id.to_string(),
            },
            e => StoreError::Database(e),
        })
    }

    pub fn add_many(
        &self,
        project_id: &str,
        user_id: &str,
        slots: &[(String, ProfileAttributes)],
    ) -> Result<Vec<String>> {
        let ids = {
            let mut db = self.db.lock().unwrap();
            let tx = db.transaction()?;
            let ids = insert_slots(&tx, project_id, user_id, slots)?;
            tx.commit()?;
            ids
        };
        self.invalidate(project_id, user_id);
        Ok(ids)
    }

    /// Update slot contents. `bump_hits` increments `update_hits` (the merge
    /// path); operator edits leave the counter alone. Missing slots are
    /// skipped with a warning, mirroring slots deleted by a concurrent
    /// reorganization.
    pub fn update_many(
        &self,
        project_id: &str,
        user_id: &str,
        updates: &[SlotUpdate],
        bump_hits: bool,
    ) -> Result<Vec<String>> {
        let updated = {
            let mut db = self.db.lock().unwrap();
            let tx = db.transaction()?;
            let updated = apply_updates(&tx, project_id, user_id, updates, bump_hits)?;
            tx.commit()?;
            updated
        };
        self.invalidate(project_id, user_id);
        Ok(updated)
    }

    pub fn delete_many(&self, project_id: &str, user_id: &str, ids: &[String]) -> Result<()> {
        {
            let mut db = self.db.lock().unwrap();
            let tx = db.transaction()?;
            delete_slots(&tx, project_id, user_id, ids)?;
            tx.commit()?;
        }
        self.invalidate(project_id, user_id);
        Ok(())
    }

    /// Apply one flush's adds, updates, and deletes atomically. Readers see
    /// either the full delta or none of it; the cache entry is gone before
    /// this returns.
    #[instrument(skip(self, adds, updates, deletes), fields(project_id, user_id))]
    pub fn commit_delta(
        &self,
        project_id: &str,
        user_id: &str,
        adds: &[(String, ProfileAttributes)],
        updates: &[SlotUpdate],
        deletes: &[String],
    ) -> Result<Vec<String>> {
        let added = {
            let mut db = self.db.lock().unwrap();
            let tx = db.transaction()?;
            let added = insert_slots(&tx, project_id, user_id, adds)?;
            apply_updates(&tx, project_id, user_id, updates, true)?;
            delete_slots(&tx, project_id, user_id, deletes)?;
            tx.commit()?;
            added
        };
        self.invalidate(project_id, user_id);
        debug!(
            added = added.len(),
            updated = updates.len(),
            deleted = deletes.len(),
            "profile delta committed"
        );
        Ok(added)
    }

    /// Drop the cached list view for a user. Mutations through this store
    /// call it themselves; cascades that delete profile rows elsewhere (user
    /// deletion) must call it so the TTL window cannot serve dead slots.
    pub fn invalidate(&self, project_id: &str, user_id: &str) {
        self.cache.remove(&profile_cache_key(project_id, user_id));
    }
}

fn validate_attributes(attrs: &ProfileAttributes) -> Result<()> {
    if !attrs.is_valid() {
        return Err(StoreError::InvalidProfile(format!(
            "empty topic or sub_topic in '{attrs}'"
        )));
    }
    Ok(())
}

fn insert_slots(
    tx: &rusqlite::Transaction<'_>,
    project_id: &str,
    user_id: &str,
    slots: &[(String, ProfileAttributes)],
) -> Result<Vec<String>> {
    let now = now_rfc3339();
    let mut ids = Vec::with_capacity(slots.len());
    for (content, attrs) in slots {
        validate_attributes(attrs)?;
        let id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO user_profiles
             (id, project_id, user_id, topic, sub_topic, content, update_hits, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)",
            rusqlite::params![id, project_id, user_id, attrs.topic, attrs.sub_topic, content, now],
        )?;
        ids.push(id);
    }
    Ok(ids)
}

fn apply_updates(
    tx: &rusqlite::Transaction<'_>,
    project_id: &str,
    user_id: &str,
    updates: &[SlotUpdate],
    bump_hits: bool,
) -> Result<Vec<String>> {
    let now = now_rfc3339();
    let hit_increment = if bump_hits { 1 } else { 0 };
    let mut updated = Vec::with_capacity(updates.len());
    for u in updates {
        if let Some(attrs) = &u.attributes {
            validate_attributes(attrs)?;
        }
        let changed = match &u.attributes {
            Some(attrs) => tx.execute(
                "UPDATE user_profiles
                 SET content = ?1, topic = ?2, sub_topic = ?3,
                     update_hits = update_hits + ?4, updated_at = ?5
                 WHERE id = ?6 AND project_id = ?7 AND user_id = ?8",
                rusqlite::params![
                    u.content,
                    attrs.topic,
                    attrs.sub_topic,
                    hit_increment,
                    now,
                    u.id,
                    project_id,
                    user_id
                ],
            )?,
            None => tx.execute(
                "UPDATE user_profiles
                 SET content = ?1, update_hits = update_hits + ?2, updated_at = ?3
                 WHERE id = ?4 AND project_id = ?5 AND user_id = ?6",
                rusqlite::params![u.content, hit_increment, now, u.id, project_id, user_id],
            )?,
        };
        if changed == 0 {
            warn!(profile_id = %u.id, "profile to update not found, skipping");
        } else {
            updated.push(u.id.clone());
        }
    }
    Ok(updated)
}

fn delete_slots(
    tx: &rusqlite::Transaction<'_>,
    project_id: &str,
    user_id: &str,
    ids: &[String],
) -> Result<()> {
    for id in ids {
        tx.execute(
            "DELETE FROM user_profiles WHERE id = ?1 AND project_id = ?2 AND user_id = ?3",
            rusqlite::params![id, project_id, user_id],
        )?;
    }
    Ok(())
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        id: row.get(0)?,
        attributes: ProfileAttributes {
            topic: row.get(1)?,
            sub_topic: row.get(2)?,
        },
        content: row.get(3)?,
        update_hits: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
