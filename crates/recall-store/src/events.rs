use chrono::{DateTime, Utc};
use recall_core::tokens::count_tokens;
use recall_core::types::EventData;
use tracing::instrument;
use uuid::Uuid;

use crate::blobs::parse_rfc3339;
use crate::error::{Result, StoreError};
use crate::types::{EventPatch, EventRow};
use crate::{now_rfc3339, Db};

/// Append-only per-user event log with optional embeddings for semantic
/// search.
pub struct EventStore {
    db: Db,
}

impl EventStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Append an event. The embedding (of the event tip) may be absent when
    /// the embedding provider failed; such rows are skipped by search.
    #[instrument(skip(self, data, embedding))]
    pub fn append(
        &self,
        project_id: &str,
        user_id: &str,
        data: &EventData,
        embedding: Option<&[f32]>,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = now_rfc3339();
        let tags = data
            .event_tags
            .as_ref()
            .map(|t| serde_json::to_string(t))
            .transpose()?;
        let delta = serde_json::to_string(&data.profile_delta)?;
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO user_events
             (id, project_id, user_id, event_tip, event_tags, profile_delta, embedding, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            rusqlite::params![
                id,
                project_id,
                user_id,
                data.event_tip,
                tags,
                delta,
                embedding.map(embedding_to_bytes),
                now
            ],
        )?;
        Ok(id)
    }

    /// Newest events first. `require_tip` keeps only summarized events;
    /// `max_token_size` truncates on the rendered representation, dropping
    /// the first event that would overflow and everything older.
    pub fn list(
        &self,
        project_id: &str,
        user_id: &str,
        topk: usize,
        max_token_size: Option<usize>,
        require_tip: bool,
    ) -> Result<Vec<EventRow>> {
        let db = self.db.lock().unwrap();
        let sql = if require_tip {
            "SELECT id, event_tip, event_tags, profile_delta, created_at, updated_at
             FROM user_events
             WHERE project_id = ?1 AND user_id = ?2 AND event_tip IS NOT NULL
             ORDER BY created_at DESC, rowid DESC LIMIT ?3"
        } else {
            "SELECT id, event_tip, event_tags, profile_delta, created_at, updated_at
             FROM user_events
             WHERE project_id = ?1 AND user_id = ?2
             ORDER BY created_at DESC, rowid DESC LIMIT ?3"
        };
        let mut stmt = db.prepare(sql)?;
        let mut events: Vec<EventRow> = stmt
            .query_map(
                rusqlite::params![project_id, user_id, topk as i64],
                row_to_event,
            )?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);

        if let Some(budget) = max_token_size {
            let mut used = 0;
            let mut kept = Vec::with_capacity(events.len());
            for ev in events {
                used += count_tokens(&ev.data.render(&ev.created_at));
                if used > budget {
                    break;
                }
                kept.push(ev);
            }
            events = kept;
        }
        Ok(events)
    }

    pub fn get(&self, project_id: &str, user_id: &str, event_id: &str) -> Result<EventRow> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, event_tip, event_tags, profile_delta, created_at, updated_at
             FROM user_events
             WHERE id = ?1 AND project_id = ?2 AND user_id = ?3",
            rusqlite::params![event_id, project_id, user_id],
            row_to_event,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound {
                kind: "event",
                id: event_id.to_string(),
            },
            e => StoreError::Database(e),
        })
    }

    /// Operator patch of an existing event; unset fields stay as written.
    pub fn update(
        &self,
        project_id: &str,
        user_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<()> {
        let current = self.get(project_id, user_id, event_id)?;
        let tip = patch
            .event_tip
            .clone()
            .or(current.data.event_tip);
        let tags = patch
            .event_tags
            .clone()
            .or(current.data.event_tags)
            .map(|t| serde_json::to_string(&t))
            .transpose()?;
        let delta = serde_json::to_string(
            patch
                .profile_delta
                .as_ref()
                .unwrap_or(&current.data.profile_delta),
        )?;
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE user_events SET event_tip = ?1, event_tags = ?2, profile_delta = ?3, updated_at = ?4
             WHERE id = ?5 AND project_id = ?6 AND user_id = ?7",
            rusqlite::params![tip, tags, delta, now_rfc3339(), event_id, project_id, user_id],
        )?;
        Ok(())
    }

    pub fn delete(&self, project_id: &str, user_id: &str, event_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "DELETE FROM user_events WHERE id = ?1 AND project_id = ?2 AND user_id = ?3",
            rusqlite::params![event_id, project_id, user_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                kind: "event",
                id: event_id.to_string(),
            });
        }
        Ok(())
    }

    /// Cosine-similarity search over embedded events. Returns up to `k`
    /// events scoring at least `threshold`, best first; equal scores break
    /// toward newer events.
    pub fn search(
        &self,
        project_id: &str,
        user_id: &str,
        query: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<(EventRow, f32)>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, event_tip, event_tags, profile_delta, created_at, updated_at, embedding
             FROM user_events
             WHERE project_id = ?1 AND user_id = ?2 AND embedding IS NOT NULL",
        )?;
        let mut scored: Vec<(EventRow, f32)> = stmt
            .query_map(rusqlite::params![project_id, user_id], |row| {
                let ev = row_to_event(row)?;
                let bytes: Vec<u8> = row.get(6)?;
                Ok((ev, bytes))
            })?
            .filter_map(|r| r.ok())
            .filter_map(|(ev, bytes)| {
                let emb = bytes_to_embedding(&bytes);
                cosine_similarity(query, &emb).map(|score| (ev, score))
            })
            .filter(|(_, score)| *score >= threshold)
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.created_at.cmp(&a.0.created_at))
        });
        scored.truncate(k);
        Ok(scored)
    }
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRow> {
    let tags: Option<String> = row.get(2)?;
    let delta: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;
    Ok(EventRow {
        id: row.get(0)?,
        data: EventData {
            event_tip: row.get(1)?,
            event_tags: tags.and_then(|t| serde_json::from_str(&t).ok()),
            profile_delta: serde_json::from_str(&delta).unwrap_or_default(),
        },
        created_at: parse_rfc3339(&created_at),
        updated_at: parse_rfc3339(&updated_at),
    })
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// `None` when either vector is zero or the dimensions disagree.
fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a * norm_b))
}
