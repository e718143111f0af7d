use chrono::{Duration, Utc};
use tracing::info;

use recall_core::config::ROOT_PROJECT_ID;

use crate::error::{Result, StoreError};
use crate::types::{DailyUsage, ProjectRecord};
use crate::{now_rfc3339, Db};

/// Tenant records plus the per-project LLM usage ledger.
pub struct ProjectStore {
    db: Db,
}

impl ProjectStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Ensure the reserved root project exists. Called once at startup.
    pub fn ensure_root(&self) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = now_rfc3339();
        let inserted = db.execute(
            "INSERT OR IGNORE INTO projects (id, secret, status, profile_config, created_at, updated_at)
             VALUES (?1, NULL, 'active', '', ?2, ?2)",
            rusqlite::params![ROOT_PROJECT_ID, now],
        )?;
        if inserted > 0 {
            info!(project_id = ROOT_PROJECT_ID, "root project created");
        }
        Ok(())
    }

    pub fn get(&self, project_id: &str) -> Result<Option<ProjectRecord>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT id, secret, status, profile_config, created_at, updated_at
             FROM projects WHERE id = ?1",
            [project_id],
            row_to_project,
        ) {
            Ok(p) => Ok(Some(p)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Resolve a per-project bearer token to its project id.
    pub fn find_by_secret(&self, secret: &str) -> Result<Option<String>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT id FROM projects WHERE secret = ?1",
            [secret],
            |row| row.get(0),
        ) {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    pub fn profile_config(&self, project_id: &str) -> Result<String> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT profile_config FROM projects WHERE id = ?1",
            [project_id],
            |row| row.get(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound {
                kind: "project",
                id: project_id.to_string(),
            },
            e => StoreError::Database(e),
        })
    }

    /// The project's profile config, parsed. An empty document yields the
    /// all-defaults config.
    pub fn parsed_profile_config(
        &self,
        project_id: &str,
    ) -> Result<recall_core::project::ProfileConfig> {
        let doc = self.profile_config(project_id)?;
        recall_core::project::ProfileConfig::from_yaml(&doc)
            .map_err(|e| StoreError::InvalidProfile(e.to_string()))
    }

    pub fn set_profile_config(&self, project_id: &str, doc: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE projects SET profile_config = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![doc, now_rfc3339(), project_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                kind: "project",
                id: project_id.to_string(),
            });
        }
        Ok(())
    }

    /// Add today's LLM token spend for a project.
    pub fn record_usage(&self, project_id: &str, input_tokens: u64, output_tokens: u64) -> Result<()> {
        let date = Utc::now().format("%Y-%m-%d").to_string();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO llm_usage (project_id, date, input_tokens, output_tokens)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (project_id, date) DO UPDATE SET
                input_tokens = input_tokens + excluded.input_tokens,
                output_tokens = output_tokens + excluded.output_tokens",
            rusqlite::params![project_id, date, input_tokens as i64, output_tokens as i64],
        )?;
        Ok(())
    }

    /// Daily usage for the past `last_days` days, today first. Days with no
    /// recorded spend come back zeroed.
    pub fn usage(&self, project_id: &str, last_days: u32) -> Result<Vec<DailyUsage>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT input_tokens, output_tokens FROM llm_usage
             WHERE project_id = ?1 AND date = ?2",
        )?;
        let mut results = Vec::with_capacity(last_days as usize);
        for i in 0..last_days {
            let date = (Utc::now() - Duration::days(i as i64))
                .format("%Y-%m-%d")
                .to_string();
            let row = stmt
                .query_row(rusqlite::params![project_id, date], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
                })
                .unwrap_or((0, 0));
            results.push(DailyUsage {
                date,
                input_tokens: row.0,
                output_tokens: row.1,
            });
        }
        Ok(results)
    }
}

fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProjectRecord> {
    Ok(ProjectRecord {
        id: row.get(0)?,
        secret: row.get(1)?,
        status: row.get(2)?,
        profile_config: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}
