use rusqlite::{Connection, Result};

/// Initialise all tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_projects_table(conn)?;
    create_users_table(conn)?;
    create_blobs_table(conn)?;
    create_buffer_table(conn)?;
    create_profiles_table(conn)?;
    create_events_table(conn)?;
    create_statuses_table(conn)?;
    create_usage_table(conn)?;
    Ok(())
}

fn create_projects_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS projects (
            id              TEXT PRIMARY KEY NOT NULL,
            secret          TEXT,
            status          TEXT NOT NULL DEFAULT 'active',
            profile_config  TEXT NOT NULL DEFAULT '',
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );",
    )
}

fn create_users_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id                 TEXT PRIMARY KEY NOT NULL,
            project_id         TEXT NOT NULL REFERENCES projects(id),
            additional_fields  TEXT,  -- JSON object
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_users_project
            ON users (project_id, updated_at DESC);",
    )
}

fn create_blobs_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS blobs (
            id          TEXT PRIMARY KEY NOT NULL,
            project_id  TEXT NOT NULL,
            user_id     TEXT NOT NULL REFERENCES users(id),
            blob_type   TEXT NOT NULL,
            blob_data   TEXT NOT NULL,  -- JSON, tagged by type
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_blobs_user
            ON blobs (project_id, user_id, blob_type, created_at);",
    )
}

fn create_buffer_table(conn: &Connection) -> Result<()> {
    // rowid keeps arrival order stable when created_at collides
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS buffer_zone (
            id          TEXT PRIMARY KEY NOT NULL,
            project_id  TEXT NOT NULL,
            user_id     TEXT NOT NULL,
            blob_id     TEXT NOT NULL,
            blob_type   TEXT NOT NULL,
            token_size  INTEGER NOT NULL DEFAULT 0,
            status      TEXT NOT NULL DEFAULT 'idle',
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_buffer_user_status
            ON buffer_zone (project_id, user_id, blob_type, status);",
    )
}

fn create_profiles_table(conn: &Connection) -> Result<()> {
    // (topic, sub_topic) soft-uniqueness is enforced by the consolidation
    // pipeline, not by a constraint: operator writes may transiently violate it
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS user_profiles (
            id           TEXT PRIMARY KEY NOT NULL,
            project_id   TEXT NOT NULL,
            user_id      TEXT NOT NULL,
            topic        TEXT NOT NULL,
            sub_topic    TEXT NOT NULL,
            content      TEXT NOT NULL,
            update_hits  INTEGER NOT NULL DEFAULT 0,
            created_at   TEXT NOT NULL,
            updated_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_profiles_user
            ON user_profiles (project_id, user_id, updated_at DESC);
        CREATE INDEX IF NOT EXISTS idx_profiles_attrs
            ON user_profiles (project_id, user_id, topic, sub_topic);",
    )
}

fn create_events_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS user_events (
            id             TEXT PRIMARY KEY NOT NULL,
            project_id     TEXT NOT NULL,
            user_id        TEXT NOT NULL,
            event_tip      TEXT,
            event_tags     TEXT,           -- JSON array of {tag, value}
            profile_delta  TEXT NOT NULL DEFAULT '[]',
            embedding      BLOB,           -- f32 little-endian, NULL when unavailable
            created_at     TEXT NOT NULL,
            updated_at     TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_events_user
            ON user_events (project_id, user_id, created_at DESC);",
    )
}

fn create_statuses_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS user_statuses (
            id          TEXT PRIMARY KEY NOT NULL,
            project_id  TEXT NOT NULL,
            user_id     TEXT NOT NULL,
            type        TEXT NOT NULL,
            attributes  TEXT NOT NULL DEFAULT '{}',  -- JSON
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_statuses_user
            ON user_statuses (project_id, user_id, type, created_at DESC);",
    )
}

fn create_usage_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS llm_usage (
            project_id     TEXT NOT NULL,
            date           TEXT NOT NULL,  -- YYYY-MM-DD
            input_tokens   INTEGER NOT NULL DEFAULT 0,
            output_tokens  INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (project_id, date)
        );",
    )
}
