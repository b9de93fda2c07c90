//! Checkpoint file schema
//!
//! A checkpoint is a standalone SQLite file written in one transaction.

/// SQL schema for a checkpoint file
pub const SCHEMA_SQL: &str = r#"
-- Key/value facts about the checkpoint itself
CREATE TABLE IF NOT EXISTS checkpoint_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Pending panoramas in queue order
CREATE TABLE IF NOT EXISTS frontier (
    position INTEGER PRIMARY KEY,
    node_id TEXT NOT NULL
);

-- Every panorama id ever enqueued
CREATE TABLE IF NOT EXISTS seen (
    node_id TEXT PRIMARY KEY
);

-- Records of admitted panoramas
CREATE TABLE IF NOT EXISTS visited (
    node_id TEXT PRIMARY KEY,
    lat REAL NOT NULL,
    lng REAL NOT NULL,
    year INTEGER,
    month INTEGER
);
"#;

/// Current checkpoint layout version
pub const SCHEMA_VERSION: u32 = 1;

/// Creates the checkpoint tables
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)
}
