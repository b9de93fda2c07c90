//! SQLite checkpoint files
//!
//! A checkpoint is written into a fresh temporary file in one transaction
//! and then renamed over the destination, so an interrupted or refused
//! write never leaves a half-written checkpoint behind.

use crate::state::{CaptureDate, CrawlSnapshot, NodeId, NodeRecord};
use crate::storage::schema::{initialize_schema, SCHEMA_VERSION};
use crate::storage::CheckpointError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Facts recorded alongside a checkpoint's crawl state
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointMeta {
    pub saved_at: DateTime<Utc>,
    pub config_hash: Option<String>,
    pub schema_version: u32,
}

/// Writes a snapshot to `path`
///
/// Refuses with [`CheckpointError::InFlight`] when the snapshot was taken
/// while panoramas were still being processed; the file at `path` is left
/// untouched in that case and on any other failure.
pub fn write_snapshot(
    path: &Path,
    snapshot: &CrawlSnapshot,
    config_hash: Option<&str>,
) -> Result<CheckpointMeta, CheckpointError> {
    if snapshot.in_flight != 0 {
        return Err(CheckpointError::InFlight(snapshot.in_flight));
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let meta = CheckpointMeta {
        saved_at: Utc::now(),
        config_hash: config_hash.map(str::to_string),
        schema_version: SCHEMA_VERSION,
    };

    let tmp = temp_path(path);
    if tmp.exists() {
        fs::remove_file(&tmp)?;
    }

    if let Err(e) = write_file(&tmp, snapshot, &meta) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    fs::rename(&tmp, path)?;
    Ok(meta)
}

fn write_file(
    path: &Path,
    snapshot: &CrawlSnapshot,
    meta: &CheckpointMeta,
) -> Result<(), CheckpointError> {
    let mut conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA synchronous = FULL;")?;
    initialize_schema(&conn)?;

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare("INSERT INTO checkpoint_meta (key, value) VALUES (?1, ?2)")?;
        stmt.execute(params!["schema_version", meta.schema_version.to_string()])?;
        stmt.execute(params!["saved_at", meta.saved_at.to_rfc3339()])?;
        stmt.execute(params!["in_flight", snapshot.in_flight.to_string()])?;
        if let Some(hash) = &meta.config_hash {
            stmt.execute(params!["config_hash", hash])?;
        }

        let mut stmt = tx.prepare("INSERT INTO frontier (position, node_id) VALUES (?1, ?2)")?;
        for (position, id) in snapshot.queue.iter().enumerate() {
            stmt.execute(params![position as i64, id.as_str()])?;
        }

        let mut stmt = tx.prepare("INSERT INTO seen (node_id) VALUES (?1)")?;
        for id in &snapshot.seen {
            stmt.execute(params![id.as_str()])?;
        }

        let mut stmt = tx.prepare(
            "INSERT INTO visited (node_id, lat, lng, year, month) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for (id, record) in &snapshot.visited {
            stmt.execute(params![
                id.as_str(),
                record.location.lat,
                record.location.lng,
                record.date.map(|d| d.year),
                record.date.map(|d| d.month),
            ])?;
        }
    }
    tx.commit()?;

    conn.close().map_err(|(_, e)| e)?;
    Ok(())
}

/// Reads a snapshot back from `path`
pub fn read_snapshot(path: &Path) -> Result<(CrawlSnapshot, CheckpointMeta), CheckpointError> {
    if !path.exists() {
        return Err(CheckpointError::Missing(path.to_path_buf()));
    }

    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let corrupt = |reason: String| CheckpointError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let facts: HashMap<String, String> = {
        let mut stmt = conn.prepare("SELECT key, value FROM checkpoint_meta")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<_, _>>()?
    };

    let schema_version: u32 = facts
        .get("schema_version")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| corrupt("missing schema version".to_string()))?;
    if schema_version != SCHEMA_VERSION {
        return Err(corrupt(format!(
            "unsupported schema version {}",
            schema_version
        )));
    }

    let in_flight: usize = facts
        .get("in_flight")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| corrupt("missing in-flight count".to_string()))?;
    if in_flight != 0 {
        return Err(corrupt(format!(
            "written with {} panoramas in flight",
            in_flight
        )));
    }

    let saved_at = facts
        .get("saved_at")
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| corrupt("missing save timestamp".to_string()))?;

    let queue: Vec<NodeId> = {
        let mut stmt = conn.prepare("SELECT node_id FROM frontier ORDER BY position")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.map(|r| r.map(NodeId::from))
            .collect::<Result<_, _>>()?
    };

    let seen: HashSet<NodeId> = {
        let mut stmt = conn.prepare("SELECT node_id FROM seen")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.map(|r| r.map(NodeId::from))
            .collect::<Result<_, _>>()?
    };

    let visited: HashMap<NodeId, NodeRecord> = {
        let mut stmt = conn.prepare("SELECT node_id, lat, lng, year, month FROM visited")?;
        let rows = stmt.query_map([], |row| {
            let year: Option<i32> = row.get(3)?;
            let month: Option<u32> = row.get(4)?;
            let record = NodeRecord {
                location: crate::area::LatLng::new(row.get(1)?, row.get(2)?),
                date: match (year, month) {
                    (Some(year), Some(month)) => Some(CaptureDate { year, month }),
                    _ => None,
                },
            };
            Ok((NodeId::from(row.get::<_, String>(0)?), record))
        })?;
        rows.collect::<Result<_, _>>()?
    };

    let meta = CheckpointMeta {
        saved_at,
        config_hash: facts.get("config_hash").cloned(),
        schema_version,
    };

    let snapshot = CrawlSnapshot {
        queue,
        seen,
        visited,
        in_flight: 0,
    };

    Ok((snapshot, meta))
}

/// Sibling path used while a file is being written
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
