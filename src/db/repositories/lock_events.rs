use std::path::PathBuf;

use anyhow::Result;
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_lock_reason},
    models::{LockEvent, LockEventRecord},
};

fn row_to_record(row: &Row) -> Result<LockEventRecord> {
    let reason: String = row.get("reason")?;
    let occurred_at: String = row.get("occurred_at")?;
    let snapshot_path: Option<String> = row.get("snapshot_path")?;

    Ok(LockEventRecord {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        event: LockEvent {
            reason: parse_lock_reason(&reason)?,
            message: row.get("message")?,
            timestamp: parse_datetime(&occurred_at, "occurred_at")?,
            snapshot: snapshot_path.map(PathBuf::from),
        },
    })
}

impl Database {
    pub async fn insert_lock_event(&self, session_id: &str, event: &LockEvent) -> Result<i64> {
        let session_id = session_id.to_string();
        let record = event.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO lock_events (session_id, reason, message, occurred_at, snapshot_path)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    session_id,
                    record.reason.as_str(),
                    record.message,
                    record.timestamp.to_rfc3339(),
                    record
                        .snapshot
                        .as_ref()
                        .map(|path| path.to_string_lossy().into_owned()),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn lock_events_for_session(&self, session_id: &str) -> Result<Vec<LockEventRecord>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, reason, message, occurred_at, snapshot_path
                 FROM lock_events
                 WHERE session_id = ?1
                 ORDER BY occurred_at ASC, id ASC",
            )?;

            let mut rows = stmt.query(params![session_id])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_record(row)?);
            }
            Ok(records)
        })
        .await
    }
}
