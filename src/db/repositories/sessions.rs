use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_optional_datetime, parse_status, to_u32},
    models::{Session, SessionStatus},
};
use crate::sentinel::UserId;

const SESSION_COLUMNS: &str =
    "id, user_id, started_at, ended_at, status, absence_events, created_at, updated_at";

fn row_to_session(row: &Row) -> Result<Session> {
    let started_at: String = row.get("started_at")?;
    let ended_at: Option<String> = row.get("ended_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let status: String = row.get("status")?;
    let absence_events: i64 = row.get("absence_events")?;

    Ok(Session {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        ended_at: parse_optional_datetime(ended_at, "ended_at")?,
        status: parse_status(&status)?,
        absence_event_count: to_u32(absence_events, "absence_events")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    /// Opens a monitoring session for `user_id` and returns its id.
    pub async fn start_session(&self, user_id: UserId) -> Result<String> {
        let session_id = Uuid::new_v4().to_string();
        let started_at = Utc::now().to_rfc3339();
        let id = session_id.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, started_at, ended_at, status, absence_events, created_at, updated_at)
                 VALUES (?1, ?2, ?3, NULL, ?4, 0, ?3, ?3)",
                params![id, user_id, started_at, SessionStatus::Running.as_str()],
            )?;
            Ok(())
        })
        .await?;
        Ok(session_id)
    }

    /// Closes a session with its final lock count.
    pub async fn end_session(
        &self,
        session_id: &str,
        absence_event_count: u32,
        ended_at: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE sessions
                 SET status = ?1,
                     absence_events = ?2,
                     ended_at = ?3,
                     updated_at = ?3
                 WHERE id = ?4",
                params![
                    SessionStatus::Completed.as_str(),
                    absence_event_count,
                    ended_at.to_rfc3339(),
                    session_id,
                ],
            )?;

            if rows_affected == 0 {
                bail!("session {session_id} not found");
            }
            Ok(())
        })
        .await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Session> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"
            ))?;

            let mut rows = stmt.query(params![session_id])?;
            match rows.next()? {
                Some(row) => row_to_session(row),
                None => bail!("session {session_id} not found"),
            }
        })
        .await
    }

    /// Sessions still marked `Running`, newest first. After a clean shutdown
    /// this is empty.
    pub async fn get_incomplete_sessions(&self) -> Result<Vec<Session>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS}
                 FROM sessions
                 WHERE status = 'Running'
                 ORDER BY started_at DESC"
            ))?;

            let mut rows = stmt.query([])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    pub async fn mark_session_interrupted(
        &self,
        session_id: &str,
        stopped_at: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET status = ?1,
                     ended_at = ?2,
                     updated_at = ?2
                 WHERE id = ?3",
                params![
                    SessionStatus::Interrupted.as_str(),
                    stopped_at.to_rfc3339(),
                    session_id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_sessions_for_user(&self, user_id: UserId) -> Result<Vec<Session>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS}
                 FROM sessions
                 WHERE user_id = ?1
                 ORDER BY started_at DESC"
            ))?;

            let mut rows = stmt.query(params![user_id])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }
}
