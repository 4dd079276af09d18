//! Session index: durable bookkeeping for the pipeline
//!
//! A keyed store mapping session id to [`SessionIndexEntry`], surviving
//! process restarts. The index owns entry lifecycle: registration is
//! idempotent and status transitions are validated here, so a bug in the
//! orchestration surfaces as a contract error instead of silently
//! corrupting pipeline state.

pub mod schema;

use crate::error::{Error, Result};
use crate::types::{ExtractionStatus, Session, SessionIndexEntry, SummaryStatus, Tool};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

/// Durable session index backed by SQLite.
pub struct SessionIndex {
    conn: Mutex<Connection>,
}

fn entry_from_row(row: &Row) -> rusqlite::Result<SessionIndexEntry> {
    let tool: String = row.get(1)?;
    let discovered_at_str: String = row.get(2)?;
    let summary_status: String = row.get(3)?;
    let summary_ref: Option<String> = row.get(4)?;
    let extraction_status: String = row.get(5)?;

    Ok(SessionIndexEntry {
        session_id: row.get(0)?,
        tool: Tool::from_str(&tool).unwrap_or(Tool::ClaudeCode),
        discovered_at: DateTime::parse_from_rfc3339(&discovered_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        summary_status: SummaryStatus::from_str(&summary_status)
            .unwrap_or(SummaryStatus::Pending),
        summary_ref: summary_ref.map(PathBuf::from),
        extraction_status: ExtractionStatus::from_str(&extraction_status)
            .unwrap_or(ExtractionStatus::Unconsumed),
    })
}

const ENTRY_COLUMNS: &str =
    "session_id, tool, discovered_at, summary_status, summary_ref, extraction_status";

/// Fixed-width RFC 3339 so string comparison in SQL orders chronologically.
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl SessionIndex {
    /// Open or create an index database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        let index = Self {
            conn: Mutex::new(conn),
        };
        index.migrate()?;
        Ok(index)
    }

    /// Open an in-memory index (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let index = Self {
            conn: Mutex::new(conn),
        };
        index.migrate()?;
        Ok(index)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        schema::run_migrations(&conn)
    }

    /// Register a session, idempotently.
    ///
    /// If the id already exists the stored entry is returned unchanged:
    /// registration never regresses `summary_status` or
    /// `extraction_status`. New sessions start `Pending`/`Unconsumed`.
    pub fn register(&self, session: &Session) -> Result<SessionIndexEntry> {
        let conn = self.conn.lock().unwrap();

        if let Some(existing) = Self::get_locked(&conn, &session.id)? {
            return Ok(existing);
        }

        let now = Utc::now();
        conn.execute(
            r#"
            INSERT INTO session_index
                (session_id, tool, discovered_at, summary_status, summary_ref,
                 extraction_status, updated_at)
            VALUES (?1, ?2, ?3, 'pending', NULL, 'unconsumed', ?4)
            "#,
            params![
                session.id,
                session.tool.as_str(),
                timestamp(now),
                timestamp(now)
            ],
        )?;

        tracing::debug!(session_id = %session.id, tool = %session.tool, "Registered session");

        Ok(SessionIndexEntry {
            session_id: session.id.clone(),
            tool: session.tool,
            discovered_at: now,
            summary_status: SummaryStatus::Pending,
            summary_ref: None,
            extraction_status: ExtractionStatus::Unconsumed,
        })
    }

    /// Transition a session to `Summarized`, recording its summary artifact.
    ///
    /// Fails with `NotRegistered` for an unknown id and with
    /// `InvalidTransition` when the entry is already `Summarized` and
    /// `resummarize` was not requested. Re-summarization resets
    /// `extraction_status` to `Unconsumed`: the fresh summary has not been
    /// folded into rules yet.
    pub fn mark_summarized(
        &self,
        session_id: &str,
        summary_ref: &Path,
        resummarize: bool,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        let entry = Self::get_locked(&conn, session_id)?
            .ok_or_else(|| Error::NotRegistered(session_id.to_string()))?;

        if entry.summary_status == SummaryStatus::Summarized && !resummarize {
            return Err(Error::InvalidTransition {
                session_id: session_id.to_string(),
                from: entry.summary_status.as_str().to_string(),
            });
        }

        conn.execute(
            r#"
            UPDATE session_index
            SET summary_status = 'summarized',
                summary_ref = ?2,
                extraction_status = 'unconsumed',
                updated_at = ?3
            WHERE session_id = ?1
            "#,
            params![
                session_id,
                summary_ref.to_string_lossy(),
                timestamp(Utc::now())
            ],
        )?;

        tracing::info!(session_id, summary_ref = %summary_ref.display(), "Session summarized");
        Ok(())
    }

    /// Record that summarization retries were exhausted for a session.
    ///
    /// A `Failed` entry can still be re-attempted later; `mark_summarized`
    /// accepts the `Failed -> Summarized` transition without `resummarize`.
    pub fn mark_failed(&self, session_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        let entry = Self::get_locked(&conn, session_id)?
            .ok_or_else(|| Error::NotRegistered(session_id.to_string()))?;

        if entry.summary_status == SummaryStatus::Summarized {
            return Err(Error::InvalidTransition {
                session_id: session_id.to_string(),
                from: entry.summary_status.as_str().to_string(),
            });
        }

        conn.execute(
            "UPDATE session_index SET summary_status = 'failed', updated_at = ?2 WHERE session_id = ?1",
            params![session_id, timestamp(Utc::now())],
        )?;
        Ok(())
    }

    /// Transition a session to `Consumed`.
    ///
    /// Fails with `PrerequisiteNotMet` unless the session is `Summarized`.
    pub fn mark_consumed(&self, session_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        let entry = Self::get_locked(&conn, session_id)?
            .ok_or_else(|| Error::NotRegistered(session_id.to_string()))?;

        if entry.summary_status != SummaryStatus::Summarized {
            return Err(Error::PrerequisiteNotMet(format!(
                "session {} is {}, not summarized",
                session_id,
                entry.summary_status.as_str()
            )));
        }

        conn.execute(
            "UPDATE session_index SET extraction_status = 'consumed', updated_at = ?2 WHERE session_id = ?1",
            params![session_id, timestamp(Utc::now())],
        )?;
        Ok(())
    }

    /// The extraction step's work queue: summarized entries whose summary
    /// has not been folded into rules, oldest first so older learnings are
    /// not starved by a constant stream of new sessions.
    pub fn list_unconsumed_summarized(&self) -> Result<Vec<SessionIndexEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM session_index
             WHERE summary_status = 'summarized' AND extraction_status = 'unconsumed'
             ORDER BY discovered_at ASC",
            ENTRY_COLUMNS
        ))?;
        let entries = stmt
            .query_map([], entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Look up one entry
    pub fn get(&self, session_id: &str) -> Result<Option<SessionIndexEntry>> {
        let conn = self.conn.lock().unwrap();
        Self::get_locked(&conn, session_id)
    }

    /// All entries, oldest first
    pub fn all_entries(&self) -> Result<Vec<SessionIndexEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM session_index ORDER BY discovered_at ASC",
            ENTRY_COLUMNS
        ))?;
        let entries = stmt
            .query_map([], entry_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn get_locked(conn: &Connection, session_id: &str) -> Result<Option<SessionIndexEntry>> {
        let entry = conn
            .query_row(
                &format!(
                    "SELECT {} FROM session_index WHERE session_id = ?1",
                    ENTRY_COLUMNS
                ),
                [session_id],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

}
