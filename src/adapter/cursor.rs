//! Cursor workspace-storage adapter
//!
//! Cursor stores chat history in SQLite databases (`state.vscdb`) under
//! workspace-specific folders in its `workspaceStorage` directory. Each
//! database holds an `ItemTable` key/value store; chat sessions live under
//! the `workbench.panel.aichat.view.aichat.chatdata` and
//! `composer.composerData` keys.
//!
//! One `state.vscdb` can contain many sessions, so discovery enumerates the
//! sessions inside each database and `parse` re-reads the one it is asked
//! for. Databases are always opened read-only.

use crate::adapter::{SessionLocation, TranscriptAdapter};
use crate::error::{Error, Result};
use crate::types::{Session, Tool, Turn, TurnRole};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const CHAT_DATA_KEYS: [&str; 2] = [
    "workbench.panel.aichat.view.aichat.chatdata",
    "composer.composerData",
];

/// Adapter for Cursor AI sessions stored in workspaceStorage.
pub struct CursorAdapter {
    root: Option<PathBuf>,
}

impl CursorAdapter {
    /// Create a new adapter with the platform default workspaceStorage path.
    pub fn new() -> Self {
        Self {
            root: Tool::Cursor.default_root(),
        }
    }

    /// Create an adapter with a custom root path (for testing).
    pub fn with_root(root: PathBuf) -> Self {
        Self { root: Some(root) }
    }

    /// Extract every chat session stored in one `state.vscdb`.
    ///
    /// Returns session id -> session JSON. Keys with values that do not
    /// parse as JSON are skipped; a database without an `ItemTable` is a
    /// `MalformedLog`.
    fn read_chat_data(&self, db_path: &Path) -> Result<BTreeMap<String, serde_json::Value>> {
        let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| Error::MalformedLog {
                tool: Tool::Cursor.as_str().to_string(),
                message: format!("{}: cannot open database: {}", db_path.display(), e),
            })?;

        let mut stmt = conn
            .prepare("SELECT [key], value FROM ItemTable WHERE [key] IN (?1, ?2)")
            .map_err(|e| Error::MalformedLog {
                tool: Tool::Cursor.as_str().to_string(),
                message: format!("{}: no ItemTable: {}", db_path.display(), e),
            })?;

        let rows = stmt.query_map([CHAT_DATA_KEYS[0], CHAT_DATA_KEYS[1]], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut sessions = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            let data: serde_json::Value = match serde_json::from_str(&value) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(
                        path = %db_path.display(),
                        key = %key,
                        error = %e,
                        "Skipping unparseable chat data value"
                    );
                    continue;
                }
            };

            match key.as_str() {
                "workbench.panel.aichat.view.aichat.chatdata" => {
                    collect_chat_sessions(&data, &mut sessions);
                }
                "composer.composerData" => {
                    if let Some(composers) = data.get("composers").and_then(|c| c.as_object()) {
                        for (comp_id, composer) in composers {
                            if composer.is_object() {
                                sessions.insert(format!("composer-{}", comp_id), composer.clone());
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(sessions)
    }
}

/// Pull chat sessions out of the aichat panel payload, which is either a
/// list of chats or a dict with a `tabs` list.
fn collect_chat_sessions(data: &serde_json::Value, out: &mut BTreeMap<String, serde_json::Value>) {
    let chats: Vec<&serde_json::Value> = match data {
        serde_json::Value::Array(items) => items.iter().collect(),
        serde_json::Value::Object(map) => map
            .get("tabs")
            .and_then(|t| t.as_array())
            .map(|items| items.iter().collect())
            .unwrap_or_default(),
        _ => vec![],
    };

    for (i, chat) in chats.iter().enumerate() {
        let has_messages = chat
            .get("messages")
            .and_then(|m| m.as_array())
            .map(|m| !m.is_empty())
            .unwrap_or(false);
        if !has_messages {
            continue;
        }
        let id = chat
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("chat-{}", i));
        out.insert(id, (*chat).clone());
    }
}

fn normalize_role(role: &str) -> TurnRole {
    match role.to_lowercase().as_str() {
        "human" | "user" | "system" => TurnRole::User,
        "ai" | "assistant" => TurnRole::Assistant,
        _ => TurnRole::User,
    }
}

/// Map one Cursor message to zero or more turns.
fn message_turns(msg: &serde_json::Value, turns: &mut Vec<Turn>) {
    let role = normalize_role(msg.get("role").and_then(|r| r.as_str()).unwrap_or("user"));
    let timestamp = msg
        .get("timestamp")
        .and_then(|t| t.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    match msg.get("content") {
        Some(serde_json::Value::String(text)) => {
            if !text.trim().is_empty() {
                turns.push(Turn {
                    role,
                    content: text.clone(),
                    timestamp,
                    tool_name: None,
                    is_error: false,
                });
            }
        }
        Some(serde_json::Value::Array(parts)) => {
            for part in parts {
                match part {
                    serde_json::Value::String(text) => {
                        turns.push(Turn {
                            role,
                            content: text.clone(),
                            timestamp,
                            tool_name: None,
                            is_error: false,
                        });
                    }
                    serde_json::Value::Object(obj) => {
                        match obj.get("type").and_then(|t| t.as_str()) {
                            Some("text") => {
                                if let Some(text) = obj.get("text").and_then(|t| t.as_str()) {
                                    turns.push(Turn {
                                        role,
                                        content: text.to_string(),
                                        timestamp,
                                        tool_name: None,
                                        is_error: false,
                                    });
                                }
                            }
                            Some("tool_use") => {
                                let name = obj
                                    .get("name")
                                    .and_then(|n| n.as_str())
                                    .unwrap_or("unknown");
                                turns.push(Turn {
                                    role: TurnRole::ToolUse,
                                    content: format!("[Tool: {}]", name),
                                    timestamp,
                                    tool_name: Some(name.to_string()),
                                    is_error: false,
                                });
                            }
                            Some("tool_result") => {
                                let content = obj
                                    .get("content")
                                    .map(|c| match c {
                                        serde_json::Value::String(s) => s.clone(),
                                        other => other.to_string(),
                                    })
                                    .unwrap_or_default();
                                turns.push(Turn {
                                    role: TurnRole::ToolResult,
                                    content,
                                    timestamp,
                                    tool_name: None,
                                    is_error: false,
                                });
                            }
                            _ => {}
                        }
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

impl TranscriptAdapter for CursorAdapter {
    fn tool(&self) -> Tool {
        Tool::Cursor
    }

    fn root_path(&self) -> Option<PathBuf> {
        self.root.clone()
    }

    fn discover(&self) -> Result<Vec<SessionLocation>> {
        let root = match self.root_path() {
            Some(r) if r.exists() => r,
            _ => return Ok(vec![]),
        };

        let mut locations = Vec::new();
        for workspace in std::fs::read_dir(&root)? {
            let workspace = match workspace {
                Ok(w) => w,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable workspace entry");
                    continue;
                }
            };
            let db_path = workspace.path().join("state.vscdb");
            if !db_path.exists() {
                continue;
            }

            let chat_data = match self.read_chat_data(&db_path) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(path = %db_path.display(), error = %e, "Skipping workspace database");
                    continue;
                }
            };
            if chat_data.is_empty() {
                continue;
            }

            let metadata = std::fs::metadata(&db_path)?;
            let modified_at = metadata
                .modified()
                .ok()
                .map(DateTime::from)
                .unwrap_or_else(Utc::now);

            for session_id in chat_data.keys() {
                locations.push(SessionLocation {
                    tool: Tool::Cursor,
                    path: db_path.clone(),
                    session_id: session_id.clone(),
                    modified_at,
                    size_bytes: metadata.len(),
                });
            }
        }

        Ok(locations)
    }

    fn parse(&self, location: &SessionLocation) -> Result<Session> {
        let chat_data = self.read_chat_data(&location.path)?;
        let session_data =
            chat_data
                .get(&location.session_id)
                .ok_or_else(|| Error::MalformedLog {
                    tool: Tool::Cursor.as_str().to_string(),
                    message: format!(
                        "{}: session {} not present in database",
                        location.path.display(),
                        location.session_id
                    ),
                })?;

        let mut turns = Vec::new();
        if let Some(messages) = session_data.get("messages").and_then(|m| m.as_array()) {
            for msg in messages {
                message_turns(msg, &mut turns);
            }
        }

        let started_at = turns.iter().find_map(|t| t.timestamp);

        Ok(Session {
            id: location.session_id.clone(),
            tool: Tool::Cursor,
            path: location.path.clone(),
            started_at,
            turns,
        })
    }
}

impl Default for CursorAdapter {
    fn default() -> Self {
        Self::new()
    }
}
