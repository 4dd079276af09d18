//! Claude Code JSONL adapter
//!
//! Parses session logs from `~/.claude/projects/[encoded-path]/*.jsonl`.
//!
//! # Error Handling
//!
//! The adapter is resilient by default:
//!
//! - **Malformed individual lines**: logged as a warning and skipped,
//!   parsing continues. A non-empty file that yields no valid record at
//!   all is reported as `MalformedLog`.
//! - **Missing optional fields**: handled via `#[serde(default)]`.
//! - **Sidechain records**: skipped in main session files; the spawning
//!   agent has its own transcript.
//! - **Unknown content block types**: ignored rather than failing.
//! - **Newer log schema**: records declare a `version` string; a major
//!   version above [`MAX_SUPPORTED_MAJOR`] is `UnsupportedVersion`.

use crate::adapter::{SessionLocation, TranscriptAdapter};
use crate::error::{Error, Result};
use crate::types::{Session, Tool, Turn, TurnRole};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

/// Highest log schema major version this adapter understands.
const MAX_SUPPORTED_MAJOR: u32 = 2;

/// Adapter for Claude Code JSONL logs.
pub struct ClaudeCodeAdapter {
    root: Option<PathBuf>,
}

impl ClaudeCodeAdapter {
    /// Create a new adapter with the default root path (~/.claude).
    pub fn new() -> Self {
        Self {
            root: Tool::ClaudeCode.default_root(),
        }
    }

    /// Create an adapter with a custom root path (for testing).
    pub fn with_root(root: PathBuf) -> Self {
        Self { root: Some(root) }
    }
}

impl Default for ClaudeCodeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================
// Raw JSONL record types (serde deserialization)
// ============================================

/// One line of a Claude Code session log.
///
/// Uses `#[serde(default)]` liberally so missing fields never abort a parse.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawRecord {
    session_id: Option<String>,
    #[serde(rename = "type")]
    record_type: Option<String>,
    timestamp: Option<String>,
    version: Option<String>,
    is_sidechain: Option<bool>,
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    role: Option<String>,
    content: Option<RawContent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        #[serde(default)]
        content: serde_json::Value,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(other)]
    Unknown,
}

/// Check a record's declared log version against what we support.
fn check_version(version: &str) -> Result<()> {
    let major = version
        .split('.')
        .next()
        .and_then(|m| m.parse::<u32>().ok());
    match major {
        Some(m) if m <= MAX_SUPPORTED_MAJOR => Ok(()),
        _ => Err(Error::UnsupportedVersion {
            tool: Tool::ClaudeCode.as_str().to_string(),
            version: version.to_string(),
        }),
    }
}

/// Flatten a tool_result content value to text.
///
/// Tool results are either a plain string or a list of blocks; anything
/// else is rendered as compact JSON so nothing is silently dropped.
fn flatten_tool_result(content: &serde_json::Value) -> String {
    match content {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

impl TranscriptAdapter for ClaudeCodeAdapter {
    fn tool(&self) -> Tool {
        Tool::ClaudeCode
    }

    fn root_path(&self) -> Option<PathBuf> {
        self.root.clone()
    }

    fn discover(&self) -> Result<Vec<SessionLocation>> {
        let root = match self.root_path() {
            Some(r) => r,
            None => return Ok(vec![]),
        };

        let pattern = root.join("projects/*/*.jsonl");
        let entries = glob::glob(&pattern.to_string_lossy()).map_err(|e| Error::MalformedLog {
            tool: self.tool().as_str().to_string(),
            message: format!("invalid glob pattern: {}", e),
        })?;

        let mut locations = Vec::new();
        for entry in entries.flatten() {
            let session_id = match entry.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => stem.to_string(),
                None => continue,
            };
            let metadata = match std::fs::metadata(&entry) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(path = %entry.display(), error = %e, "Skipping unreadable transcript");
                    continue;
                }
            };
            locations.push(SessionLocation {
                tool: Tool::ClaudeCode,
                path: entry,
                session_id,
                modified_at: metadata
                    .modified()
                    .ok()
                    .map(DateTime::from)
                    .unwrap_or_else(Utc::now),
                size_bytes: metadata.len(),
            });
        }

        Ok(locations)
    }

    fn parse(&self, location: &SessionLocation) -> Result<Session> {
        let file = File::open(&location.path)?;
        let reader = BufReader::new(file);

        let mut turns: Vec<Turn> = Vec::new();
        let mut session_id: Option<String> = None;
        let mut started_at: Option<DateTime<Utc>> = None;
        let mut total_lines = 0usize;
        let mut valid_records = 0usize;

        for (line_number, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            total_lines += 1;

            let record: RawRecord = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(
                        path = %location.path.display(),
                        line = line_number + 1,
                        error = %e,
                        "Skipping malformed JSONL line"
                    );
                    continue;
                }
            };

            if let Some(ref version) = record.version {
                check_version(version)?;
            }

            valid_records += 1;

            // Summaries and file-history snapshots are tool bookkeeping,
            // not conversation content
            if matches!(
                record.record_type.as_deref(),
                Some("summary") | Some("file-history-snapshot")
            ) {
                continue;
            }

            // Sidechain records belong to agent transcripts
            if record.is_sidechain.unwrap_or(false) {
                continue;
            }

            if session_id.is_none() {
                session_id = record.session_id.clone();
            }

            let timestamp = record
                .timestamp
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc));
            if started_at.is_none() {
                started_at = timestamp;
            }

            let message = match record.message {
                Some(m) => m,
                None => continue,
            };
            let role = match message.role.as_deref() {
                Some("user") => TurnRole::User,
                Some("assistant") => TurnRole::Assistant,
                Some(other) => {
                    tracing::debug!(role = other, "Skipping record with unrecognized role");
                    continue;
                }
                None => continue,
            };

            match message.content {
                Some(RawContent::Text(text)) => {
                    if !text.trim().is_empty() {
                        turns.push(Turn {
                            role,
                            content: text,
                            timestamp,
                            tool_name: None,
                            is_error: false,
                        });
                    }
                }
                Some(RawContent::Blocks(blocks)) => {
                    for block in blocks {
                        match block {
                            ContentBlock::Text { text } => {
                                if !text.trim().is_empty() {
                                    turns.push(Turn {
                                        role,
                                        content: text,
                                        timestamp,
                                        tool_name: None,
                                        is_error: false,
                                    });
                                }
                            }
                            ContentBlock::ToolUse { name, input } => {
                                turns.push(Turn {
                                    role: TurnRole::ToolUse,
                                    content: format!("[Tool: {}] {}", name, input),
                                    timestamp,
                                    tool_name: Some(name),
                                    is_error: false,
                                });
                            }
                            ContentBlock::ToolResult { content, is_error } => {
                                turns.push(Turn {
                                    role: TurnRole::ToolResult,
                                    content: flatten_tool_result(&content),
                                    timestamp,
                                    tool_name: None,
                                    is_error,
                                });
                            }
                            ContentBlock::Unknown => {}
                        }
                    }
                }
                None => {}
            }
        }

        if total_lines > 0 && valid_records == 0 {
            return Err(Error::MalformedLog {
                tool: self.tool().as_str().to_string(),
                message: format!(
                    "{}: no line parsed as a Claude Code record",
                    location.path.display()
                ),
            });
        }

        Ok(Session {
            id: session_id.unwrap_or_else(|| location.session_id.clone()),
            tool: Tool::ClaudeCode,
            path: location.path.clone(),
            started_at,
            turns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_log(dir: &TempDir, name: &str, lines: &[&str]) -> SessionLocation {
        let project_dir = dir.path().join("projects").join("-home-dev-proj");
        std::fs::create_dir_all(&project_dir).unwrap();
        let path = project_dir.join(name);
        let mut f = File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
        SessionLocation {
            tool: Tool::ClaudeCode,
            path: path.clone(),
            session_id: path.file_stem().unwrap().to_str().unwrap().to_string(),
            modified_at: Utc::now(),
            size_bytes: std::fs::metadata(&path).unwrap().len(),
        }
    }

    #[test]
    fn test_parse_minimal_session() {
        let dir = TempDir::new().unwrap();
        let loc = write_log(
            &dir,
            "abc-123.jsonl",
            &[
                r#"{"sessionId":"abc-123","type":"user","timestamp":"2026-01-10T12:00:00Z","version":"1.0.30","message":{"role":"user","content":"Hello, fix the login bug"}}"#,
                r#"{"sessionId":"abc-123","type":"assistant","timestamp":"2026-01-10T12:00:05Z","message":{"role":"assistant","content":[{"type":"text","text":"Looking at it now."}]}}"#,
            ],
        );

        let adapter = ClaudeCodeAdapter::with_root(dir.path().to_path_buf());
        let session = adapter.parse(&loc).unwrap();

        assert_eq!(session.id, "abc-123");
        assert_eq!(session.tool, Tool::ClaudeCode);
        assert_eq!(session.turns.len(), 2);
        assert_eq!(session.turns[0].role, TurnRole::User);
        assert!(session.turns[0].content.contains("login bug"));
        assert_eq!(session.turns[1].role, TurnRole::Assistant);
        assert!(session.started_at.is_some());
    }

    #[test]
    fn test_parse_tool_blocks() {
        let dir = TempDir::new().unwrap();
        let loc = write_log(
            &dir,
            "tooluse.jsonl",
            &[
                r#"{"sessionId":"tooluse","message":{"role":"assistant","content":[{"type":"tool_use","name":"Bash","input":{"command":"ls"}}]}}"#,
                r#"{"sessionId":"tooluse","message":{"role":"user","content":[{"type":"tool_result","content":"src tests","is_error":false}]}}"#,
            ],
        );

        let adapter = ClaudeCodeAdapter::with_root(dir.path().to_path_buf());
        let session = adapter.parse(&loc).unwrap();

        assert_eq!(session.turns.len(), 2);
        assert_eq!(session.turns[0].role, TurnRole::ToolUse);
        assert_eq!(session.turns[0].tool_name.as_deref(), Some("Bash"));
        assert_eq!(session.turns[1].role, TurnRole::ToolResult);
        assert_eq!(session.turns[1].content, "src tests");
    }

    #[test]
    fn test_empty_file_yields_empty_session() {
        let dir = TempDir::new().unwrap();
        let loc = write_log(&dir, "empty.jsonl", &[]);

        let adapter = ClaudeCodeAdapter::with_root(dir.path().to_path_buf());
        let session = adapter.parse(&loc).unwrap();

        assert!(session.is_empty());
        assert_eq!(session.id, "empty");
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let loc = write_log(
            &dir,
            "mixed.jsonl",
            &[
                "this is not json",
                r#"{"sessionId":"mixed","message":{"role":"user","content":"still here"}}"#,
                r#"{"truncated": "#,
            ],
        );

        let adapter = ClaudeCodeAdapter::with_root(dir.path().to_path_buf());
        let session = adapter.parse(&loc).unwrap();
        assert_eq!(session.turns.len(), 1);
    }

    #[test]
    fn test_fully_malformed_file_is_error() {
        let dir = TempDir::new().unwrap();
        let loc = write_log(&dir, "garbage.jsonl", &["not json", "also not json"]);

        let adapter = ClaudeCodeAdapter::with_root(dir.path().to_path_buf());
        let err = adapter.parse(&loc).unwrap_err();
        assert!(matches!(err, Error::MalformedLog { .. }));
    }

    #[test]
    fn test_unsupported_version() {
        let dir = TempDir::new().unwrap();
        let loc = write_log(
            &dir,
            "future.jsonl",
            &[r#"{"sessionId":"future","version":"9.0.0","message":{"role":"user","content":"hi"}}"#],
        );

        let adapter = ClaudeCodeAdapter::with_root(dir.path().to_path_buf());
        let err = adapter.parse(&loc).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion { .. }));
    }

    #[test]
    fn test_sidechain_records_skipped() {
        let dir = TempDir::new().unwrap();
        let loc = write_log(
            &dir,
            "side.jsonl",
            &[
                r#"{"sessionId":"side","isSidechain":true,"message":{"role":"user","content":"agent chatter"}}"#,
                r#"{"sessionId":"side","message":{"role":"user","content":"main thread"}}"#,
            ],
        );

        let adapter = ClaudeCodeAdapter::with_root(dir.path().to_path_buf());
        let session = adapter.parse(&loc).unwrap();
        assert_eq!(session.turns.len(), 1);
        assert_eq!(session.turns[0].content, "main thread");
    }

    #[test]
    fn test_discover_finds_jsonl() {
        let dir = TempDir::new().unwrap();
        write_log(
            &dir,
            "found.jsonl",
            &[r#"{"sessionId":"found","message":{"role":"user","content":"x"}}"#],
        );

        let adapter = ClaudeCodeAdapter::with_root(dir.path().to_path_buf());
        let locations = adapter.discover().unwrap();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].session_id, "found");
    }
}
