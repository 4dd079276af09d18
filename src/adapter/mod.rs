//! Transcript adapters for tool-native session logs
//!
//! Each supported tool has an adapter that discovers its transcript files
//! and normalizes them into [`Session`](crate::types::Session) records.
//!
//! ## Supported Tools
//!
//! | Tool | Module | Source |
//! |------|--------|--------|
//! | Claude Code | [`claude`] | `~/.claude/projects/*/*.jsonl` |
//! | Cursor | [`cursor`] | `workspaceStorage/*/state.vscdb` |
//!
//! ## Design Principles
//!
//! 1. **Pure reads**: adapters never mutate their sources
//! 2. **Resilience**: a record the adapter cannot interpret is skipped with
//!    a warning; only a log that violates the tool's schema outright fails
//! 3. **Closed variant set**: adding Copilot support means adding a new
//!    adapter module, not modifying existing ones

mod claude;
mod cursor;

pub use claude::ClaudeCodeAdapter;
pub use cursor::CursorAdapter;

use crate::config::AdapterOverrides;
use crate::error::Result;
use crate::types::{Session, Tool};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// A discovered session before parsing.
///
/// For Claude Code one location corresponds to one file; for Cursor a
/// single `state.vscdb` holds many sessions, so the location carries the
/// session id found inside the database.
#[derive(Debug, Clone)]
pub struct SessionLocation {
    /// Tool that owns this transcript
    pub tool: Tool,
    /// Path to the tool-native source file
    pub path: PathBuf,
    /// Session id embedded in the source
    pub session_id: String,
    /// Last modification time of the source file
    pub modified_at: DateTime<Utc>,
    /// Source file size in bytes
    pub size_bytes: u64,
}

/// Trait implemented by all transcript adapters.
///
/// Adapters are pure readers: `parse` has no side effects and may be called
/// repeatedly for the same location.
pub trait TranscriptAdapter: Send + Sync {
    /// Which tool this adapter handles
    fn tool(&self) -> Tool;

    /// Root directory for this tool's transcripts (e.g. ~/.claude)
    ///
    /// Returns `None` if the path cannot be determined (e.g. $HOME not set).
    fn root_path(&self) -> Option<PathBuf>;

    /// Check if this tool appears to be installed (root path exists)
    fn is_available(&self) -> bool {
        self.root_path().map(|p| p.exists()).unwrap_or(false)
    }

    /// Discover all sessions this adapter can currently locate.
    ///
    /// Discovery failures for individual files are logged and skipped;
    /// only an unusable root (bad glob) returns `Err`.
    fn discover(&self) -> Result<Vec<SessionLocation>>;

    /// Parse one discovered session into the normalized model.
    ///
    /// Fails with [`Error::MalformedLog`](crate::Error::MalformedLog) when
    /// the source does not conform to the tool's schema and with
    /// [`Error::UnsupportedVersion`](crate::Error::UnsupportedVersion) when
    /// the log declares a schema version this adapter does not understand.
    /// Both are recoverable; callers skip the session and continue.
    ///
    /// An empty session (zero turns) is valid output and is produced as-is.
    fn parse(&self, location: &SessionLocation) -> Result<Session>;
}

/// Create all available adapters with default roots.
pub fn create_all_adapters() -> Vec<Box<dyn TranscriptAdapter>> {
    vec![
        Box::new(ClaudeCodeAdapter::new()),
        Box::new(CursorAdapter::new()),
        // Future: Box::new(CopilotAdapter::new()),
    ]
}

/// Create adapters honoring configured path overrides.
pub fn create_adapters(overrides: &AdapterOverrides) -> Vec<Box<dyn TranscriptAdapter>> {
    let claude = match &overrides.claude_code_path {
        Some(path) => ClaudeCodeAdapter::with_root(path.clone()),
        None => ClaudeCodeAdapter::new(),
    };
    let cursor = match &overrides.cursor_path {
        Some(path) => CursorAdapter::with_root(path.clone()),
        None => CursorAdapter::new(),
    };
    vec![Box::new(claude), Box::new(cursor)]
}

/// Get an adapter for a specific tool.
pub fn adapter_for(tool: Tool) -> Box<dyn TranscriptAdapter> {
    match tool {
        Tool::ClaudeCode => Box::new(ClaudeCodeAdapter::new()),
        Tool::Cursor => Box::new(CursorAdapter::new()),
    }
}
