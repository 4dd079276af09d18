//! Core domain types for afterpaths
//!
//! These types form the normalized model that all tool-specific transcript
//! formats are mapped into, plus the bookkeeping records the pipeline
//! persists between runs.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | One coding-assistant conversation, reconstructed from a tool-native log |
//! | **Turn** | One role-tagged entry of a session (user, assistant, tool use/result) |
//! | **Summary** | LLM-produced distillation of one session's notable discoveries |
//! | **RuleEntry** | A deduplicated, persisted piece of extracted knowledge with provenance |
//! | **Fingerprint** | Normalized-content key used to detect duplicate rules within a category |
//!
//! A `Session` is created fresh on every parse and never persisted verbatim;
//! only derived artifacts (index entry, summary, rules) survive the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::PathBuf;

// ============================================
// Tools
// ============================================

/// Supported AI coding assistants (transcript sources)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    ClaudeCode,
    Cursor,
}

impl Tool {
    /// Returns the display name for this tool
    pub fn display_name(&self) -> &'static str {
        match self {
            Tool::ClaudeCode => "Claude Code",
            Tool::Cursor => "Cursor",
        }
    }

    /// Returns the identifier used in persisted records
    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::ClaudeCode => "claude_code",
            Tool::Cursor => "cursor",
        }
    }

    /// Returns the default location where this tool stores transcripts
    pub fn default_root(&self) -> Option<PathBuf> {
        let home = dirs::home_dir()?;
        Some(match self {
            Tool::ClaudeCode => home.join(".claude"),
            Tool::Cursor => {
                if cfg!(target_os = "macos") {
                    home.join("Library/Application Support/Cursor/User/workspaceStorage")
                } else {
                    home.join(".config/Cursor/User/workspaceStorage")
                }
            }
        })
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude_code" | "ClaudeCode" => Ok(Tool::ClaudeCode),
            "cursor" | "Cursor" => Ok(Tool::Cursor),
            _ => Err(format!("unknown tool: {}", s)),
        }
    }
}

// ============================================
// Sessions
// ============================================

/// Role of a turn within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// The human driving the session
    User,
    /// The coding assistant
    Assistant,
    /// Assistant invoking a tool (content flattened to text)
    ToolUse,
    /// Result returned by a tool
    ToolResult,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::ToolUse => "tool_use",
            TurnRole::ToolResult => "tool_result",
        }
    }
}

impl std::str::FromStr for TurnRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" | "human" => Ok(TurnRole::User),
            "assistant" | "ai" => Ok(TurnRole::Assistant),
            "tool_use" => Ok(TurnRole::ToolUse),
            "tool_result" => Ok(TurnRole::ToolResult),
            _ => Err(format!("unknown turn role: {}", s)),
        }
    }
}

/// One normalized entry of a session transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced this turn
    pub role: TurnRole,
    /// Content flattened to text
    pub content: String,
    /// Timestamp, when the native log carries one
    pub timestamp: Option<DateTime<Utc>>,
    /// Tool name for tool_use/tool_result turns
    pub tool_name: Option<String>,
    /// True when a tool result reported an error or rejection
    pub is_error: bool,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            timestamp: None,
            tool_name: None,
            is_error: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            timestamp: None,
            tool_name: None,
            is_error: false,
        }
    }
}

/// One coding-assistant conversation, normalized from a tool-native log.
///
/// Immutable once parsed; discarded after summarization consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Stable identifier derived from the source transcript
    pub id: String,
    /// Which adapter produced this session
    pub tool: Tool,
    /// Source file location (provenance, never mutated)
    pub path: PathBuf,
    /// When the session started, if the log records it
    pub started_at: Option<DateTime<Utc>>,
    /// Ordered turns reconstructed from the native log
    pub turns: Vec<Turn>,
}

impl Session {
    /// A session with zero turns is valid output of an adapter; the
    /// summarization step rejects it before spending an LLM call.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

// ============================================
// Session index bookkeeping
// ============================================

/// Whether a session has been summarized yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStatus {
    /// No summary produced yet
    Pending,
    /// Summary artifact exists
    Summarized,
    /// Summarization retries exhausted; manual re-attempt allowed
    Failed,
}

impl SummaryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStatus::Pending => "pending",
            SummaryStatus::Summarized => "summarized",
            SummaryStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for SummaryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SummaryStatus::Pending),
            "summarized" => Ok(SummaryStatus::Summarized),
            "failed" => Ok(SummaryStatus::Failed),
            _ => Err(format!("unknown summary status: {}", s)),
        }
    }
}

/// Whether a session's summary has been folded into rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    /// Summary (if any) has not contributed to the rule store
    Unconsumed,
    /// Summary has been folded into rules
    Consumed,
}

impl ExtractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStatus::Unconsumed => "unconsumed",
            ExtractionStatus::Consumed => "consumed",
        }
    }
}

impl std::str::FromStr for ExtractionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unconsumed" => Ok(ExtractionStatus::Unconsumed),
            "consumed" => Ok(ExtractionStatus::Consumed),
            _ => Err(format!("unknown extraction status: {}", s)),
        }
    }
}

/// Persistent bookkeeping, one record per known session id.
///
/// The two statuses are tracked independently so a summarization failure
/// never blocks a re-attempt, and extraction work is driven purely off
/// "has a summary, not yet folded in".
///
/// Invariants: exactly one entry per session id;
/// `extraction_status == Consumed` implies `summary_status == Summarized`;
/// `summary_ref` is present iff `summary_status == Summarized`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionIndexEntry {
    /// Session id this entry tracks
    pub session_id: String,
    /// Tool the session came from
    pub tool: Tool,
    /// When the pipeline first saw this session
    pub discovered_at: DateTime<Utc>,
    /// Summarization state
    pub summary_status: SummaryStatus,
    /// Pointer to the stored summary artifact
    pub summary_ref: Option<PathBuf>,
    /// Rule-extraction state
    pub extraction_status: ExtractionStatus,
}

// ============================================
// Summaries
// ============================================

/// The distilled record of one session, as produced by the external
/// summarizer. Persisted as an immutable artifact keyed by session id;
/// overwritten only by explicit re-summarization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Back-reference to the session (not ownership)
    pub session_id: String,
    /// Opaque provenance string (commit/branch at time of session)
    pub git_ref: Option<String>,
    /// Summary text with sections for dead ends, decisions, gotchas, patterns
    pub text: String,
}

// ============================================
// Rules
// ============================================

/// Closed set of rule categories; drives output file grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    /// Approaches that were tried and abandoned
    DeadEnd,
    /// Choices made and their rationale
    Decision,
    /// Surprising behavior that cost time
    Gotcha,
    /// Recurring approaches that worked
    Pattern,
}

impl RuleCategory {
    /// All categories, in document order
    pub const ALL: [RuleCategory; 4] = [
        RuleCategory::DeadEnd,
        RuleCategory::Decision,
        RuleCategory::Gotcha,
        RuleCategory::Pattern,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleCategory::DeadEnd => "dead_end",
            RuleCategory::Decision => "decision",
            RuleCategory::Gotcha => "gotcha",
            RuleCategory::Pattern => "pattern",
        }
    }

    /// Heading used at the top of the category's document
    pub fn heading(&self) -> &'static str {
        match self {
            RuleCategory::DeadEnd => "Dead Ends",
            RuleCategory::Decision => "Decisions",
            RuleCategory::Gotcha => "Gotchas",
            RuleCategory::Pattern => "Patterns",
        }
    }

    /// File name of the category's output document
    pub fn document_name(&self) -> &'static str {
        match self {
            RuleCategory::DeadEnd => "dead-ends.md",
            RuleCategory::Decision => "decisions.md",
            RuleCategory::Gotcha => "gotchas.md",
            RuleCategory::Pattern => "patterns.md",
        }
    }
}

impl std::fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RuleCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dead_end" | "dead-end" | "deadend" => Ok(RuleCategory::DeadEnd),
            "decision" => Ok(RuleCategory::Decision),
            "gotcha" => Ok(RuleCategory::Gotcha),
            "pattern" => Ok(RuleCategory::Pattern),
            _ => Err(format!("unknown rule category: {}", s)),
        }
    }
}

/// Compute the dedup fingerprint for a rule title within a category.
///
/// Lowercases the title, collapses every run of non-alphanumeric characters
/// to a single space, and hashes `category\x1f<normalized title>` with
/// SHA-256, keeping the first 16 hex characters. Two candidates that differ
/// only in punctuation, casing, or whitespace collide on purpose.
pub fn rule_fingerprint(category: RuleCategory, title: &str) -> String {
    let mut normalized = String::with_capacity(title.len());
    let mut pending_space = false;
    for c in title.chars() {
        if c.is_alphanumeric() {
            if pending_space && !normalized.is_empty() {
                normalized.push(' ');
            }
            pending_space = false;
            for lc in c.to_lowercase() {
                normalized.push(lc);
            }
        } else {
            pending_space = true;
        }
    }

    let mut hasher = Sha256::new();
    hasher.update(category.as_str().as_bytes());
    hasher.update([0x1f]);
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// One atomic piece of extracted knowledge, deduplicated and persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEntry {
    /// Category driving output file grouping
    pub category: RuleCategory,
    /// Human-readable statement
    pub title: String,
    /// Elaboration
    pub body: String,
    /// Session ids this entry traces back to; merging unions this set
    pub sources: BTreeSet<String>,
    /// Normalized-content dedup key, distinct from the visible text
    pub fingerprint: String,
}

impl RuleEntry {
    /// Build an entry, computing its fingerprint from category and title.
    pub fn new(
        category: RuleCategory,
        title: impl Into<String>,
        body: impl Into<String>,
        sources: impl IntoIterator<Item = String>,
    ) -> Self {
        let title = title.into();
        let fingerprint = rule_fingerprint(category, &title);
        Self {
            category,
            title,
            body: body.into(),
            sources: sources.into_iter().collect(),
            fingerprint,
        }
    }
}

/// An LLM-proposed rule, pre-merge. Sources may be empty when the extractor
/// does not discriminate; the extraction step then tags the whole batch.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleCandidate {
    /// Proposed category
    pub category: RuleCategory,
    /// Proposed statement
    pub title: String,
    /// Proposed elaboration
    #[serde(default)]
    pub body: String,
    /// Source session ids, when the extractor attributes them
    #[serde(default)]
    pub sources: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_tool_round_trip() {
        for tool in [Tool::ClaudeCode, Tool::Cursor] {
            assert_eq!(Tool::from_str(tool.as_str()).unwrap(), tool);
        }
        assert!(Tool::from_str("copilot").is_err());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            SummaryStatus::Pending,
            SummaryStatus::Summarized,
            SummaryStatus::Failed,
        ] {
            assert_eq!(SummaryStatus::from_str(status.as_str()).unwrap(), status);
        }
        for status in [ExtractionStatus::Unconsumed, ExtractionStatus::Consumed] {
            assert_eq!(ExtractionStatus::from_str(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn test_fingerprint_normalization() {
        let a = rule_fingerprint(RuleCategory::Gotcha, "JWT rotation race condition");
        let b = rule_fingerprint(RuleCategory::Gotcha, "  JWT  rotation -- race condition!  ");
        let c = rule_fingerprint(RuleCategory::Gotcha, "jwt ROTATION race CONDITION");
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_fingerprint_distinguishes_category() {
        let gotcha = rule_fingerprint(RuleCategory::Gotcha, "prefer rustls over openssl");
        let decision = rule_fingerprint(RuleCategory::Decision, "prefer rustls over openssl");
        assert_ne!(gotcha, decision);
    }

    #[test]
    fn test_rule_entry_new_computes_fingerprint() {
        let entry = RuleEntry::new(
            RuleCategory::Pattern,
            "Use write-to-temp-then-rename",
            "Avoids corrupt files on crash.",
            ["s-1".to_string()],
        );
        assert_eq!(
            entry.fingerprint,
            rule_fingerprint(RuleCategory::Pattern, "Use write-to-temp-then-rename")
        );
        assert!(entry.sources.contains("s-1"));
    }

    #[test]
    fn test_category_documents_are_distinct() {
        let names: std::collections::HashSet<_> = RuleCategory::ALL
            .iter()
            .map(|c| c.document_name())
            .collect();
        assert_eq!(names.len(), RuleCategory::ALL.len());
    }

    #[test]
    fn test_empty_session() {
        let session = Session {
            id: "s-1".to_string(),
            tool: Tool::ClaudeCode,
            path: PathBuf::from("/tmp/s-1.jsonl"),
            started_at: None,
            turns: vec![],
        };
        assert!(session.is_empty());
    }
}
