//! LLM capability traits and shared response parsing
//!
//! The pipeline consumes two narrow capabilities rather than a provider
//! surface: [`Summarizer`] turns one session into summary text, and
//! [`RuleExtractor`] turns a batch of summaries into rule candidates.
//! [`AnthropicClient`] implements both; tests substitute deterministic
//! fakes. Prompt design stays inside the implementations; callers only see
//! the capability contracts.

mod anthropic;

pub use anthropic::AnthropicClient;

use crate::error::{Error, Result};
use crate::types::{RuleCandidate, Session, Summary};

/// Produces summary text for one session.
pub trait Summarizer: Send + Sync {
    /// Summarize a session, optionally attributing it to a git ref.
    ///
    /// The session is guaranteed non-empty by the caller. Failures map to
    /// transient trouble with the external service; the caller decides
    /// whether to retry or record the session as failed.
    fn summarize(&self, session: &Session, git_ref: Option<&str>) -> Result<String>;
}

/// Proposes rule candidates from a batch of summaries.
pub trait RuleExtractor: Send + Sync {
    /// Extract candidates from one batch.
    ///
    /// Candidates may leave `sources` empty when the extractor does not
    /// attribute them to specific sessions; the extraction step then tags
    /// the whole batch.
    fn extract_rules(&self, summaries: &[Summary]) -> Result<Vec<RuleCandidate>>;
}

/// Parse an LLM response into rule candidates, leniently.
///
/// Models fence their JSON more often than not, so a leading code fence
/// (with or without a language tag) is stripped before parsing. The
/// payload is a JSON array of candidate objects; unknown fields are
/// ignored and a missing `body`/`sources` defaults to empty.
pub fn parse_candidates(response: &str) -> Result<Vec<RuleCandidate>> {
    let payload = strip_code_fence(response);
    serde_json::from_str(payload)
        .map_err(|e| Error::Llm(format!("unparseable candidate payload: {}", e)))
}

fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string ("json", "JSON", ...) on the opening fence line
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
