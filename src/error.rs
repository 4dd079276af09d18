//! Error types for afterpaths-core

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the afterpaths-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Transcript does not parse as the tool's expected schema
    #[error("malformed {tool} log: {message}")]
    MalformedLog { tool: String, message: String },

    /// Transcript declares a schema version the adapter does not understand
    #[error("unsupported {tool} log version: {version}")]
    UnsupportedVersion { tool: String, version: String },

    /// Session has zero turns; summarization refuses it before any LLM call
    #[error("session {0} has no turns")]
    EmptySession(String),

    /// External summarizer call failed (retryable)
    #[error("summarization failed: {0}")]
    SummarizationFailed(String),

    /// Index operation on a session id that was never registered
    #[error("session not registered: {0}")]
    NotRegistered(String),

    /// Index status transition that is not allowed from the current state
    #[error("invalid transition for session {session_id}: already {from}")]
    InvalidTransition { session_id: String, from: String },

    /// Index operation whose precondition does not hold
    #[error("prerequisite not met: {0}")]
    PrerequisiteNotMet(String),

    /// Rule candidate rejected before merge (missing category, empty title)
    #[error("invalid rule candidate: {0}")]
    InvalidRuleCandidate(String),

    /// Extraction batch aborted; no rule files written, nothing consumed
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    /// Another pipeline invocation holds the lock
    #[error("pipeline lock held: {}", .0.display())]
    LockHeld(PathBuf),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// LLM transport/protocol error
    #[error("LLM error: {0}")]
    Llm(String),
}

impl Error {
    /// Whether this error should be recovered per item so the rest of a
    /// sweep or batch can continue. Index-contract violations are bugs in
    /// the orchestration and must halt the run instead.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::MalformedLog { .. }
                | Error::UnsupportedVersion { .. }
                | Error::EmptySession(_)
                | Error::SummarizationFailed(_)
                | Error::InvalidRuleCandidate(_)
                | Error::ExtractionFailed(_)
        )
    }
}

/// Result type alias for afterpaths-core
pub type Result<T> = std::result::Result<T, Error>;
