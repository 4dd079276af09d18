//! # afterpaths-core
//!
//! Core library for afterpaths - a pipeline that turns AI coding-assistant
//! session transcripts into durable project rules.
//!
//! This library provides:
//! - Transcript adapters that normalize tool-native logs into sessions
//! - A durable session index tracking summarization and extraction state
//! - Stores for summary artifacts and categorized rule documents
//! - LLM capability traits plus an Anthropic implementation
//! - The two pipeline steps (summarize, extract) and the discovery sweep
//!
//! ## Data flow
//!
//! Tool-native logs are read-only inputs; everything durable is derived:
//! adapters parse logs into [`Session`](types::Session) values, the
//! summarization step turns each into a summary artifact, and the
//! extraction step folds batches of summaries into deduplicated rule
//! documents. The [`index::SessionIndex`] makes every step idempotent.
//!
//! ## Example
//!
//! ```rust,no_run
//! use afterpaths_core::adapter::create_all_adapters;
//! use afterpaths_core::index::SessionIndex;
//! use afterpaths_core::pipeline::{sync_sessions, PipelineLock};
//! use afterpaths_core::Config;
//!
//! let config = Config::load().expect("failed to load config");
//! let _lock = PipelineLock::acquire(&Config::state_dir()).expect("pipeline already running");
//!
//! let index = SessionIndex::open(&Config::index_path()).expect("failed to open index");
//! let adapters = create_all_adapters();
//! let report = sync_sessions(&index, &adapters).expect("sync failed");
//! println!("{} new sessions", report.newly_registered);
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use index::SessionIndex;
pub use pipeline::{extract_rules, summarize_session, sync_sessions, ExtractionReport, SyncReport};
pub use types::*;

// Public modules
pub mod adapter;
pub mod config;
pub mod error;
pub mod index;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod rules;
pub mod summaries;
pub mod types;
