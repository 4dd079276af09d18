//! Pipeline orchestration
//!
//! The steps that tie adapters, index, stores, and LLM capabilities
//! together. All index and rule-store mutations happen under a single
//! advisory [`PipelineLock`]; concurrent runs are out of scope and are
//! rejected up front rather than interleaved.

mod extract;
mod summarize;

pub use extract::{extract_rules, ExtractionReport};
pub use summarize::summarize_session;

use crate::adapter::TranscriptAdapter;
use crate::error::{Error, Result};
use crate::index::SessionIndex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Advisory lock serializing pipeline runs against one state directory.
///
/// The lock is a file created with `create_new`; a second acquirer gets
/// [`Error::LockHeld`] with the lock path so the user can inspect (and,
/// after a crash, remove) it. Released on drop.
#[derive(Debug)]
pub struct PipelineLock {
    path: PathBuf,
}

impl PipelineLock {
    pub fn acquire(state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir)?;
        let path = state_dir.join("pipeline.lock");

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::LockHeld(path));
            }
            Err(e) => return Err(e.into()),
        };
        // Owner pid, for debugging a stale lock after a crash
        let _ = writeln!(file, "{}", std::process::id());

        tracing::debug!(path = %path.display(), "Acquired pipeline lock");
        Ok(Self { path })
    }
}

impl Drop for PipelineLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release pipeline lock");
        }
    }
}

/// Result of one discovery sweep.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Sessions found by adapter discovery
    pub discovered: usize,
    /// Sessions registered for the first time this sweep
    pub newly_registered: usize,
    /// Sessions the index already knew
    pub already_known: usize,
    /// Per-item parse problems, skipped without aborting the sweep
    pub skipped: Vec<String>,
}

/// Discover and register every locatable session.
///
/// Registration is idempotent, so running this repeatedly is safe and is
/// how new sessions enter the pipeline. A session one adapter cannot parse
/// (malformed log, unsupported schema version) is recorded in the report
/// and skipped; index errors abort the sweep.
pub fn sync_sessions(
    index: &SessionIndex,
    adapters: &[Box<dyn TranscriptAdapter>],
) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    for adapter in adapters {
        if !adapter.is_available() {
            tracing::debug!(tool = %adapter.tool(), "Adapter root not present, skipping");
            continue;
        }

        let locations = adapter.discover()?;
        report.discovered += locations.len();

        for location in &locations {
            let session = match adapter.parse(location) {
                Ok(session) => session,
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(
                        tool = %adapter.tool(),
                        path = %location.path.display(),
                        error = %e,
                        "Skipping unparseable session"
                    );
                    report.skipped.push(format!("{}: {}", location.session_id, e));
                    continue;
                }
                Err(e) => return Err(e),
            };

            let was_known = index.get(&session.id)?.is_some();
            index.register(&session)?;
            if was_known {
                report.already_known += 1;
            } else {
                report.newly_registered += 1;
            }
        }
    }

    tracing::info!(
        discovered = report.discovered,
        new = report.newly_registered,
        known = report.already_known,
        skipped = report.skipped.len(),
        "Session sync complete"
    );
    Ok(report)
}
