//! Extraction step

use crate::config::ExtractionConfig;
use crate::error::{Error, Result};
use crate::index::SessionIndex;
use crate::llm::RuleExtractor;
use crate::rules::{MergeOutcome, RuleStore};
use crate::summaries::SummaryStore;
use std::path::{Path, PathBuf};

/// Counts from one extraction batch.
#[derive(Debug, Default)]
pub struct ExtractionReport {
    /// Sessions whose summaries went into the extractor call
    pub sessions_processed: usize,
    /// Queue entries skipped (summary artifact missing on disk)
    pub sessions_skipped: usize,
    /// Candidates that became new rule entries
    pub inserted: usize,
    /// Candidates that corroborated existing entries
    pub corroborated: usize,
    /// Candidates rejected by validation
    pub rejected: usize,
    /// Rule documents rewritten
    pub files_written: Vec<PathBuf>,
}

impl ExtractionReport {
    pub fn is_noop(&self) -> bool {
        self.sessions_processed == 0
    }
}

/// Run one extraction batch over the unconsumed-summary queue.
///
/// The batch is atomic with respect to pipeline state: the extractor runs
/// once over the whole batch, candidates merge into a freshly loaded
/// [`RuleStore`], the documents are written, and only then is each batch
/// session marked consumed. An extractor failure aborts before any write
/// or consumption, so the next run retries the same queue. A candidate
/// that fails validation is rejected individually; the batch continues.
pub fn extract_rules(
    index: &SessionIndex,
    store: &SummaryStore,
    rules_dir: &Path,
    extractor: &dyn RuleExtractor,
    config: &ExtractionConfig,
) -> Result<ExtractionReport> {
    let mut report = ExtractionReport::default();

    let cutoff = (config.lookback_days > 0)
        .then(|| chrono::Utc::now() - chrono::Duration::days(i64::from(config.lookback_days)));

    let queue = index.list_unconsumed_summarized()?;
    let mut summaries = Vec::new();
    for entry in &queue {
        if summaries.len() == config.batch_size {
            break;
        }
        if let Some(cutoff) = cutoff {
            if entry.discovered_at < cutoff {
                tracing::debug!(
                    session_id = %entry.session_id,
                    "Queue entry older than lookback window, skipping"
                );
                report.sessions_skipped += 1;
                continue;
            }
        }
        if !store.exists(&entry.session_id) {
            tracing::warn!(
                session_id = %entry.session_id,
                "Queue entry has no summary artifact on disk, skipping"
            );
            report.sessions_skipped += 1;
            continue;
        }
        summaries.push(store.load(&entry.session_id)?);
    }

    if summaries.is_empty() {
        tracing::debug!("Extraction queue empty, nothing to do");
        return Ok(report);
    }

    let batch_ids: Vec<String> = summaries.iter().map(|s| s.session_id.clone()).collect();
    report.sessions_processed = batch_ids.len();

    let candidates = extractor
        .extract_rules(&summaries)
        .map_err(|e| Error::ExtractionFailed(e.to_string()))?;

    let mut rules = RuleStore::load(rules_dir)?;
    for mut candidate in candidates {
        if candidate.sources.is_empty() {
            candidate.sources = batch_ids.clone();
        }
        match rules.merge(&candidate) {
            Ok(MergeOutcome::Inserted) => report.inserted += 1,
            Ok(MergeOutcome::Corroborated) => report.corroborated += 1,
            Err(Error::InvalidRuleCandidate(reason)) => {
                tracing::warn!(reason, "Rejected rule candidate");
                report.rejected += 1;
            }
            Err(e) => return Err(e),
        }
    }

    report.files_written = rules.write()?;

    // Consumption is last: a crash before this point re-runs the batch,
    // and re-running only corroborates what was already written.
    for session_id in &batch_ids {
        index.mark_consumed(session_id)?;
    }

    tracing::info!(
        processed = report.sessions_processed,
        inserted = report.inserted,
        corroborated = report.corroborated,
        rejected = report.rejected,
        "Extraction step complete"
    );
    Ok(report)
}
