//! End-to-end pipeline tests over fixture transcripts.
//!
//! The fixtures under `tests/fixtures/claude-code/` replay a real shape of
//! debugging work: one session discovers a JWT rotation race during
//! checkout, a later session hits the same class of bug in a batch job.
//! The LLM capabilities are deterministic fakes so every run is
//! reproducible offline.

use afterpaths_core::adapter::{ClaudeCodeAdapter, TranscriptAdapter};
use afterpaths_core::config::ExtractionConfig;
use afterpaths_core::index::SessionIndex;
use afterpaths_core::llm::{RuleExtractor, Summarizer};
use afterpaths_core::pipeline::{extract_rules, summarize_session, sync_sessions};
use afterpaths_core::rules::RuleStore;
use afterpaths_core::summaries::SummaryStore;
use afterpaths_core::{
    Error, ExtractionStatus, Result, RuleCandidate, RuleCategory, Session, Summary, SummaryStatus,
};
use std::path::{Path, PathBuf};

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/claude-code")
}

fn fixture_adapter() -> ClaudeCodeAdapter {
    ClaudeCodeAdapter::with_root(fixtures_root())
}

/// Parse every non-empty fixture session, ordered by id for determinism.
fn fixture_sessions() -> Vec<Session> {
    let adapter = fixture_adapter();
    let mut sessions: Vec<Session> = adapter
        .discover()
        .unwrap()
        .iter()
        .map(|loc| adapter.parse(loc).unwrap())
        .filter(|s| !s.is_empty())
        .collect();
    sessions.sort_by(|a, b| a.id.cmp(&b.id));
    sessions
}

/// Deterministic summarizer: quotes the final assistant turn as the lesson.
struct QuotingSummarizer;

impl Summarizer for QuotingSummarizer {
    fn summarize(&self, session: &Session, _git_ref: Option<&str>) -> Result<String> {
        let finding = session
            .turns
            .iter()
            .rev()
            .find(|t| t.role == afterpaths_core::TurnRole::Assistant)
            .map(|t| t.content.clone())
            .unwrap_or_default();
        Ok(format!("## Gotchas\n\n- {}", finding))
    }
}

/// Deterministic extractor: any summary mentioning token rotation yields
/// the same gotcha, attributed to the summaries that mention it.
struct RotationExtractor;

impl RuleExtractor for RotationExtractor {
    fn extract_rules(&self, summaries: &[Summary]) -> Result<Vec<RuleCandidate>> {
        let sources: Vec<String> = summaries
            .iter()
            .filter(|s| s.text.contains("rotat"))
            .map(|s| s.session_id.clone())
            .collect();
        if sources.is_empty() {
            return Ok(vec![]);
        }
        Ok(vec![RuleCandidate {
            category: RuleCategory::Gotcha,
            title: "Access tokens rotate during long-running flows".to_string(),
            body: "Fetch the token once at flow start and pin it; re-reading mid-flow races the refresh daemon.".to_string(),
            sources,
        }])
    }
}

struct FailingExtractor;

impl RuleExtractor for FailingExtractor {
    fn extract_rules(&self, _summaries: &[Summary]) -> Result<Vec<RuleCandidate>> {
        Err(Error::Llm("overloaded".to_string()))
    }
}

struct Pipeline {
    index: SessionIndex,
    summaries: SummaryStore,
    rules_dir: PathBuf,
    _dir: tempfile::TempDir,
}

fn pipeline() -> Pipeline {
    let dir = tempfile::TempDir::new().unwrap();
    Pipeline {
        index: SessionIndex::open(&dir.path().join("index.db")).unwrap(),
        summaries: SummaryStore::open(dir.path().join("summaries")).unwrap(),
        rules_dir: dir.path().join("rules"),
        _dir: dir,
    }
}

#[test]
fn full_pipeline_produces_deduplicated_gotcha() {
    let p = pipeline();

    // Sweep: both real sessions plus the empty transcript register
    let adapters: Vec<Box<dyn TranscriptAdapter>> = vec![Box::new(fixture_adapter())];
    let report = sync_sessions(&p.index, &adapters).unwrap();
    assert_eq!(report.discovered, 3);
    assert_eq!(report.newly_registered, 3);
    assert!(report.skipped.is_empty());

    // Summarize the non-empty sessions
    for session in fixture_sessions() {
        summarize_session(
            &p.index,
            &p.summaries,
            &QuotingSummarizer,
            &session,
            Some("main@1f2e3d4"),
            false,
        )
        .unwrap();
    }
    assert_eq!(
        p.index.list_unconsumed_summarized().unwrap().len(),
        2,
        "empty session must not enter the extraction queue"
    );

    // Extract: both summaries describe the same rotation race, so the
    // store ends up with one entry carrying both sources
    let report = extract_rules(
        &p.index,
        &p.summaries,
        &p.rules_dir,
        &RotationExtractor,
        &ExtractionConfig::default(),
    )
    .unwrap();
    assert_eq!(report.sessions_processed, 2);
    assert_eq!(report.inserted, 1);
    assert_eq!(report.corroborated, 0);

    let rules = RuleStore::load(&p.rules_dir).unwrap();
    let gotchas = rules.entries(RuleCategory::Gotcha);
    assert_eq!(gotchas.len(), 1);
    assert!(gotchas[0].sources.contains("sess-jwt-4242"));
    assert!(gotchas[0].sources.contains("sess-cache-7777"));

    // Everything consumed; the next extraction run is a no-op
    let report = extract_rules(
        &p.index,
        &p.summaries,
        &p.rules_dir,
        &RotationExtractor,
        &ExtractionConfig::default(),
    )
    .unwrap();
    assert!(report.is_noop());
}

#[test]
fn repeated_sync_registers_nothing_new() {
    let p = pipeline();
    let adapters: Vec<Box<dyn TranscriptAdapter>> = vec![Box::new(fixture_adapter())];

    sync_sessions(&p.index, &adapters).unwrap();
    let second = sync_sessions(&p.index, &adapters).unwrap();

    assert_eq!(second.newly_registered, 0);
    assert_eq!(second.already_known, 3);
}

#[test]
fn one_at_a_time_batches_corroborate_across_runs() {
    let p = pipeline();
    let config = ExtractionConfig {
        batch_size: 1,
        ..Default::default()
    };

    for session in fixture_sessions() {
        summarize_session(&p.index, &p.summaries, &QuotingSummarizer, &session, None, false)
            .unwrap();
    }

    let first = extract_rules(&p.index, &p.summaries, &p.rules_dir, &RotationExtractor, &config)
        .unwrap();
    let second = extract_rules(&p.index, &p.summaries, &p.rules_dir, &RotationExtractor, &config)
        .unwrap();

    assert_eq!(first.inserted, 1);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.corroborated, 1);

    // First batch's body survives; the later batch only contributed its source
    let rules = RuleStore::load(&p.rules_dir).unwrap();
    let gotchas = rules.entries(RuleCategory::Gotcha);
    assert_eq!(gotchas.len(), 1);
    assert_eq!(gotchas[0].sources.len(), 2);
}

#[test]
fn empty_session_is_rejected_before_summarization() {
    let p = pipeline();
    let adapter = fixture_adapter();
    let locations = adapter.discover().unwrap();
    let empty_loc = locations
        .iter()
        .find(|l| l.session_id == "sess-empty-0000")
        .unwrap();
    let session = adapter.parse(empty_loc).unwrap();

    let err = summarize_session(&p.index, &p.summaries, &QuotingSummarizer, &session, None, false)
        .unwrap_err();
    assert!(matches!(err, Error::EmptySession(_)));
}

#[test]
fn extractor_failure_aborts_batch_without_side_effects() {
    let p = pipeline();
    for session in fixture_sessions() {
        summarize_session(&p.index, &p.summaries, &QuotingSummarizer, &session, None, false)
            .unwrap();
    }

    let err = extract_rules(
        &p.index,
        &p.summaries,
        &p.rules_dir,
        &FailingExtractor,
        &ExtractionConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::ExtractionFailed(_)));

    // No rule documents, nothing consumed: the batch is retryable as-is
    assert!(!p.rules_dir.join("gotchas.md").exists());
    assert_eq!(p.index.list_unconsumed_summarized().unwrap().len(), 2);
}

#[test]
fn resummarize_requeues_session_for_extraction() {
    let p = pipeline();
    let sessions = fixture_sessions();
    let target = &sessions[0];

    summarize_session(&p.index, &p.summaries, &QuotingSummarizer, target, None, false).unwrap();
    extract_rules(
        &p.index,
        &p.summaries,
        &p.rules_dir,
        &RotationExtractor,
        &ExtractionConfig::default(),
    )
    .unwrap();
    assert_eq!(
        p.index.get(&target.id).unwrap().unwrap().extraction_status,
        ExtractionStatus::Consumed
    );

    // A fresh summary has not been folded in, so the entry re-enters the queue
    summarize_session(&p.index, &p.summaries, &QuotingSummarizer, target, None, true).unwrap();
    let entry = p.index.get(&target.id).unwrap().unwrap();
    assert_eq!(entry.summary_status, SummaryStatus::Summarized);
    assert_eq!(entry.extraction_status, ExtractionStatus::Unconsumed);

    // Re-extraction corroborates the already-written rule instead of duplicating
    let report = extract_rules(
        &p.index,
        &p.summaries,
        &p.rules_dir,
        &RotationExtractor,
        &ExtractionConfig::default(),
    )
    .unwrap();
    assert_eq!(report.inserted, 0);
    assert_eq!(report.corroborated, 1);
    assert_eq!(
        RuleStore::load(&p.rules_dir)
            .unwrap()
            .entries(RuleCategory::Gotcha)
            .len(),
        1
    );
}

#[test]
fn manual_rule_edits_survive_pipeline_rewrites() {
    let p = pipeline();
    std::fs::create_dir_all(&p.rules_dir).unwrap();
    std::fs::write(
        p.rules_dir.join("gotchas.md"),
        "# Gotchas\n\n## The staging database is shared\n\nCoordinate before running destructive migrations.\n",
    )
    .unwrap();

    for session in fixture_sessions() {
        summarize_session(&p.index, &p.summaries, &QuotingSummarizer, &session, None, false)
            .unwrap();
    }
    extract_rules(
        &p.index,
        &p.summaries,
        &p.rules_dir,
        &RotationExtractor,
        &ExtractionConfig::default(),
    )
    .unwrap();

    let raw = std::fs::read_to_string(p.rules_dir.join("gotchas.md")).unwrap();
    assert!(raw.contains("The staging database is shared"));
    assert!(raw.contains("Access tokens rotate during long-running flows"));

    let rules = RuleStore::load(&p.rules_dir).unwrap();
    assert_eq!(rules.entries(RuleCategory::Gotcha).len(), 2);
}
