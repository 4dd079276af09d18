//! Summarization step

use crate::error::{Error, Result};
use crate::index::SessionIndex;
use crate::llm::Summarizer;
use crate::summaries::SummaryStore;
use crate::types::{Session, Summary, SummaryStatus};
use std::path::PathBuf;

/// Summarize one session and record the result.
///
/// Order of operations keeps failures clean:
/// 1. An empty session fails with [`Error::EmptySession`] before any
///    external call is spent.
/// 2. An already-summarized session fails with `InvalidTransition` unless
///    `resummarize` is set, again before the external call.
/// 3. The summarizer runs; failure maps to `SummarizationFailed` and
///    leaves the index entry `Pending` (callers exhaust their retry
///    budget, then call [`SessionIndex::mark_failed`]).
/// 4. The artifact is persisted first, then the index is updated, so a
///    crash between the two leaves a re-runnable `Pending` entry and an
///    orphan file rather than a dangling `summary_ref`.
///
/// Returns the artifact path.
pub fn summarize_session(
    index: &SessionIndex,
    store: &SummaryStore,
    summarizer: &dyn Summarizer,
    session: &Session,
    git_ref: Option<&str>,
    resummarize: bool,
) -> Result<PathBuf> {
    if session.is_empty() {
        return Err(Error::EmptySession(session.id.clone()));
    }

    let entry = index.register(session)?;
    if entry.summary_status == SummaryStatus::Summarized && !resummarize {
        return Err(Error::InvalidTransition {
            session_id: session.id.clone(),
            from: entry.summary_status.as_str().to_string(),
        });
    }

    let text = summarizer
        .summarize(session, git_ref)
        .map_err(|e| Error::SummarizationFailed(format!("{}: {}", session.id, e)))?;

    let summary = Summary {
        session_id: session.id.clone(),
        git_ref: git_ref.map(String::from),
        text,
    };
    let path = store.save(&summary)?;
    index.mark_summarized(&session.id, &path, resummarize)?;

    tracing::info!(session_id = %session.id, "Summarization step complete");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Tool, Turn};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSummarizer {
        text: &'static str,
        calls: AtomicUsize,
    }

    impl FixedSummarizer {
        fn new(text: &'static str) -> Self {
            Self {
                text,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Summarizer for FixedSummarizer {
        fn summarize(&self, _session: &Session, _git_ref: Option<&str>) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.text.to_string())
        }
    }

    struct FailingSummarizer;

    impl Summarizer for FailingSummarizer {
        fn summarize(&self, _session: &Session, _git_ref: Option<&str>) -> Result<String> {
            Err(Error::Llm("service unavailable".to_string()))
        }
    }

    fn session(id: &str) -> Session {
        Session {
            id: id.to_string(),
            tool: Tool::ClaudeCode,
            path: PathBuf::from(format!("/tmp/{}.jsonl", id)),
            started_at: None,
            turns: vec![Turn::user("hello"), Turn::assistant("hi")],
        }
    }

    fn harness() -> (SessionIndex, SummaryStore, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let index = SessionIndex::open_in_memory().unwrap();
        let store = SummaryStore::open(dir.path().join("summaries")).unwrap();
        (index, store, dir)
    }

    #[test]
    fn test_happy_path_persists_and_marks() {
        let (index, store, _dir) = harness();
        let summarizer = FixedSummarizer::new("## Gotchas\n\n- a lesson");

        let path =
            summarize_session(&index, &store, &summarizer, &session("s-1"), Some("abc"), false)
                .unwrap();

        assert!(path.exists());
        let entry = index.get("s-1").unwrap().unwrap();
        assert_eq!(entry.summary_status, SummaryStatus::Summarized);
        assert_eq!(entry.summary_ref, Some(path));
        assert_eq!(store.load("s-1").unwrap().git_ref.as_deref(), Some("abc"));
    }

    #[test]
    fn test_empty_session_fails_before_llm_call() {
        let (index, store, _dir) = harness();
        let summarizer = FixedSummarizer::new("unused");
        let mut s = session("s-1");
        s.turns.clear();

        let err = summarize_session(&index, &store, &summarizer, &s, None, false).unwrap_err();
        assert!(matches!(err, Error::EmptySession(_)));
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
        // Not even registered: the step rejected it outright
        assert!(index.get("s-1").unwrap().is_none());
    }

    #[test]
    fn test_already_summarized_skips_llm_call() {
        let (index, store, _dir) = harness();
        let summarizer = FixedSummarizer::new("text");
        let s = session("s-1");

        summarize_session(&index, &store, &summarizer, &s, None, false).unwrap();
        let err = summarize_session(&index, &store, &summarizer, &s, None, false).unwrap_err();

        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_resummarize_overwrites_artifact() {
        let (index, store, _dir) = harness();
        let s = session("s-1");

        summarize_session(&index, &store, &FixedSummarizer::new("first"), &s, None, false)
            .unwrap();
        summarize_session(&index, &store, &FixedSummarizer::new("second"), &s, None, true)
            .unwrap();

        assert_eq!(store.load("s-1").unwrap().text, "second");
    }

    #[test]
    fn test_failure_leaves_entry_pending_and_no_artifact() {
        let (index, store, _dir) = harness();
        let s = session("s-1");

        let err = summarize_session(&index, &store, &FailingSummarizer, &s, None, false)
            .unwrap_err();
        assert!(matches!(err, Error::SummarizationFailed(_)));

        let entry = index.get("s-1").unwrap().unwrap();
        assert_eq!(entry.summary_status, SummaryStatus::Pending);
        assert!(entry.summary_ref.is_none());
        assert!(!store.exists("s-1"));
    }
}
