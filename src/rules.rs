//! Categorized rule documents
//!
//! The durable output of the pipeline: one markdown file per
//! [`RuleCategory`] under a rules directory. Each entry is a `##` section
//! followed by its body and a marker comment carrying the dedup fingerprint
//! and source session ids:
//!
//! ```text
//! ## Tokens rotate during multi-step auth flows
//!
//! Cache the JWT at flow start; re-reading mid-flow races the rotation.
//!
//! <!-- afterpaths: fingerprint=9f3a5c1d2e4b6a80 sources=s-1,s-4 -->
//! ```
//!
//! Documents are user-visible and user-editable. The store re-parses the
//! documents from disk before every merge cycle and preserves what it does
//! not understand: prose above the first `##` heading survives a rewrite
//! verbatim, and a section without a marker comment is treated as a
//! hand-added entry (fingerprint computed from its title, sources empty).

use crate::error::{Error, Result};
use crate::types::{rule_fingerprint, RuleCandidate, RuleCategory, RuleEntry};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

const MARKER_PREFIX: &str = "<!-- afterpaths: ";

/// Outcome of merging one candidate into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Candidate was new within its category; an entry was added
    Inserted,
    /// An entry with the same fingerprint existed; its sources were unioned
    Corroborated,
}

/// One parsed category document: preserved preamble plus ordered entries.
#[derive(Debug, Clone, Default)]
struct Document {
    /// Prose above the first `##` heading, kept verbatim on rewrite
    preamble: String,
    /// Entries in document order; merges append, never reorder
    entries: Vec<RuleEntry>,
}

/// In-memory view of the four category documents, loaded from and written
/// back to a rules directory.
pub struct RuleStore {
    dir: PathBuf,
    documents: BTreeMap<RuleCategory, Document>,
}

impl RuleStore {
    /// Load all category documents from `dir`, creating it if needed.
    ///
    /// Missing documents are treated as empty. Loading is tolerant:
    /// a document that exists is parsed with [`parse_document`] semantics
    /// so manual edits are not lost on the next write.
    pub fn load(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut documents = BTreeMap::new();
        for category in RuleCategory::ALL {
            let path = dir.join(category.document_name());
            let document = if path.exists() {
                let raw = fs::read_to_string(&path)?;
                parse_document(category, &raw)
            } else {
                Document::default()
            };
            documents.insert(category, document);
        }

        Ok(Self { dir, documents })
    }

    /// Total entry count across all categories.
    pub fn len(&self) -> usize {
        self.documents.values().map(|d| d.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries of one category, in document order.
    pub fn entries(&self, category: RuleCategory) -> &[RuleEntry] {
        self.documents
            .get(&category)
            .map(|d| d.entries.as_slice())
            .unwrap_or(&[])
    }

    /// Merge one candidate.
    ///
    /// Validation failures (`InvalidRuleCandidate`) leave the store
    /// untouched. A candidate whose fingerprint is already present in its
    /// category corroborates the existing entry: sources are unioned, the
    /// stored title and body win. A new fingerprint appends an entry.
    pub fn merge(&mut self, candidate: &RuleCandidate) -> Result<MergeOutcome> {
        let title = candidate.title.trim();
        if title.is_empty() {
            return Err(Error::InvalidRuleCandidate(
                "empty title".to_string(),
            ));
        }
        let body = candidate.body.trim();
        if body.is_empty() {
            return Err(Error::InvalidRuleCandidate(format!(
                "empty body for '{}'",
                title
            )));
        }

        let fingerprint = rule_fingerprint(candidate.category, title);
        let document = self.documents.entry(candidate.category).or_default();

        if let Some(existing) = document
            .entries
            .iter_mut()
            .find(|e| e.fingerprint == fingerprint)
        {
            for source in &candidate.sources {
                existing.sources.insert(source.clone());
            }
            tracing::debug!(
                category = %candidate.category,
                fingerprint,
                "Corroborated existing rule"
            );
            return Ok(MergeOutcome::Corroborated);
        }

        document.entries.push(RuleEntry::new(
            candidate.category,
            title,
            body,
            candidate.sources.iter().cloned(),
        ));
        tracing::debug!(category = %candidate.category, fingerprint, "Inserted new rule");
        Ok(MergeOutcome::Inserted)
    }

    /// Write every category document back to disk, atomically per file
    /// (temp + rename). Categories with no entries and no preamble are not
    /// written. Returns the paths written.
    pub fn write(&self) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for category in RuleCategory::ALL {
            let document = match self.documents.get(&category) {
                Some(d) if !d.entries.is_empty() || !d.preamble.is_empty() => d,
                _ => continue,
            };

            let path = self.dir.join(category.document_name());
            let tmp = path.with_extension("md.tmp");
            fs::write(&tmp, render_document(category, document))?;
            fs::rename(&tmp, &path)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Parse one category document.
///
/// Tolerant by construction: every `##` heading starts an entry; the lines
/// until the next heading are its body, minus a trailing marker comment if
/// one is present. Anything above the first heading is preamble.
fn parse_document(category: RuleCategory, raw: &str) -> Document {
    let mut preamble = String::new();
    let mut entries: Vec<RuleEntry> = Vec::new();
    let mut current: Option<(String, Vec<String>)> = None;

    let flush = |current: &mut Option<(String, Vec<String>)>, entries: &mut Vec<RuleEntry>| {
        if let Some((title, lines)) = current.take() {
            entries.push(entry_from_section(category, &title, &lines));
        }
    };

    for line in raw.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            flush(&mut current, &mut entries);
            current = Some((heading.trim().to_string(), Vec::new()));
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line.to_string());
        } else {
            preamble.push_str(line);
            preamble.push('\n');
        }
    }
    flush(&mut current, &mut entries);

    // Drop the document heading (`# Gotchas`) from the preamble; it is
    // re-rendered on write. Everything else stays.
    let heading_line = format!("# {}", category.heading());
    let preamble = preamble
        .lines()
        .filter(|l| l.trim() != heading_line)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    Document { preamble, entries }
}

fn entry_from_section(category: RuleCategory, title: &str, lines: &[String]) -> RuleEntry {
    let mut fingerprint = None;
    let mut sources: Vec<String> = Vec::new();
    let mut body_lines: Vec<&str> = Vec::new();

    for line in lines {
        let trimmed = line.trim();
        if let Some(marker) = trimmed
            .strip_prefix(MARKER_PREFIX)
            .and_then(|s| s.strip_suffix("-->"))
        {
            for field in marker.split_whitespace() {
                if let Some(value) = field.strip_prefix("fingerprint=") {
                    fingerprint = Some(value.to_string());
                } else if let Some(value) = field.strip_prefix("sources=") {
                    sources = value
                        .split(',')
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect();
                }
            }
        } else {
            body_lines.push(line);
        }
    }

    let body = body_lines.join("\n").trim().to_string();
    RuleEntry {
        category,
        title: title.to_string(),
        body,
        sources: sources.into_iter().collect(),
        // Hand-added sections have no marker; key them by their title so a
        // later candidate with the same normalized title corroborates
        // instead of duplicating.
        fingerprint: fingerprint.unwrap_or_else(|| rule_fingerprint(category, title)),
    }
}

fn render_document(category: RuleCategory, document: &Document) -> String {
    let mut out = format!("# {}\n", category.heading());

    if !document.preamble.is_empty() {
        out.push('\n');
        out.push_str(&document.preamble);
        out.push('\n');
    }

    for entry in &document.entries {
        out.push('\n');
        out.push_str("## ");
        out.push_str(&entry.title);
        out.push_str("\n\n");
        if !entry.body.is_empty() {
            out.push_str(&entry.body);
            out.push_str("\n\n");
        }
        let sources: Vec<&str> = entry.sources.iter().map(String::as_str).collect();
        out.push_str(&format!(
            "{}fingerprint={} sources={} -->\n",
            MARKER_PREFIX,
            entry.fingerprint,
            sources.join(",")
        ));
    }

    out
}
