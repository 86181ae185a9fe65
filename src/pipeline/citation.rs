use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;

use super::classify::QuestionProfile;
use super::types::SourceDocument;

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d{1,4})\]").expect("Invalid citation marker regex"));

/// A marker plus any whitespace in front of it.
static MARKER_WITH_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\[\d{1,4}\]").expect("Invalid citation marker regex"));

#[derive(Error, Debug)]
pub enum CitationPatchError {
    #[error("No source document available to cite")]
    NoSource,

    #[error("Citation patch capability failed: {0}")]
    Capability(String),
}

/// What the tracker found in one answer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CitationReport {
    /// Valid markers, distinct, in order of first appearance.
    pub markers: Vec<u32>,
    /// Markers pointing at no known source.
    pub invalid_markers: Vec<u32>,
    /// At least one valid marker.
    pub has_citation: bool,
    pub citation_required: bool,
    pub sources_available: bool,
}

impl CitationReport {
    /// A marker is required but absent, and there is something to cite.
    pub fn needs_patch(&self) -> bool {
        self.citation_required && !self.has_citation && self.sources_available
    }
}

/// Every `[n]` in `text`, distinct, in order of first appearance.
pub fn extract_markers(text: &str) -> Vec<u32> {
    let mut seen = Vec::new();
    for caps in MARKER.captures_iter(text) {
        if let Ok(id) = caps[1].parse::<u32>() {
            if !seen.contains(&id) {
                seen.push(id);
            }
        }
    }
    seen
}

/// Check `text` for citation markers against the known sources.
///
/// A marker only counts as present when it points at an existing
/// `SourceDocument.id`.
pub fn check_citations(
    text: &str,
    sources: &[SourceDocument],
    profile: &QuestionProfile,
) -> CitationReport {
    let (markers, invalid_markers): (Vec<u32>, Vec<u32>) = extract_markers(text)
        .into_iter()
        .partition(|id| sources.iter().any(|s| s.id == *id));

    if !invalid_markers.is_empty() {
        tracing::debug!(
            invalid = invalid_markers.len(),
            sources = sources.len(),
            "Citation markers reference unknown sources"
        );
    }

    CitationReport {
        has_citation: !markers.is_empty(),
        markers,
        invalid_markers,
        citation_required: profile.requires_citation,
        sources_available: !sources.is_empty(),
    }
}

/// `text` with every citation marker removed.
pub fn strip_markers(text: &str) -> String {
    MARKER_WITH_SPACE.replace_all(text, "").to_string()
}

/// A patch is accepted only if it adds valid markers and nothing else.
pub fn accept_patch(original: &str, patched: &str, sources: &[SourceDocument]) -> bool {
    let adds_valid_marker = extract_markers(patched)
        .iter()
        .any(|id| sources.iter().any(|s| s.id == *id));
    adds_valid_marker && strip_markers(patched) == strip_markers(original)
}

/// External capability that inserts a minimal citation marker.
///
/// Implementations may only insert `[n]` markers pointing at one of
/// `sources`. `Ok(None)` means nothing could be patched.
#[async_trait]
pub trait CitationPatcher: Send + Sync {
    async fn patch(
        &self,
        text: &str,
        sources: &[SourceDocument],
        question: &str,
    ) -> Result<Option<String>, CitationPatchError>;

    /// Runs in-process with no I/O, so it is still used after cancellation.
    fn is_local(&self) -> bool {
        false
    }
}

/// Local patcher: appends `[n]` to the sentence that shares the most
/// content words with source `n`. Ties go to the lowest source id, then to
/// the earliest sentence.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerPatcher;

#[async_trait]
impl CitationPatcher for MarkerPatcher {
    async fn patch(
        &self,
        text: &str,
        sources: &[SourceDocument],
        _question: &str,
    ) -> Result<Option<String>, CitationPatchError> {
        if sources.is_empty() {
            return Err(CitationPatchError::NoSource);
        }
        Ok(insert_best_marker(text, sources))
    }

    fn is_local(&self) -> bool {
        true
    }
}

/// Pure core of [`MarkerPatcher`].
pub fn insert_best_marker(text: &str, sources: &[SourceDocument]) -> Option<String> {
    let sentences = sentence_spans(text);
    if sentences.is_empty() {
        return None;
    }

    let mut ordered: Vec<&SourceDocument> = sources.iter().collect();
    ordered.sort_by_key(|s| s.id);
    let lowest = ordered.first()?;

    let source_words: Vec<(u32, HashSet<String>)> = ordered
        .iter()
        .map(|s| (s.id, content_words(&s.content)))
        .collect();

    // (overlap, source id, sentence index); first strict maximum wins.
    let mut best: (usize, u32, usize) = (0, lowest.id, 0);
    for (index, span) in sentences.iter().enumerate() {
        let words = content_words(&text[span.start..span.insert_at]);
        for (id, source) in &source_words {
            let overlap = words.intersection(source).count();
            if overlap > best.0 {
                best = (overlap, *id, index);
            }
        }
    }

    let (_, id, index) = best;
    let at = sentences[index].insert_at;
    let mut patched = String::with_capacity(text.len() + 6);
    patched.push_str(&text[..at]);
    patched.push_str(&format!(" [{id}]"));
    patched.push_str(&text[at..]);
    Some(patched)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SentenceSpan {
    start: usize,
    /// Byte offset just before the terminal punctuation.
    insert_at: usize,
}

fn sentence_spans(text: &str) -> Vec<SentenceSpan> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut spans = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        if !matches!(c, '.' | '!' | '?') {
            i += 1;
            continue;
        }
        let mut j = i;
        while j < chars.len() && matches!(chars[j].1, '.' | '!' | '?') {
            j += 1;
        }
        let at_boundary = j == chars.len() || chars[j].1.is_whitespace();
        if at_boundary && !text[start..pos].trim().is_empty() {
            spans.push(SentenceSpan {
                start,
                insert_at: start + text[start..pos].trim_end().len(),
            });
            start = if j < chars.len() { chars[j].0 } else { text.len() };
        }
        i = j;
    }

    let tail = &text[start..];
    if !tail.trim().is_empty() {
        spans.push(SentenceSpan {
            start,
            insert_at: start + tail.trim_end().len(),
        });
    }
    spans
}

const STOPWORDS: &[&str] = &[
    "that", "this", "with", "from", "have", "which", "were", "their", "there", "they", "about",
    "into", "been", "also", "more", "than", "when", "what", "would", "could", "these", "those",
];

fn content_words(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 4 && !STOPWORDS.contains(w))
        .map(str::to_string)
        .collect()
}
