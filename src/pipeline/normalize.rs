//! Style normalizer.
//!
//! Deterministic, total text transform run before every scoring pass:
//! 1. strip decorative glyphs and markdown emphasis
//! 2. remove first-person experiential openers ("I feel that ...")
//! 3. in aggressive mode, fold headings and bulleted/numbered lists into prose
//! 4. collapse irregular whitespace
//!
//! If the result is empty or lost more than the configured share of its
//! characters, the original input is returned unchanged.

use std::sync::LazyLock;

use regex::Regex;

use super::lexicon::EXPERIENTIAL_REWRITES;
use super::types::RefinementMode;
use crate::config::NormalizeSettings;

/// Which transform touched the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeEdit {
    DecorationRemoved,
    ExperientialPhrasingRemoved,
    StructureFlattened,
    WhitespaceCollapsed,
}

/// Normalizer output.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub text: String,
    pub edits: Vec<NormalizeEdit>,
    /// The transform was discarded by the safety check.
    pub reverted: bool,
}

/// Normalize `text` for `mode`, returning only the text.
pub fn normalize(text: &str, mode: RefinementMode, settings: &NormalizeSettings) -> String {
    normalize_style(text, mode, settings).text
}

/// Normalize `text` for `mode`, reporting which edits were applied.
///
/// `Off` only removes decoration and collapses whitespace; `Light` also
/// removes experiential phrasing; `Aggressive` also flattens structure.
pub fn normalize_style(
    text: &str,
    mode: RefinementMode,
    settings: &NormalizeSettings,
) -> Normalized {
    let mut result = text.to_string();
    let mut edits = Vec::new();

    let before = result.clone();
    result = strip_decoration(&result);
    if result != before {
        edits.push(NormalizeEdit::DecorationRemoved);
    }

    if mode != RefinementMode::Off {
        let before = result.clone();
        result = strip_experiential_phrasing(&result);
        if result != before {
            edits.push(NormalizeEdit::ExperientialPhrasingRemoved);
        }
    }

    if mode == RefinementMode::Aggressive {
        let before = result.clone();
        result = flatten_structure(&result);
        if result != before {
            edits.push(NormalizeEdit::StructureFlattened);
        }
    }

    let before = result.clone();
    result = collapse_whitespace(&result);
    if result != before {
        edits.push(NormalizeEdit::WhitespaceCollapsed);
    }

    if destroys_content(text, &result, settings.max_shrink_ratio) {
        tracing::warn!(
            input_chars = text.chars().count(),
            output_chars = result.chars().count(),
            "Normalization would destroy content, keeping original"
        );
        return Normalized {
            text: text.to_string(),
            edits: Vec::new(),
            reverted: true,
        };
    }

    Normalized {
        text: result,
        edits,
        reverted: false,
    }
}

/// Empty output, or more than `max_shrink_ratio` of the characters gone.
fn destroys_content(original: &str, normalized: &str, max_shrink_ratio: f64) -> bool {
    if normalized.trim().is_empty() {
        return !original.trim().is_empty();
    }
    let before = original.chars().count() as f64;
    let after = normalized.chars().count() as f64;
    after < before * (1.0 - max_shrink_ratio)
}

// =================================================================
// DECORATION
// =================================================================

static EMPHASIS_BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*\n]+?)\*\*").expect("valid regex"));
static EMPHASIS_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__([^_\n]+?)__").expect("valid regex"));
static HORIZONTAL_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(?:[-*_=][ \t]*){3,}$").expect("valid regex"));

fn strip_decoration(text: &str) -> String {
    let text: String = text.chars().filter(|c| !is_decorative_glyph(*c)).collect();
    let text = EMPHASIS_BOLD.replace_all(&text, "$1");
    let text = EMPHASIS_UNDERSCORE.replace_all(&text, "$1");
    HORIZONTAL_RULE.replace_all(&text, "").to_string()
}

/// Emoji, dingbats, stars and pointers. `•` is a list marker, not decoration.
fn is_decorative_glyph(c: char) -> bool {
    matches!(
        c,
        '\u{1F300}'..='\u{1FAFF}' // Emoji and pictographs
        | '\u{2600}'..='\u{27BF}' // Misc symbols, dingbats
        | '\u{2B50}' | '\u{2B55}' // Stars, circles
        | '\u{FE0F}'              // Emoji variation selector
        | '\u{200D}'              // Zero-width joiner
        | '\u{25A0}'..='\u{25FF}' // Geometric shapes
    )
}

// =================================================================
// EXPERIENTIAL PHRASING
// =================================================================

fn strip_experiential_phrasing(text: &str) -> String {
    let mut result = text.to_string();
    for rule in EXPERIENTIAL_REWRITES.iter() {
        result = apply_rewrite(&rule.regex, rule.replacement, &result);
    }
    result
}

/// Replace every match, fixing case only at the edited spans: a sentence
/// that lost its opener starts with a capital, and a replacement inside a
/// sentence starts lowercase. Text between matches is copied as is.
fn apply_rewrite(regex: &Regex, replacement: &str, text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut capitalize_next = false;

    for m in regex.find_iter(text) {
        push_segment(&mut out, &text[last..m.start()], &mut capitalize_next);
        let at_sentence_start = is_sentence_start(&text[..m.start()]);
        if replacement.is_empty() {
            capitalize_next = at_sentence_start;
        } else if at_sentence_start {
            out.push_str(replacement);
        } else {
            out.push_str(&lowercase_first(replacement));
        }
        last = m.end();
    }
    push_segment(&mut out, &text[last..], &mut capitalize_next);
    out
}

fn push_segment(out: &mut String, segment: &str, capitalize: &mut bool) {
    if segment.is_empty() {
        return;
    }
    if std::mem::take(capitalize) && first_word_is_lowercase(segment) {
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
            return;
        }
    }
    out.push_str(segment);
}

/// "iPhone" or "eBay" keep their case.
fn first_word_is_lowercase(segment: &str) -> bool {
    let word = segment.split_whitespace().next().unwrap_or_default();
    word.chars().next().is_some_and(char::is_lowercase)
        && !word.chars().any(char::is_uppercase)
}

fn is_sentence_start(prefix: &str) -> bool {
    let trimmed = prefix.trim_end_matches([' ', '\t']);
    trimmed.is_empty() || trimmed.ends_with(['.', '!', '?', '\n'])
}

fn lowercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

// =================================================================
// STRUCTURE
// =================================================================

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s{0,3}#{1,6}\s+(.+?)\s*#*\s*$").expect("valid regex"));
static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*+•]|\d{1,3}[.)])\s+(.+)$").expect("valid regex"));

/// Fold headings into standalone paragraphs and consecutive list items into
/// one run of sentences.
fn flatten_structure(text: &str) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut list_run: Vec<String> = Vec::new();
    let mut prose: Vec<String> = Vec::new();

    fn flush(target: &mut Vec<String>, buffer: &mut Vec<String>) {
        if !buffer.is_empty() {
            target.push(buffer.join(" "));
            buffer.clear();
        }
    }

    for line in text.lines() {
        if let Some(caps) = LIST_ITEM.captures(line) {
            flush(&mut paragraphs, &mut prose);
            list_run.push(ensure_terminal_punctuation(caps[1].trim()));
        } else if let Some(caps) = HEADING.captures(line) {
            flush(&mut paragraphs, &mut list_run);
            flush(&mut paragraphs, &mut prose);
            paragraphs.push(caps[1].trim().to_string());
        } else if line.trim().is_empty() {
            // A blank line between list items does not end the run.
            flush(&mut paragraphs, &mut prose);
        } else {
            flush(&mut paragraphs, &mut list_run);
            prose.push(line.trim().to_string());
        }
    }
    flush(&mut paragraphs, &mut list_run);
    flush(&mut paragraphs, &mut prose);

    paragraphs.join("\n\n")
}

fn ensure_terminal_punctuation(item: &str) -> String {
    match item.chars().last() {
        Some('.' | '!' | '?' | ':' | ';' | ']' | ')') => item.to_string(),
        Some(_) => format!("{item}."),
        None => String::new(),
    }
}

// =================================================================
// WHITESPACE
// =================================================================

static INLINE_SPACE_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[ \t\u{00A0}\u{2000}-\u{200A}\u{202F}\u{3000}]+").expect("valid regex")
});
static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" +([,.;:!?])").expect("valid regex"));
static BLANK_LINE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

fn collapse_whitespace(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = INLINE_SPACE_RUN.replace_all(&text, " ");
    let text = SPACE_BEFORE_PUNCT.replace_all(&text, "$1");
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let text = lines.join("\n");
    BLANK_LINE_RUN.replace_all(&text, "\n\n").trim().to_string()
}
