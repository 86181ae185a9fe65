//! Post-rewrite output sanitation.
//!
//! Strips model artifacts (reasoning blocks, unused tokens, a leading
//! "Here is the revised answer:" line) and detects truncation. Runs before
//! the invoker's acceptance checks.

use std::sync::LazyLock;

use regex::Regex;

static THINK_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));
static UNUSED_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<unused\d+>").expect("valid regex"));
static SPECIAL_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<\|?(?:im_start|im_end|eot_id|end_of_turn|start_of_turn)\|?>|</?s>")
        .expect("valid regex")
});
static PREAMBLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\A\s*(?:here\s+is|here's|below\s+is)?\s*(?:the\s+|a\s+|my\s+)?(?:revised|rewritten|improved|updated)\s+(?:answer|version|draft|text)\s*:?[ \t]*\n",
    )
    .expect("valid regex")
});

/// Strip model-specific artifacts from raw rewriter output.
///
/// Handles:
/// 1. `<think>...</think>` reasoning blocks
/// 2. Gemma thinking prefixes (`<unusedN>thought\n...`) and stray `<unusedN>` tokens
/// 3. Chat-template special tokens
/// 4. A leading "Revised answer:" line
pub fn sanitize_llm_output(raw: &str) -> String {
    let mut text = THINK_BLOCK_RE.replace_all(raw, "").to_string();

    // An unterminated <think> means the model never reached the answer.
    if let Some(idx) = text.find("<think>") {
        text.truncate(idx);
    }

    if let Some(idx) = text.find("<unused") {
        if let Some(thought_offset) = text[idx..].find("thought\n") {
            text = text[idx + thought_offset + 8..].to_string();
        }
    }

    text = UNUSED_TOKEN_RE.replace_all(&text, "").to_string();
    text = SPECIAL_TOKEN_RE.replace_all(&text, "").to_string();
    text = PREAMBLE_RE.replace(&text, "").to_string();

    text.trim().to_string()
}

/// Detect if a response appears to be truncated mid-content.
///
/// Heuristics: missing terminal punctuation, a trailing ellipsis, or a
/// suspiciously short last list item.
pub fn is_likely_truncated(text: &str) -> bool {
    let trimmed = text.trim();
    let last_char = match trimmed.chars().last() {
        Some(c) => c,
        None => return false,
    };

    let has_terminal = matches!(
        last_char,
        '.' | '!' | '?' | ':' | '"' | ')' | ']' | '»' | '”'
    );
    if !has_terminal {
        return true;
    }

    if trimmed.ends_with("...") || trimmed.ends_with('…') {
        return true;
    }

    if let Some(last_line) = trimmed.lines().last() {
        let stripped = last_line.trim();
        if (stripped.starts_with('-') || stripped.starts_with('*'))
            && stripped.chars().count() < 20
        {
            return true;
        }
    }

    false
}
