//! Lightweight answer-language guess for the language-match dimension.
//!
//! Counts function words that are frequent in one language and rare in the
//! others. Returns `None` when the text is short or the signal is not
//! clearly dominant, so an undetermined answer is never flagged as a
//! mismatch.

/// Languages the heuristic can tell apart.
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "fr", "de"];

const ENGLISH_INDICATORS: &[&str] = &[
    "the", "and", "was", "for", "are", "but", "not", "with", "this", "that", "have", "from",
    "they", "will", "which", "would", "there", "their", "what", "about", "is", "of", "it",
];

const FRENCH_INDICATORS: &[&str] = &[
    "le", "la", "les", "un", "une", "des", "du", "et", "est", "pour", "par", "sur", "dans",
    "avec", "qui", "que", "pas", "mais", "ce", "cette", "sont", "nous", "vous", "il", "elle",
];

const GERMAN_INDICATORS: &[&str] = &[
    "der", "die", "das", "und", "ist", "nicht", "mit", "ein", "eine", "auf", "für", "sich",
    "auch", "dem", "den", "zu", "von", "wird", "sind", "oder", "aber", "wie", "im",
];

/// Minimum words before a guess is attempted.
const MIN_WORDS: usize = 12;

/// Minimum indicator hits for the winning language.
const MIN_HITS: u32 = 4;

/// The winner must beat the runner-up by this factor.
const DOMINANCE_RATIO: f64 = 1.5;

/// Guess the language of `text`. `None` means undetermined.
pub fn detect_language(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .collect();

    if words.len() < MIN_WORDS {
        return None;
    }

    let mut scores = [
        ("en", count_indicators(&words, ENGLISH_INDICATORS)),
        ("fr", count_indicators(&words, FRENCH_INDICATORS) + count_french_diacritics(&lower)),
        ("de", count_indicators(&words, GERMAN_INDICATORS) + count_german_letters(&lower)),
    ];
    scores.sort_by(|a, b| b.1.cmp(&a.1));

    let (best_lang, best) = scores[0];
    let runner_up = scores[1].1;

    if best < MIN_HITS || f64::from(best) < f64::from(runner_up) * DOMINANCE_RATIO {
        return None;
    }
    Some(best_lang)
}

/// Reduce a language tag ("en-US", "FR") to its primary subtag ("en", "fr").
pub fn primary_subtag(tag: &str) -> String {
    tag.split(['-', '_'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// `true` only when the expected language is supported, the answer's
/// language is confidently detected, and the two differ.
pub fn is_language_mismatch(expected: &str, text: &str) -> bool {
    let expected = primary_subtag(expected);
    if !SUPPORTED_LANGUAGES.contains(&expected.as_str()) {
        return false;
    }
    match detect_language(text) {
        Some(detected) => detected != expected,
        None => false,
    }
}

fn count_indicators(words: &[&str], indicators: &[&str]) -> u32 {
    words.iter().filter(|w| indicators.contains(w)).count() as u32
}

/// Each 2 diacritics = 1 point.
fn count_french_diacritics(lower_text: &str) -> u32 {
    let count = lower_text
        .chars()
        .filter(|c| matches!(c, 'é' | 'è' | 'ê' | 'ç' | 'à' | 'â' | 'ù' | 'û' | 'î' | 'ô' | 'œ'))
        .count() as u32;
    count / 2
}

/// Each 2 umlauts / eszett = 1 point.
fn count_german_letters(lower_text: &str) -> u32 {
    let count = lower_text
        .chars()
        .filter(|c| matches!(c, 'ä' | 'ö' | 'ü' | 'ß'))
        .count() as u32;
    count / 2
}
