use crate::config::RewriteSettings;
use crate::pipeline::types::{IssueTag, SourceDocument};

pub const REWRITE_SYSTEM_PROMPT: &str = r#"You revise draft answers written by an assistant. You improve how the answer is written, not what it claims.

ABSOLUTE RULES:
1. Keep every fact, argument and example of the draft. Do not add new claims.
2. Keep every citation marker such as [1] attached to the statement it supports. Never invent a marker.
3. Never describe feelings, memories, a body or a personal history in the first person.
4. Do not discuss your own nature, consciousness or awareness unless the question asks about it.
5. Write continuous, well-connected prose. Avoid numbered lists and stock phrases unless the question asks for a list.
6. Output ONLY the revised answer, with no preamble and no commentary."#;

/// Length cap for the question section, as a share of the payload cap.
const QUESTION_SHARE: usize = 4;

/// Bounded instruction payload sent to the rewriting capability.
#[derive(Debug, Clone, PartialEq)]
pub struct RewritePayload {
    pub system: String,
    /// Never longer than `RewriteSettings::max_payload_chars`.
    pub prompt: String,
    /// Primary language subtag the rewrite must be written in.
    pub language: String,
    pub issues: Vec<IssueTag>,
    /// The draft did not fit and was cut. A rewrite of a cut draft would
    /// silently drop the tail of the answer.
    pub draft_truncated: bool,
}

/// Per-issue instruction included in the payload.
pub fn issue_instruction(issue: IssueTag) -> &'static str {
    match issue {
        IssueTag::MissingCitation => {
            "Attach the existing source markers [n] to the statements they support."
        }
        IssueTag::InvalidCitation => {
            "Remove citation markers that do not match a listed source."
        }
        IssueTag::AnthropomorphicLanguage => {
            "Remove first-person claims of feelings, memories or experiences; state the content directly."
        }
        IssueTag::LanguageMismatch => "Write the entire answer in the requested language.",
        IssueTag::TopicDrift => {
            "Remove digressions about the assistant's own nature or consciousness."
        }
        IssueTag::TemplateLike => {
            "Replace numbered lists and stock phrases with connected paragraphs."
        }
        IssueTag::ShallowDepth => {
            "Go deeper: state assumptions, implications and limitations of the ideas discussed."
        }
        IssueTag::WeakStructure => {
            "Link the ideas with explicit contrast and cause-effect connectives."
        }
        IssueTag::TooShort => "Develop the answer more fully without adding unsupported claims.",
    }
}

/// English name for the rewrite language instruction.
pub fn language_name(code: &str) -> &str {
    match code {
        "en" => "English",
        "fr" => "French",
        "de" => "German",
        other => other,
    }
}

/// Build the bounded payload for one rewrite attempt.
///
/// Section priority when the cap is tight: issues, then the question
/// (capped), then the draft, then as many sources as still fit.
pub fn build_rewrite_payload(
    draft: &str,
    issues: &[IssueTag],
    question: &str,
    sources: &[SourceDocument],
    language: &str,
    settings: &RewriteSettings,
) -> RewritePayload {
    let max = settings.max_payload_chars;

    let mut distinct: Vec<IssueTag> = Vec::with_capacity(issues.len());
    for issue in issues {
        if !distinct.contains(issue) {
            distinct.push(*issue);
        }
    }

    let mut issues_block = String::from("<ISSUES>\n");
    for issue in &distinct {
        issues_block.push_str(&format!("- {}: {}\n", issue, issue_instruction(*issue)));
    }
    issues_block.push_str("</ISSUES>\n\n");

    let question_block = format!(
        "<QUESTION>\n{}\n</QUESTION>\n\n",
        truncate_chars(question.trim(), max / QUESTION_SHARE)
    );

    const DRAFT_OPEN: &str = "<DRAFT>\n";
    const DRAFT_CLOSE: &str = "\n</DRAFT>";
    const SOURCES_OPEN: &str = "<SOURCES>\n";
    const SOURCES_CLOSE: &str = "</SOURCES>\n\n";

    let fixed = char_len(&issues_block)
        + char_len(&question_block)
        + char_len(DRAFT_OPEN)
        + char_len(DRAFT_CLOSE);
    let mut remaining = max.saturating_sub(fixed);

    let mut draft_truncated = char_len(draft) > remaining;
    let draft_text = truncate_chars(draft, remaining);
    remaining = remaining.saturating_sub(char_len(&draft_text));

    let mut sources_block = String::new();
    let wrapper = char_len(SOURCES_OPEN) + char_len(SOURCES_CLOSE);
    if remaining > wrapper {
        let mut budget = remaining - wrapper;
        for source in sources.iter().take(settings.max_context_docs) {
            let entry = format!(
                "[{}] {}\n",
                source.id,
                truncate_chars(source.content.trim(), settings.max_doc_chars)
            );
            let len = char_len(&entry);
            if len > budget {
                break;
            }
            sources_block.push_str(&entry);
            budget -= len;
        }
    }

    let mut prompt = String::with_capacity(max);
    prompt.push_str(&issues_block);
    prompt.push_str(&question_block);
    if !sources_block.is_empty() {
        prompt.push_str(SOURCES_OPEN);
        prompt.push_str(&sources_block);
        prompt.push_str(SOURCES_CLOSE);
    }
    prompt.push_str(DRAFT_OPEN);
    prompt.push_str(&draft_text);
    prompt.push_str(DRAFT_CLOSE);

    // Only reachable when the issue list alone exceeds a very small cap.
    if char_len(&prompt) > max {
        prompt = truncate_chars(&prompt, max);
        draft_truncated = true;
    }

    let system = format!(
        "{REWRITE_SYSTEM_PROMPT}\n\nWrite the revised answer in {}.",
        language_name(language)
    );

    RewritePayload {
        system,
        prompt,
        language: language.to_string(),
        issues: distinct,
        draft_truncated,
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
