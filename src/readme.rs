//! README discovery and summary extraction.
//!
//! Turns free-form README text into a bounded summary with an optional
//! "use when" clause. Markup is stripped heuristically: HTML tags, badges,
//! headings, code fences, and tables never reach the summary.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::manifest::read_capped;

/// Candidate names, matched case-insensitively, first wins.
const README_NAMES: [&str; 5] = [
    "readme.md",
    "readme",
    "readme.rst",
    "readme.txt",
    "readme.markdown",
];

const USE_WHEN_MAX_CHARS: usize = 100;

/// A README read into memory.
#[derive(Debug, Clone)]
pub struct Readme {
    pub file_name: String,
    pub content: String,
}

/// Extracted summary text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadmeSummary {
    /// Bounded summary, with ` Use when: …` appended when the README states
    /// a use case explicitly and the word bound allows it.
    pub summary: String,
    pub use_when: Option<String>,
}

/// Locate and read the top-level README of `dir`.
pub fn find_readme(dir: &Path) -> Option<Readme> {
    let entries: Vec<String> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();

    for candidate in README_NAMES {
        let mut matches: Vec<&String> = entries
            .iter()
            .filter(|name| name.eq_ignore_ascii_case(candidate))
            .collect();
        matches.sort();
        if let Some(name) = matches.first() {
            let (content, _) = read_capped(&dir.join(name.as_str()));
            return Some(Readme {
                file_name: (*name).clone(),
                content,
            });
        }
    }
    None
}

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>\n]+>").expect("valid regex"));
static MD_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));
static MD_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex"));
static EXPLICIT_USE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:use cases?|when to use)[^\n:]*:[ \t]*([^\n]+)").expect("valid regex")
});
static PURPOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:used for|best for|designed for)\s+([^\n]+)").expect("valid regex")
});
static TOPIC_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"topic-([a-z0-9][a-z0-9-]*)").expect("valid regex"));

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn strip_inline_markup(line: &str) -> String {
    let line = MD_IMAGE.replace_all(line, " ");
    let line = MD_LINK.replace_all(&line, "$1");
    line.chars()
        .filter(|c| !matches!(c, '*' | '`'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// README text with markup removed, one logical line per source line.
/// Code blocks, badges, and table rows are dropped; headings are dropped
/// unless `keep_headings` is set, in which case only their `#` markers go.
fn clean_lines(content: &str, keep_headings: bool) -> Vec<String> {
    let without_tags = HTML_TAG.replace_all(content, " ");
    let decoded = decode_entities(&without_tags);
    let mut in_fence = false;
    let mut out = Vec::new();
    for raw in decoded.lines() {
        let trimmed = raw.trim();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if trimmed.starts_with('#') {
            if keep_headings {
                out.push(strip_inline_markup(trimmed.trim_start_matches('#')));
            }
            continue;
        }
        let rule = !trimmed.is_empty()
            && trimmed.chars().all(|c| matches!(c, '=' | '-' | '_' | '*'));
        if rule || trimmed.starts_with('|') || trimmed.contains("[![") || trimmed.starts_with("![") {
            continue;
        }
        out.push(strip_inline_markup(trimmed));
    }
    out
}

/// First prose paragraph: lines with fewer than three words are skipped
/// until the paragraph starts; a blank line ends it.
fn first_paragraph(lines: &[String]) -> String {
    let mut para: Vec<&str> = Vec::new();
    for line in lines {
        if line.is_empty() {
            if !para.is_empty() {
                break;
            }
            continue;
        }
        if para.is_empty() && line.split_whitespace().count() < 3 {
            continue;
        }
        para.push(line);
    }
    para.join(" ")
}

fn bound_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return words.join(" ");
    }
    let mut out = words[..max_words].join(" ");
    out.push('…');
    out
}

fn cap_chars(text: &str, max: usize) -> String {
    let trimmed = text.trim().trim_end_matches(['.', ',', ';', ':']);
    match trimmed.char_indices().nth(max) {
        Some((idx, _)) => trimmed[..idx].trim_end().to_string(),
        None => trimmed.to_string(),
    }
}

fn explicit_use_case(text: &str) -> Option<String> {
    [&*EXPLICIT_USE, &*PURPOSE].iter().find_map(|re| {
        re.captures_iter(text)
            .map(|caps| cap_chars(&caps[1], USE_WHEN_MAX_CHARS))
            .find(|clause| clause.chars().count() > 10)
    })
}

fn first_sentence(text: &str) -> Option<String> {
    let end = text.find(". ").map(|i| i + 1).unwrap_or(text.len());
    let sentence = cap_chars(&text[..end], USE_WHEN_MAX_CHARS);
    if sentence.is_empty() {
        None
    } else {
        Some(sentence)
    }
}

/// Build the bounded summary for README `content`.
pub fn summarize(content: &str, max_words: usize) -> ReadmeSummary {
    let paragraph = first_paragraph(&clean_lines(content, false));
    let explicit = explicit_use_case(&clean_lines(content, true).join("\n"));

    match explicit {
        Some(clause) => {
            let clause_words = clause.split_whitespace().count() + 2;
            if paragraph.is_empty() {
                return ReadmeSummary {
                    summary: bound_words(&format!("Use when: {}.", clause), max_words),
                    use_when: Some(clause),
                };
            }
            let summary = if max_words > clause_words + 10 {
                format!(
                    "{} Use when: {}.",
                    bound_words(&paragraph, max_words - clause_words),
                    clause
                )
            } else {
                bound_words(&paragraph, max_words)
            };
            ReadmeSummary {
                summary,
                use_when: Some(clause),
            }
        }
        None => ReadmeSummary {
            summary: bound_words(&paragraph, max_words),
            use_when: first_sentence(&paragraph),
        },
    }
}

/// `topic-<x>` markers, as found in GitHub topic badges.
pub fn topic_markers(content: &str) -> Vec<String> {
    let lower = content.to_lowercase();
    TOPIC_MARKER
        .captures_iter(&lower)
        .map(|caps| caps[1].trim_end_matches('-').to_string())
        .collect()
}
