//! Metadata extraction for todo lines.
//!
//! A todo line can carry inline markers:
//!
//! | Marker | Example | Meaning |
//! |--------|---------|---------|
//! | `#tag` / `#multi-word-tag` | `#interior` | tag |
//! | `YYYY-MM-DD` | `2026-03-01` | due date (first one wins) |
//! | `!`, `!!`, `!!!` | `!!` | priority 1-3 |
//!
//! Tags are collected from the todo text and from its surrounding context.
//! Tag and priority markers are removed from the display text; dates stay.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use pulldown_cmark::{html, Options, Parser};
use regex::Regex;

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#(\w+(?:-\w+)*)").expect("tag regex is valid"));

/// A tag that starts a word, including the whitespace in front of it.
static TAG_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)#\w+(?:-\w+)*").expect("tag token regex is valid"));

static DUE_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("date regex is valid"));

static PRIORITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)(!{1,3})(?:\s|$)").expect("priority regex is valid"));

/// Highest priority a todo can carry.
pub const MAX_PRIORITY: u8 = 3;

/// Metadata derived from one todo line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TodoMetadata {
    /// Deduplicated tags, sorted.
    pub tags: Vec<String>,
    /// First ISO date in the raw text.
    pub due_date: Option<String>,
    /// 0 when no marker is present.
    pub priority: u8,
    /// Raw text without tag and priority markers.
    pub text: String,
}

/// Extracts tags, due date, priority and cleaned text from a todo.
///
/// # Example
///
/// ```
/// use tickbook_core::metadata::extract_metadata;
///
/// let meta = extract_metadata("Paint wall #interior !!", "");
/// assert_eq!(meta.tags, vec!["interior"]);
/// assert_eq!(meta.priority, 2);
/// assert_eq!(meta.text, "Paint wall");
/// ```
#[must_use]
pub fn extract_metadata(raw_text: &str, context: &str) -> TodoMetadata {
    let combined = format!("{raw_text} {context}");

    TodoMetadata {
        tags: extract_tags(&combined),
        due_date: extract_due_date(raw_text),
        priority: extract_priority(raw_text),
        text: clean_text(raw_text),
    }
}

/// Returns every distinct `#tag` in `text`, without the `#`, sorted.
#[must_use]
pub fn extract_tags(text: &str) -> Vec<String> {
    TAG.captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Returns the first `YYYY-MM-DD` substring of `text`.
#[must_use]
pub fn extract_due_date(text: &str) -> Option<String> {
    DUE_DATE.captures(text).map(|caps| caps[1].to_string())
}

/// Returns the length of the first standalone run of 1-3 `!`, or 0.
#[must_use]
pub fn extract_priority(text: &str) -> u8 {
    PRIORITY
        .captures(text)
        .map_or(0, |caps| caps[1].len().min(usize::from(MAX_PRIORITY)) as u8)
}

/// Removes tag tokens and priority markers from `text`.
#[must_use]
pub fn clean_text(text: &str) -> String {
    let without_tags = TAG_TOKEN.replace_all(text, "");
    // A priority match eats the whitespace on both sides; put one back.
    let without_priority = PRIORITY.replace_all(&without_tags, " ");
    without_priority.trim().to_string()
}

/// Renders inline markdown (bold, italic, strikethrough, code) to HTML with
/// the wrapping paragraph removed.
#[must_use]
pub fn render_inline(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(text, options);
    let mut out = String::with_capacity(text.len() + 16);
    html::push_html(&mut out, parser);

    let trimmed = out.trim_end();
    trimmed
        .strip_prefix("<p>")
        .and_then(|inner| inner.strip_suffix("</p>"))
        .unwrap_or(trimmed)
        .to_string()
}
