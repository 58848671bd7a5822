//! Sidebar and editor projections over a cache snapshot.

use chrono::{DateTime, Utc};
use htmd::{Element, HtmlToMarkdown, element_handler::Handlers};
use serde::Serialize;

use std::collections::BTreeMap;

use crate::models::Note;

const PREVIEW_CHARS: usize = 100;
const WORDS_PER_MINUTE: usize = 200;

const INLINE_TAGS: [&str; 16] = [
    "a", "b", "strong", "i", "em", "u", "s", "del", "code", "span", "mark", "sub", "sup",
    "kbd", "small", "font",
];
const BLOCK_TAGS: [&str; 22] = [
    "p", "div", "h1", "h2", "h3", "h4", "h5", "h6", "li", "ul", "ol", "blockquote", "pre",
    "table", "tr", "td", "th", "section", "article", "header", "footer", "figure",
];

/// Sidebar search and tab filter. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteFilter {
    pub query: Option<String>,
    pub favorites_only: bool,
    pub tag: Option<String>,
}

impl NoteFilter {
    pub fn matches(&self, note: &Note) -> bool {
        if self.favorites_only && !note.is_favorite {
            return false;
        }

        if let Some(tag) = self.tag.as_deref().filter(|tag| !tag.is_empty()) {
            if !note.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                return false;
            }
        }

        match self.query.as_deref().map(str::trim) {
            Some(query) if !query.is_empty() => {
                let query = query.to_lowercase();
                note.title.to_lowercase().contains(&query)
                    || plain_text(&note.content).to_lowercase().contains(&query)
            }
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteSummary {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub updated_at: DateTime<Utc>,
    pub is_favorite: bool,
    pub tags: Vec<String>,
}

impl From<&Note> for NoteSummary {
    fn from(note: &Note) -> Self {
        Self {
            id: note.id.clone(),
            title: note.title.clone(),
            preview: preview(&note.content),
            updated_at: note.updated_at,
            is_favorite: note.is_favorite,
            tags: note.tags.clone(),
        }
    }
}

pub fn filter(notes: &[Note], filter: &NoteFilter) -> Vec<NoteSummary> {
    notes
        .iter()
        .filter(|note| filter.matches(note))
        .map(NoteSummary::from)
        .collect()
}

/// Most recently updated first, at most `limit` entries.
pub fn recent(notes: &[Note], limit: usize) -> Vec<NoteSummary> {
    let mut sorted: Vec<&Note> = notes.iter().collect();
    sorted.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    sorted
        .into_iter()
        .take(limit)
        .map(NoteSummary::from)
        .collect()
}

pub fn tag_counts(notes: &[Note]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for tag in notes.iter().flat_map(|note| note.tags.iter()) {
        *counts.entry(tag.clone()).or_insert(0) += 1;
    }
    counts
}

pub fn word_count(content: &str) -> usize {
    plain_text(content).split_whitespace().count()
}

/// Characters of the plain-text body, runs of whitespace counted once.
pub fn char_count(content: &str) -> usize {
    let text = plain_text(content);
    let words: Vec<&str> = text.split_whitespace().collect();
    words.iter().map(|word| word.chars().count()).sum::<usize>() + words.len().saturating_sub(1)
}

/// Minutes to read at 200 words per minute, rounded up.
pub const fn reading_minutes(words: usize) -> usize {
    words.div_ceil(WORDS_PER_MINUTE)
}

pub fn preview(content: &str) -> String {
    let text = plain_text(content);
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if text.chars().count() <= PREVIEW_CHARS {
        return text;
    }

    let mut cut: String = text.chars().take(PREVIEW_CHARS).collect();
    cut.truncate(cut.trim_end().len());
    cut.push('…');
    cut
}

/// Converter that keeps only the text of an HTML body. Inline markup yields
/// its children as is; block elements are separated by line breaks.
fn text_converter() -> HtmlToMarkdown {
    HtmlToMarkdown::builder()
        .add_handler(
            INLINE_TAGS.to_vec(),
            |handlers: &dyn Handlers, element: Element| {
                Some(handlers.walk_children(element.node).content.into())
            },
        )
        .add_handler(
            BLOCK_TAGS.to_vec(),
            |handlers: &dyn Handlers, element: Element| {
                let content = handlers.walk_children(element.node).content;
                Some(format!("\n{}\n", content.trim()).into())
            },
        )
        .add_handler(vec!["br", "hr"], |_: &dyn Handlers, _: Element| {
            Some("\n".to_string().into())
        })
        .add_handler(
            vec!["img", "script", "style", "head"],
            |_: &dyn Handlers, _: Element| Some(String::new().into()),
        )
        .build()
}

/// Drops the backslashes the converter puts before markdown punctuation.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek().is_some_and(char::is_ascii_punctuation) {
            continue;
        }
        out.push(c);
    }
    out
}

/// Text of a note body. HTML bodies are reduced to their text nodes;
/// anything else is returned as is.
pub fn plain_text(content: &str) -> String {
    if !content.trim_start().starts_with('<') {
        return content.to_string();
    }

    match text_converter().convert(content) {
        Ok(text) => unescape(&text),
        Err(e) => {
            tracing::debug!("html conversion failed, using raw content: {e}");
            content.to_string()
        }
    }
}
