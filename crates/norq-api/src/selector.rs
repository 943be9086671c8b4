//! Parsing of the `/{queue}/{selector}` path segment.
//!
//! Window selectors take precedence over document ids:
//! - `start..end` selects an inclusive range; negative positions count from the end
//! - `+n` selects the first `n` documents
//! - `-n` selects the last `n` documents, newest first
//!
//! Anything else is a document id.

use regex::Regex;
use std::sync::OnceLock;

#[cfg(test)]
#[path = "selector_tests.rs"]
mod tests;

/// What a `GET /{queue}/{selector}` request addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Range { start: i64, end: i64 },
    Head(u64),
    Tail(u64),
    Id(String),
}

fn range_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(-?\d+)\.\.(-?\d+)$").ok())
        .as_ref()
}

fn count_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([+-])(\d+)$").ok()).as_ref()
}

impl Selector {
    pub fn parse(segment: &str) -> Self {
        if let Some(captures) = range_pattern().and_then(|re| re.captures(segment)) {
            if let (Ok(start), Ok(end)) = (captures[1].parse(), captures[2].parse()) {
                return Self::Range { start, end };
            }
        }

        if let Some(captures) = count_pattern().and_then(|re| re.captures(segment)) {
            if let Ok(count) = captures[2].parse() {
                return match &captures[1] {
                    "+" => Self::Head(count),
                    _ => Self::Tail(count),
                };
            }
        }

        Self::Id(segment.to_string())
    }
}
