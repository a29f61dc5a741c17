//! JSON extraction from free-form model output.
//!
//! Models wrap JSON in prose or code fences, or return a bare object when
//! asked for an array. Each strategy below is tried in order and returns
//! `None` when it does not apply; the first value of the wanted shape wins.

use regex_lite::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// A single extraction attempt.
pub type Strategy = fn(&str) -> Option<Value>;

/// Extraction strategies, in the order they are tried.
pub const STRATEGIES: &[(&str, Strategy)] = &[
    ("direct", direct),
    ("fenced_block", fenced_block),
    ("object_span", object_span),
    ("array_span", array_span),
    ("stripped_fences", stripped_fences),
];

static FENCED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:[A-Za-z]+)?\s*(.*?)\s*```").expect("fenced block pattern is valid")
});

fn direct(text: &str) -> Option<Value> {
    serde_json::from_str(text.trim()).ok()
}

fn fenced_block(text: &str) -> Option<Value> {
    FENCED
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .find_map(|m| serde_json::from_str(m.as_str()).ok())
}

fn span(text: &str, open: char, close: char) -> Option<Value> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn object_span(text: &str) -> Option<Value> {
    span(text, '{', '}')
}

fn array_span(text: &str) -> Option<Value> {
    span(text, '[', ']')
}

fn stripped_fences(text: &str) -> Option<Value> {
    let stripped = text.replace("```json", "").replace("```JSON", "").replace("```", "");
    serde_json::from_str(stripped.trim()).ok()
}

fn first_matching<T>(text: &str, pick: impl Fn(Value) -> Option<T>) -> Option<T> {
    STRATEGIES
        .iter()
        .find_map(|(_, strategy)| strategy(text).and_then(&pick))
}

/// The first JSON value any strategy can extract.
pub fn parse_value(text: &str) -> Option<Value> {
    first_matching(text, Some)
}

/// The first JSON object any strategy can extract.
pub fn parse_object(text: &str) -> Option<Map<String, Value>> {
    first_matching(text, |v| match v {
        Value::Object(map) => Some(map),
        _ => None,
    })
}

/// The first JSON array any strategy can extract.
pub fn parse_array(text: &str) -> Option<Vec<Value>> {
    first_matching(text, |v| match v {
        Value::Array(items) => Some(items),
        _ => None,
    })
}
