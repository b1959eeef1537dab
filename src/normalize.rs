//! Input normalization for the intent matcher.

use once_cell::sync::Lazy;
use regex::Regex;

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Normalize raw visitor input for keyword matching: lowercase, drop
/// everything that is not a word character or whitespace, collapse
/// whitespace runs and trim. Total and idempotent.
pub fn normalize(input: &str) -> String {
    let lowered = input.to_lowercase();
    let stripped = NON_WORD.replace_all(&lowered, "");
    WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}
