//! Bracket-scanning: recover a JSON object from free-form model text.
//!
//! Vision and chat models routinely wrap the JSON they were asked for in
//! prose ("Here is the data: …") or markdown fences. Rather than demand a
//! strict structured-output mode from every provider, both model calls in
//! the pipeline use the same contract:
//!
//! > take the substring from the **first** `{` to the **last** `}`
//! > (inclusive) and parse it as JSON; if no such span exists, fail.
//!
//! The contract is intentionally dumb. It tolerates any prefix or suffix,
//! including markdown fences, and it is idempotent: running it on text that
//! is already exactly one JSON object returns that object unchanged.

use crate::error::JsonParseError;
use serde_json::Value;

/// Number of leading characters kept in [`JsonParseError::NoJsonFound`].
const PREVIEW_CHARS: usize = 80;

/// Locate the `{ … }` span in `text`, first `{` to last `}` inclusive.
///
/// Returns `None` when either bracket is missing or the last `}` comes
/// before the first `{`.
pub fn locate_json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if start < end {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Recover and parse the JSON object embedded in a model reply.
///
/// # Errors
/// - [`JsonParseError::NoJsonFound`] if [`locate_json_span`] finds nothing
/// - [`JsonParseError::InvalidJson`] if the span does not parse
pub fn extract_json_object(text: &str) -> Result<Value, JsonParseError> {
    let span = locate_json_span(text).ok_or_else(|| JsonParseError::NoJsonFound {
        preview: text.chars().take(PREVIEW_CHARS).collect(),
    })?;
    Ok(serde_json::from_str(span)?)
}
