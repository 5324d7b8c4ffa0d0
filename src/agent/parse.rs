//! Pulling an [`AgentSummary`] out of raw agent output.
//!
//! Agents print free-form text, streaming JSON events, or a single JSON
//! envelope. The summary may sit in a fenced ```json block, be the whole
//! output, be embedded in prose, or be the `result` text of a Claude
//! envelope. The last summary found wins.

use super::AgentSummary;
use crate::error::{Error, Result};
use serde_json::Value;

/// Extract the first JSON object from `text`.
///
/// Handles fenced code blocks (with or without a `json` tag), output that
/// is entirely one object, and objects embedded in prose via brace
/// matching. Returns `None` when there is no object.
pub fn extract_json(text: &str) -> Option<&str> {
    let s = text.trim();

    if s.starts_with("```") {
        let start = s.find('{')?;
        let end = s.rfind('}')?;
        return (end > start).then(|| &s[start..=end]);
    }

    if s.starts_with('{') && s.ends_with('}') {
        return Some(s);
    }

    let start = s.find('{')?;
    let mut depth = 0usize;
    for (i, b) in s.bytes().enumerate().skip(start) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&s[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse the agent's summary from its complete stdout.
///
/// # Errors
/// Returns [`Error::SummaryMissing`] when nothing in the output parses as a
/// summary.
pub fn parse_summary(output: &str) -> Result<AgentSummary> {
    let mut last = None;
    for line in output.lines() {
        if let Some(summary) = summary_from_text(line) {
            last = Some(summary);
        }
    }
    // Multi-line blocks (fences, pretty-printed objects) only parse whole.
    last.or_else(|| summary_from_text(output))
        .ok_or(Error::SummaryMissing)
}

fn summary_from_text(text: &str) -> Option<AgentSummary> {
    let json = extract_json(text)?;
    let value: Value = serde_json::from_str(json).ok()?;
    summary_from_value(value)
}

fn summary_from_value(value: Value) -> Option<AgentSummary> {
    // Claude envelope: {"type":"result","result":"...text with summary..."}
    if let Some(Value::String(inner)) = value.get("result") {
        if let Some(summary) = summary_from_text(inner) {
            return Some(summary);
        }
    }
    if value.get("status").is_none() {
        return None;
    }
    serde_json::from_value(value).ok()
}
