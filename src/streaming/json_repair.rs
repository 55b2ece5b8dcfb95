//! Truncated JSON repair
//!
//! Tool-call arguments are streamed as text fragments. When a stream stops
//! early (length limit, cancellation) the accumulated text is a prefix of a
//! JSON document. [`repair_json`] closes that prefix into the nearest valid
//! document.
//!
//! # Fast Path
//!
//! Valid JSON is parsed directly with `serde_json::from_str`. Only when that
//! fails does the repair scan run.
//!
//! # Examples
//!
//! ```rust,ignore
//! use siumai_engine::streaming::json_repair::repair_json;
//!
//! let value = repair_json(r#"{"a": "unterm"#).unwrap();
//! assert_eq!(value, serde_json::json!({"a": "unterm"}));
//! ```

use serde_json::{Map, Value};

/// A complete string literal in the scanned text.
#[derive(Debug, Clone, Copy)]
struct StringSpan {
    start: usize,
    end: usize,
    is_key: bool,
}

/// Where the scan stopped.
#[derive(Debug, Default)]
struct ScanState {
    containers: Vec<u8>,
    strings: Vec<StringSpan>,
    /// Start of the unterminated string and whether it is an object key.
    open_string: Option<(usize, bool)>,
    /// Start of an incomplete escape sequence inside the open string.
    open_escape: Option<usize>,
}

fn scan(text: &str) -> ScanState {
    let bytes = text.as_bytes();
    let mut state = ScanState::default();
    let mut last_significant: Option<u8> = None;
    let mut escape_start: Option<usize> = None;
    let mut unicode_left = 0u8;

    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some((start, is_key)) = state.open_string {
            if unicode_left > 0 {
                if b.is_ascii_hexdigit() {
                    unicode_left -= 1;
                    if unicode_left == 0 {
                        escape_start = None;
                    }
                } else {
                    // Malformed escape, leave it for the parser to reject.
                    unicode_left = 0;
                    escape_start = None;
                }
            } else if escape_start.is_some() {
                if b == b'u' {
                    unicode_left = 4;
                } else {
                    escape_start = None;
                }
            } else if b == b'\\' {
                escape_start = Some(i);
            } else if b == b'"' {
                state.strings.push(StringSpan {
                    start,
                    end: i + 1,
                    is_key,
                });
                state.open_string = None;
                last_significant = Some(b'"');
            }
            i += 1;
            continue;
        }

        match b {
            b'"' => {
                let is_key = state.containers.last() == Some(&b'{')
                    && matches!(last_significant, Some(b'{') | Some(b','));
                state.open_string = Some((i, is_key));
            }
            b'{' | b'[' => state.containers.push(b),
            b'}' | b']' => {
                state.containers.pop();
            }
            _ => {}
        }
        if !b.is_ascii_whitespace() {
            last_significant = Some(b);
        }
        i += 1;
    }

    if state.open_string.is_some() {
        state.open_escape = escape_start;
    }
    state
}

/// Complete a truncated `true`/`false`/`null`, or trim a dangling number
/// fragment. Returns whether `out` changed.
fn fix_trailing_scalar(out: &mut String) -> bool {
    let token_len = out
        .bytes()
        .rev()
        .take_while(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'+'))
        .count();
    if token_len == 0 {
        return false;
    }
    let token_start = out.len() - token_len;
    let token = &out[token_start..];

    if token.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        let kept = token
            .trim_end_matches(|c: char| matches!(c, '.' | '-' | '+' | 'e' | 'E'))
            .len();
        if kept == token_len {
            return false;
        }
        out.truncate(token_start + kept);
        return true;
    }

    for literal in ["true", "false", "null"] {
        if token.len() < literal.len() && literal.starts_with(token) {
            let rest = &literal[token.len()..];
            out.push_str(rest);
            return true;
        }
    }
    false
}

/// Strip trailing separators and unvalued keys until nothing changes.
fn strip_dangling(out: &mut String, strings: &mut Vec<StringSpan>) {
    loop {
        let trimmed = out.trim_end().len();
        out.truncate(trimmed);

        if out.ends_with(',') || out.ends_with(':') {
            out.pop();
            continue;
        }
        if let Some(span) = strings.last().copied()
            && span.end == out.len()
        {
            strings.pop();
            if span.is_key {
                out.truncate(span.start);
                continue;
            }
            // A value string; nothing further to strip.
            return;
        }
        if fix_trailing_scalar(out) {
            continue;
        }
        return;
    }
}

fn close_truncated(text: &str) -> String {
    let mut state = scan(text);
    let mut out = text.to_string();

    if let Some((start, is_key)) = state.open_string {
        if let Some(escape) = state.open_escape {
            out.truncate(escape);
        }
        if is_key {
            out.truncate(start);
        } else {
            out.push('"');
            state.strings.push(StringSpan {
                start,
                end: out.len(),
                is_key: false,
            });
        }
    }

    strip_dangling(&mut out, &mut state.strings);

    for container in state.containers.iter().rev() {
        out.push(if *container == b'{' { '}' } else { ']' });
    }
    out
}

/// Parse `text` as JSON, closing it first if it was cut short.
///
/// Returns `None` for empty or whitespace-only input. A prefix that cannot be
/// salvaged yields an empty object rather than an error.
pub fn repair_json(text: &str) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }

    let repaired = close_truncated(text);
    match serde_json::from_str(&repaired) {
        Ok(value) => {
            tracing::debug!(original = text, repaired = %repaired, "JSON repaired");
            Some(value)
        }
        Err(error) => {
            tracing::debug!(original = text, %error, "JSON repair failed, using empty object");
            Some(Value::Object(Map::new()))
        }
    }
}
