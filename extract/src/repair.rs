//! Best-effort syntactic repair of near-JSON model output.
//!
//! Every step is a single pass over the text driven by a small lexer that
//! tracks whether the cursor is inside a double-quoted string and whether the
//! previous byte was an escape. All structural bytes are ASCII, so byte
//! offsets found by the lexer are always valid `str` slice boundaries.
//!
//! Steps, in order:
//! 1. Extract the payload from code fences and surrounding prose.
//! 2. Turn single-quoted strings into double-quoted ones.
//! 3. Quote bare object keys.
//! 4. Drop repeated top-level keys for list-valued fields.
//! 5. Close truncated output.
//! 6. Remove trailing commas.
//! 7. Insert commas missing between adjacent values.
//!
//! Steps 2 and 3 run before the scanner-driven steps because the scanner only
//! understands double quotes.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Top-level list fields the model is known to repeat.
pub const DUPLICATE_PRONE_KEYS: &[&str] = &[
    "issues",
    "strengths",
    "priorityActions",
    "rewrites",
    "segments",
    "cutSuggestions",
    "dropOffRisks",
    "callsToAction",
];

static CODE_FENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)(?:```|\z)").ok());

/// Repairs `text` so that it is more likely to parse as JSON. Never fails.
#[must_use]
pub fn repair(text: &str) -> String {
    repair_with_keys(text, DUPLICATE_PRONE_KEYS)
}

/// [`repair`] with an explicit set of keys whose repeats are collapsed.
#[must_use]
pub fn repair_with_keys(text: &str, duplicate_keys: &[&str]) -> String {
    let mut current = extract_payload(text);
    if current.len() != text.len() {
        log_step("extract_payload");
    }

    let steps: [(&str, &dyn Fn(&str) -> String); 6] = [
        ("single_quotes", &normalize_single_quotes),
        ("unquoted_keys", &quote_unquoted_keys),
        ("duplicate_keys", &|t: &str| collapse_duplicate_keys(t, duplicate_keys)),
        ("truncation", &close_truncated),
        ("trailing_commas", &strip_trailing_commas),
        ("missing_commas", &insert_missing_commas),
    ];
    for (name, step) in steps {
        let next = step(&current);
        if next != current {
            log_step(name);
            current = next;
        }
    }
    current
}

fn log_step(step: &str) {
    tracing::debug!(event = "repair_applied", step, "repair_applied");
}

// ---------------------------------------------------------------------------
// Lexer

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lex {
    /// Byte outside any string.
    Code,
    /// Opening quote.
    Open,
    /// Byte inside a string, escapes included.
    Body,
    /// Closing quote.
    Close,
}

#[derive(Debug, Default, Clone, Copy)]
struct Lexer {
    in_string: bool,
    escaped: bool,
}

impl Lexer {
    const fn step(&mut self, byte: u8) -> Lex {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
                Lex::Body
            } else if byte == b'\\' {
                self.escaped = true;
                Lex::Body
            } else if byte == b'"' {
                self.in_string = false;
                Lex::Close
            } else {
                Lex::Body
            }
        } else if byte == b'"' {
            self.in_string = true;
            Lex::Open
        } else {
            Lex::Code
        }
    }
}

/// Nesting state at the end of a scanned prefix.
#[derive(Debug, Default)]
struct Scan {
    /// Open containers, innermost last.
    stack: Vec<u8>,
    /// Start of an unterminated string.
    open_string: Option<usize>,
    /// Start of the last string that was opened.
    last_string: Option<usize>,
}

fn scan(text: &str) -> Scan {
    let mut lexer = Lexer::default();
    let mut out = Scan::default();
    for (i, &b) in text.as_bytes().iter().enumerate() {
        match lexer.step(b) {
            Lex::Open => {
                out.open_string = Some(i);
                out.last_string = Some(i);
            }
            Lex::Close => out.open_string = None,
            Lex::Code => match b {
                b'{' | b'[' => out.stack.push(b),
                b'}' | b']' => {
                    let opener = if b == b'}' { b'{' } else { b'[' };
                    if let Some(pos) = out.stack.iter().rposition(|&o| o == opener) {
                        out.stack.truncate(pos);
                    }
                }
                _ => {}
            },
            Lex::Body => {}
        }
    }
    out
}

/// Index of the quote closing the string that opens at `start`.
fn string_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut lexer = Lexer::default();
    lexer.step(bytes[start]);
    bytes[start + 1..]
        .iter()
        .position(|&b| lexer.step(b) == Lex::Close)
        .map(|offset| start + 1 + offset)
}

/// One past the end of the JSON value starting at `start`, or `len` if the
/// value runs off the end of the text.
fn value_end(bytes: &[u8], start: usize) -> usize {
    let Some(&first) = bytes.get(start) else {
        return bytes.len();
    };
    match first {
        b'"' => string_end(bytes, start).map_or(bytes.len(), |end| end + 1),
        b'{' | b'[' => {
            let mut lexer = Lexer::default();
            let mut depth = 0usize;
            for (i, &b) in bytes.iter().enumerate().skip(start) {
                if lexer.step(b) != Lex::Code {
                    continue;
                }
                match b {
                    b'{' | b'[' => depth += 1,
                    b'}' | b']' => {
                        depth = depth.saturating_sub(1);
                        if depth == 0 {
                            return i + 1;
                        }
                    }
                    _ => {}
                }
            }
            bytes.len()
        }
        _ => bytes[start..]
            .iter()
            .position(|b| matches!(b, b',' | b'}' | b']'))
            .map_or(bytes.len(), |offset| start + offset),
    }
}

fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Applies non-overlapping, sorted `(start, end, replacement)` edits.
fn apply_edits(text: &str, edits: &[(usize, usize, &str)]) -> String {
    let mut out = String::with_capacity(text.len() + edits.len());
    let mut cursor = 0;
    for &(start, end, replacement) in edits {
        if start < cursor {
            continue;
        }
        out.push_str(&text[cursor..start]);
        out.push_str(replacement);
        cursor = end;
    }
    out.push_str(&text[cursor.min(text.len())..]);
    out
}

// ---------------------------------------------------------------------------
// Step 1: payload extraction

fn extract_payload(text: &str) -> String {
    let fenced = CODE_FENCE
        .as_ref()
        .and_then(|re| {
            re.captures_iter(text)
                .filter_map(|caps| caps.get(1))
                .map(|m| m.as_str())
                .find(|body| body.contains('{') || body.contains('['))
        })
        .unwrap_or(text);

    let bytes = fenced.as_bytes();
    let Some(start) = (0..bytes.len()).find(|&i| opens_value(bytes, i)) else {
        return fenced.trim().to_string();
    };
    let end = value_end(bytes, start);
    fenced[start..end].trim_end().to_string()
}

fn opens_value(bytes: &[u8], i: usize) -> bool {
    let next = bytes.get(skip_ws(bytes, i + 1)).copied();
    match bytes[i] {
        b'{' => next.is_none_or(|b| {
            matches!(b, b'"' | b'\'' | b'}') || b.is_ascii_alphabetic() || b == b'_'
        }),
        b'[' => next.is_none_or(|b| {
            matches!(b, b'{' | b'[' | b'"' | b'\'' | b']' | b'-' | b't' | b'f' | b'n')
                || b.is_ascii_digit()
        }),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Step 2: single quotes

fn normalize_single_quotes(text: &str) -> String {
    if !text.contains('\'') {
        return text.to_string();
    }
    #[derive(PartialEq)]
    enum State {
        Outside,
        Double,
        Single,
    }
    let mut state = State::Outside;
    let mut escaped = false;
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match state {
            State::Outside => {
                match c {
                    '"' => state = State::Double,
                    '\'' => {
                        state = State::Single;
                        out.push('"');
                        continue;
                    }
                    _ => {}
                }
                out.push(c);
            }
            State::Double => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    state = State::Outside;
                }
                out.push(c);
            }
            State::Single => {
                if escaped {
                    escaped = false;
                    // `\'` needs no escape once the delimiter is `"`.
                    if c == '\'' {
                        out.pop();
                    }
                    out.push(c);
                } else if c == '\\' {
                    escaped = true;
                    out.push(c);
                } else if c == '\'' {
                    state = State::Outside;
                    out.push('"');
                } else if c == '"' {
                    out.push_str("\\\"");
                } else {
                    out.push(c);
                }
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Step 3: bare keys

fn quote_unquoted_keys(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut lexer = Lexer::default();
    let mut edits: Vec<(usize, usize, String)> = Vec::new();
    let mut last_code: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let lex = lexer.step(b);
        if lex != Lex::Code {
            if lex == Lex::Close {
                last_code = Some(b'"');
            }
            i += 1;
            continue;
        }
        if (b.is_ascii_alphabetic() || b == b'_' || b == b'$')
            && matches!(last_code, Some(b'{' | b','))
        {
            let end = bytes[i..]
                .iter()
                .position(|&c| !(c.is_ascii_alphanumeric() || matches!(c, b'_' | b'$' | b'-')))
                .map_or(bytes.len(), |offset| i + offset);
            if bytes.get(skip_ws(bytes, end)) == Some(&b':') {
                edits.push((i, end, format!("\"{}\"", &text[i..end])));
            }
            last_code = Some(bytes[end - 1]);
            i = end;
            continue;
        }
        if !b.is_ascii_whitespace() {
            last_code = Some(b);
        }
        i += 1;
    }
    let edits: Vec<(usize, usize, &str)> =
        edits.iter().map(|(s, e, r)| (*s, *e, r.as_str())).collect();
    apply_edits(text, &edits)
}

// ---------------------------------------------------------------------------
// Step 4: stuttered keys

fn collapse_duplicate_keys(text: &str, keys: &[&str]) -> String {
    let bytes = text.as_bytes();
    let watched: HashSet<&str> = keys.iter().copied().collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut edits: Vec<(usize, usize, &str)> = Vec::new();
    let mut stack: Vec<u8> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                let Some(close) = string_end(bytes, i) else {
                    break;
                };
                let colon = skip_ws(bytes, close + 1);
                let is_top_level_key = stack.as_slice() == [b'{'] && bytes.get(colon) == Some(&b':');
                if !is_top_level_key {
                    i = close + 1;
                    continue;
                }
                let key = &text[i + 1..close];
                let value_start = skip_ws(bytes, colon + 1);
                let end = value_end(bytes, value_start);
                if watched.contains(key) && !seen.insert(key) {
                    let before = text[..i].trim_end();
                    let start = if before.ends_with(',') {
                        before.len() - 1
                    } else {
                        i
                    };
                    edits.push((start, end, ""));
                }
                i = end;
            }
            b'{' | b'[' => {
                stack.push(bytes[i]);
                i += 1;
            }
            b'}' | b']' => {
                stack.pop();
                i += 1;
            }
            _ => i += 1,
        }
    }
    apply_edits(text, &edits)
}

// ---------------------------------------------------------------------------
// Step 5: truncation

fn close_truncated(text: &str) -> String {
    let state = scan(text);
    if state.stack.is_empty() && state.open_string.is_none() {
        return text.to_string();
    }

    let mut s = text.to_string();
    if let Some(start) = state.open_string {
        s.truncate(start);
    }

    loop {
        let trimmed = s.trim_end().len();
        s.truncate(trimmed);
        let Some(&last) = s.as_bytes().last() else {
            break;
        };
        match last {
            b',' => {
                s.pop();
            }
            b':' => {
                s.pop();
                let trimmed = s.trim_end().len();
                s.truncate(trimmed);
                if s.ends_with('"') {
                    if let Some(start) = scan(&s).last_string {
                        s.truncate(start);
                    }
                }
            }
            b'"' => {
                let Some(start) = scan(&s).last_string else {
                    break;
                };
                if is_dangling_key(&s, start) {
                    s.truncate(start);
                } else {
                    break;
                }
            }
            b if is_scalar_byte(b) => {
                let token_start = s
                    .bytes()
                    .rposition(|c| !is_scalar_byte(c))
                    .map_or(0, |p| p + 1);
                let complete = is_complete_scalar(&s[token_start..]);
                if complete && !is_dangling_key(&s, token_start) {
                    break;
                }
                s.truncate(token_start);
            }
            _ => break,
        }
    }

    for opener in scan(&s).stack.iter().rev() {
        s.push(if *opener == b'{' { '}' } else { ']' });
    }
    s
}

/// Whether the token at `start` sits where an object key belongs.
fn is_dangling_key(s: &str, start: usize) -> bool {
    let before = s[..start].trim_end();
    let in_object = scan(before).stack.last() == Some(&b'{');
    in_object && (before.ends_with('{') || before.ends_with(','))
}

const fn is_scalar_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'+')
}

fn is_complete_scalar(token: &str) -> bool {
    match token {
        "true" | "false" | "null" => true,
        _ => {
            let starts_numeric = token
                .bytes()
                .next()
                .is_some_and(|b| b.is_ascii_digit() || b == b'-');
            let ends_digit = token.bytes().last().is_some_and(|b| b.is_ascii_digit());
            starts_numeric && ends_digit && token.parse::<f64>().is_ok()
        }
    }
}

// ---------------------------------------------------------------------------
// Step 6: trailing commas

fn strip_trailing_commas(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut lexer = Lexer::default();
    let mut edits = Vec::new();
    for (i, &b) in bytes.iter().enumerate() {
        if lexer.step(b) == Lex::Code
            && b == b','
            && matches!(bytes.get(skip_ws(bytes, i + 1)), Some(b'}' | b']'))
        {
            edits.push((i, i + 1, ""));
        }
    }
    apply_edits(text, &edits)
}

// ---------------------------------------------------------------------------
// Step 7: missing commas

fn insert_missing_commas(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut lexer = Lexer::default();
    let mut edits = Vec::new();
    for (i, &b) in bytes.iter().enumerate() {
        let lex = lexer.step(b);
        let next = bytes.get(skip_ws(bytes, i + 1)).copied();
        let needs_comma = match lex {
            Lex::Code if matches!(b, b'}' | b']') => matches!(next, Some(b'{' | b'[' | b'"')),
            Lex::Close => matches!(next, Some(b'"' | b'{' | b'[')),
            Lex::Code if b.is_ascii_alphanumeric() => {
                bytes.get(i + 1).is_some_and(u8::is_ascii_whitespace) && next == Some(b'"')
            }
            _ => false,
        };
        if needs_comma {
            edits.push((i + 1, i + 1, ","));
        }
    }
    apply_edits(text, &edits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn parses(text: &str) -> Value {
        let repaired = repair(text);
        serde_json::from_str(&repaired)
            .unwrap_or_else(|e| panic!("repair of {text:?} gave {repaired:?}: {e}"))
    }

    #[test]
    fn test_valid_json_is_untouched() {
        let text = r#"{"a": [1, 2, {"b": "it's \"quoted\""}], "c": null}"#;
        assert_eq!(repair(text), text);
    }

    #[test]
    fn test_truncated_closes_array_then_object() {
        let repaired = repair(r#"{"issues": [{"id": "a"}"#);
        assert!(repaired.ends_with("}]}"), "{repaired}");
        assert_eq!(parses(r#"{"issues": [{"id": "a"}"#), json!({"issues": [{"id": "a"}]}));
    }

    #[test]
    fn test_truncated_mid_string_value() {
        let v = parses(r#"{"summary": "ok", "issues": [{"id": "a", "description": "The intro dra"#);
        assert_eq!(v, json!({"summary": "ok", "issues": [{"id": "a"}]}));
    }

    #[test]
    fn test_truncated_mid_key_and_after_colon() {
        assert_eq!(parses(r#"{"score": 0.5, "summ"#), json!({"score": 0.5}));
        assert_eq!(parses(r#"{"score": 0.5, "summary":"#), json!({"score": 0.5}));
        assert_eq!(parses(r#"{"a": [1, 2,"#), json!({"a": [1, 2]}));
    }

    #[test]
    fn test_truncated_partial_literal() {
        assert_eq!(parses(r#"{"a": 1, "b": tr"#), json!({"a": 1}));
        assert_eq!(parses(r#"{"a": 1, "b": 0."#), json!({"a": 1}));
        assert_eq!(parses(r#"{"a": [true, 12"#), json!({"a": [true, 12]}));
    }

    #[test]
    fn test_duplicate_issues_key_collapsed() {
        let v = parses(r#"{"issues": [{"id": "1"}], "score": 0.4, "issues": [{"id": "2"}]}"#);
        assert_eq!(v, json!({"issues": [{"id": "1"}], "score": 0.4}));
    }

    #[test]
    fn test_duplicate_truncated_repeat_is_dropped() {
        let v = parses(r#"{"issues": [{"id": "1"}], "issues": [{"id": "2", "desc"#);
        assert_eq!(v, json!({"issues": [{"id": "1"}]}));
    }

    #[test]
    fn test_nested_duplicates_are_left_alone() {
        let text = r#"{"a": {"issues": 1, "issues": 2}}"#;
        assert_eq!(collapse_duplicate_keys(text, DUPLICATE_PRONE_KEYS), text);
    }

    #[test]
    fn test_single_quotes() {
        assert_eq!(
            parses("{'summary': 'say \"hi\"', 'strengths': ['a', 'b']}"),
            json!({"summary": "say \"hi\"", "strengths": ["a", "b"]})
        );
    }

    #[test]
    fn test_apostrophes_inside_double_quotes_survive() {
        assert_eq!(parses(r#"{"s": "don't stop"}"#), json!({"s": "don't stop"}));
    }

    #[test]
    fn test_trailing_commas() {
        assert_eq!(parses(r#"{"a": [1, 2,], "b": {"c": 1,},}"#), json!({"a": [1, 2], "b": {"c": 1}}));
    }

    #[test]
    fn test_unquoted_keys() {
        assert_eq!(
            parses(r#"{score: 0.5, priorityActions: ["x"], nested: {ok: true}}"#),
            json!({"score": 0.5, "priorityActions": ["x"], "nested": {"ok": true}})
        );
    }

    #[test]
    fn test_missing_commas_between_values() {
        assert_eq!(
            parses(r#"{"issues": [{"id": "1"} {"id": "2"}] "score": 0.5}"#),
            json!({"issues": [{"id": "1"}, {"id": "2"}], "score": 0.5})
        );
        assert_eq!(
            parses("{\"a\": \"x\"\n\"b\": 2\n\"c\": 3}"),
            json!({"a": "x", "b": 2, "c": 3})
        );
    }

    #[test]
    fn test_code_fence_and_prose_removed() {
        let text = "Here is the analysis:\n```json\n{\"score\": 0.9}\n```\nHope this helps!";
        assert_eq!(repair(text), r#"{"score": 0.9}"#);
        assert_eq!(repair("Sure! {\"a\": 1} Let me know."), r#"{"a": 1}"#);
    }

    #[test]
    fn test_unterminated_fence() {
        assert_eq!(parses("```json\n{\"a\": [1, 2"), json!({"a": [1, 2]}));
    }

    #[test]
    fn test_arbitrary_text_does_not_panic() {
        for text in ["", "   ", "no json here", "{", "[", "\"", "}{", "{\"a\\", "'''", "```"] {
            let _ = repair(text);
        }
    }
}
