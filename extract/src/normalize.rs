//! Semantic reshaping of parsed model output toward a category schema.
//!
//! Three passes, always in this order:
//! 1. [`normalize`] fixes shapes and vocabulary anywhere in the tree.
//! 2. [`enforce_limits`] truncates list fields to their caps.
//! 3. [`fill_defaults`] supplies every required field that is still absent.
//!
//! All three are total over arbitrary JSON and idempotent.

use crate::category::{canonical_category, canonical_issue_type, canonical_severity, Category};
use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::LazyLock;

/// Maximum issues per report.
pub const MAX_ISSUES: usize = 10;
/// Maximum strengths per report.
pub const MAX_STRENGTHS: usize = 5;
/// Maximum priority actions per report.
pub const MAX_PRIORITY_ACTIONS: usize = 3;
/// Neutral value for an absent score.
pub const DEFAULT_SCORE: f64 = 0.5;

/// Fields holding lists of objects.
const OBJECT_LIST_FIELDS: &[&str] = &[
    "issues",
    "rewrites",
    "segments",
    "cutSuggestions",
    "dropOffRisks",
    "callsToAction",
];

/// Fields holding lists of plain strings.
const STRING_LIST_FIELDS: &[&str] = &["strengths", "priorityActions"];

/// Category-specific fields holding a single object.
const OBJECT_FIELDS: &[&str] = &["hookAnalysis", "audioMix", "qualityChecks"];

/// Unit-interval numbers the model sometimes reports as percentages.
const UNIT_FIELDS: &[&str] = &["score", "effectiveness", "voiceClarity", "musicBalance"];

/// Key names that mark a list as flattened `key, value, key, value, ...`.
const FLAT_KEYS: &[&str] = &[
    "id",
    "type",
    "severity",
    "category",
    "timestamp",
    "start",
    "end",
    "description",
    "suggestion",
    "original",
    "suggested",
    "pace",
    "note",
    "action",
    "reason",
    "text",
    "placement",
];

static BULLET: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?:(?:[-*•]|\d+[.)])\s+)+").ok());

/// Which shape fixes [`Normalizer`] applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct NormalizeOptions {
    /// Parse string elements of object lists as JSON objects.
    pub decode_string_elements: bool,
    /// Rebuild objects from flattened key/value lists.
    pub rebuild_flattened: bool,
    /// Map `severity`, `category` and `type` through the synonym tables.
    pub canonicalize_enums: bool,
    /// Split newline-separated strings into string lists.
    pub split_string_lists: bool,
    /// Replace or re-parse single-object fields that arrive with the wrong type.
    pub fix_containers: bool,
    /// Rescale percentage-style unit values, coerce timestamps and stringify numeric ids.
    pub coerce_numbers: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            decode_string_elements: true,
            rebuild_flattened: true,
            canonicalize_enums: true,
            split_string_lists: true,
            fix_containers: true,
            coerce_numbers: true,
        }
    }
}

/// Applies the shape pass with a chosen set of fixes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    options: NormalizeOptions,
}

/// [`Normalizer::normalize`] with every fix enabled.
#[must_use]
pub fn normalize(doc: Value) -> Value {
    Normalizer::default().normalize(doc)
}

impl Normalizer {
    /// Normalizer with the given options.
    #[must_use]
    pub const fn new(options: NormalizeOptions) -> Self {
        Self { options }
    }

    /// Rewrites `doc` toward the report shape. Pure and recursive.
    #[must_use]
    pub fn normalize(&self, doc: Value) -> Value {
        match doc {
            Value::Object(map) => Value::Object(self.object(map)),
            Value::Array(items) => Value::Array(items.into_iter().map(|v| self.normalize(v)).collect()),
            other => other,
        }
    }

    fn object(&self, map: Map<String, Value>) -> Map<String, Value> {
        map.into_iter()
            .map(|(key, value)| {
                let value = self.field(&key, value);
                (key, value)
            })
            .collect()
    }

    fn field(&self, key: &str, value: Value) -> Value {
        let o = &self.options;
        match key {
            k if OBJECT_LIST_FIELDS.contains(&k) => self.object_list(value),
            k if STRING_LIST_FIELDS.contains(&k) && o.split_string_lists => string_list(value),
            k if OBJECT_FIELDS.contains(&k) && o.fix_containers => self.object_field(k, value),
            k if UNIT_FIELDS.contains(&k) && o.coerce_numbers => unit_value(value),
            "timestamp" if o.coerce_numbers || o.fix_containers => timestamp(value),
            "id" if o.coerce_numbers => match value {
                Value::Number(n) => Value::String(n.to_string()),
                other => self.normalize(other),
            },
            "severity" if o.canonicalize_enums => self.enum_value(value, canonical_severity),
            "category" if o.canonicalize_enums => self.enum_value(value, canonical_category),
            "type" if o.canonicalize_enums => self.enum_value(value, canonical_issue_type),
            _ => self.normalize(value),
        }
    }

    fn enum_value(&self, value: Value, canonical: fn(&str) -> Option<&'static str>) -> Value {
        match value {
            // Unknown values pass through for the validator to report.
            Value::String(s) => canonical(&s).map_or(Value::String(s), |c| Value::String(c.to_string())),
            other => self.normalize(other),
        }
    }

    fn object_list(&self, value: Value) -> Value {
        let items = match value {
            Value::Array(items) => items,
            Value::Object(map) => vec![Value::Object(map)],
            Value::String(s) if self.options.decode_string_elements => {
                match serde_json::from_str::<Value>(&s) {
                    Ok(Value::Array(items)) => items,
                    Ok(Value::Object(map)) => vec![Value::Object(map)],
                    _ => Vec::new(),
                }
            }
            Value::Null => return Value::Null,
            _ => Vec::new(),
        };

        let objects = if self.options.rebuild_flattened && is_flattened(&items) {
            rebuild_flattened(items)
        } else {
            items
                .into_iter()
                .filter_map(|item| self.as_object(item))
                .collect()
        };

        Value::Array(
            objects
                .into_iter()
                .map(|map| Value::Object(self.object(map)))
                .collect(),
        )
    }

    // Non-objects, nulls and the `-1` sentinel are dropped.
    fn as_object(&self, item: Value) -> Option<Map<String, Value>> {
        match item {
            Value::Object(map) => Some(map),
            Value::String(s) if self.options.decode_string_elements => {
                match serde_json::from_str::<Value>(&s) {
                    Ok(Value::Object(map)) => Some(map),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn object_field(&self, key: &str, value: Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(self.object(map)),
            // Element order in these arrays is unreliable, so the content is discarded.
            Value::Array(_) => default_object(key).unwrap_or(Value::Null),
            Value::String(s) => match serde_json::from_str::<Value>(&s) {
                Ok(Value::Object(map)) => Value::Object(self.object(map)),
                _ => Value::Null,
            },
            _ => Value::Null,
        }
    }
}

fn string_list(value: Value) -> Value {
    let items = match value {
        Value::Null => return Value::Null,
        Value::Array(items) => items,
        other => vec![other],
    };
    Value::Array(
        items
            .into_iter()
            .flat_map(|item| match item {
                Value::String(s) => split_lines(&s),
                Value::Number(n) => vec![n.to_string()],
                Value::Bool(b) => vec![b.to_string()],
                Value::Object(map) => ["text", "action", "title", "description"]
                    .iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_str))
                    .map(split_lines)
                    .unwrap_or_default(),
                _ => Vec::new(),
            })
            .map(Value::String)
            .collect(),
    )
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            let line = line.trim();
            BULLET
                .as_ref()
                .map_or(line, |re| re.find(line).map_or(line, |m| &line[m.end()..]))
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .collect()
}

fn unit_value(value: Value) -> Value {
    let number = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if n > 1.0 && n <= 100.0 => json!(n / 100.0),
        Some(n) if value.is_string() => json!(n),
        _ => value,
    }
}

fn timestamp(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let start = map.get("start").and_then(seconds);
            let end = map.get("end").and_then(seconds);
            match (start, end) {
                (Some(start), Some(end)) => json!({"start": start, "end": end}),
                (Some(t), None) | (None, Some(t)) => json!({"start": t, "end": t}),
                (None, None) => Value::Null,
            }
        }
        Value::Number(n) => n
            .as_f64()
            .map_or(Value::Null, |t| json!({"start": t, "end": t})),
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(parsed @ (Value::Object(_) | Value::Number(_))) => timestamp(parsed),
            _ => clock_range(&s).map_or(Value::Null, |(start, end)| {
                json!({"start": start, "end": end})
            }),
        },
        _ => Value::Null,
    }
}

fn seconds(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_clock(s),
        _ => None,
    }
}

/// `"1:05"`, `"01:02:03"`, `"12.5"` or `"12.5s"` as seconds.
fn parse_clock(text: &str) -> Option<f64> {
    let text = text.trim().trim_end_matches('s').trim();
    if text.is_empty() {
        return None;
    }
    text.split(':').try_fold(0.0, |acc: f64, part| {
        part.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| acc.mul_add(60.0, v))
    })
}

/// `"0:10 - 0:20"` or a single `"0:10"`.
fn clock_range(text: &str) -> Option<(f64, f64)> {
    let mut parts = text.splitn(2, ['-', '–']);
    let start = parse_clock(parts.next()?)?;
    let end = parts.next().map_or(Some(start), parse_clock)?;
    Some((start, end))
}

fn is_flattened(items: &[Value]) -> bool {
    items
        .first()
        .and_then(Value::as_str)
        .is_some_and(|k| FLAT_KEYS.contains(&k))
        && !items.iter().any(Value::is_object)
}

/// Rebuilds objects from `["id", "1", "timestamp", "start", 3, "end", 5, ...]`.
///
/// `id` opens a new object, as does a repeated key. `start`/`end` are gathered
/// into a nested `timestamp` object. A trailing key without a value gets an
/// empty default.
fn rebuild_flattened(items: Vec<Value>) -> Vec<Map<String, Value>> {
    let mut objects = Vec::new();
    let mut current = Map::new();
    let mut iter = items.into_iter().peekable();

    while let Some(item) = iter.next() {
        let Some(key) = item.as_str().filter(|k| FLAT_KEYS.contains(k)) else {
            continue;
        };
        let key = key.to_string();

        let repeated = key != "start" && key != "end" && current.contains_key(&key);
        if (key == "id" || repeated) && !current.is_empty() {
            objects.push(std::mem::take(&mut current));
        }

        match key.as_str() {
            "timestamp" => {
                let nested_follows = iter
                    .peek()
                    .and_then(Value::as_str)
                    .is_some_and(|k| k == "start" || k == "end");
                let value = if nested_follows {
                    json!({})
                } else {
                    iter.next().unwrap_or(Value::Null)
                };
                current.insert(key, value);
            }
            "start" | "end" => {
                let value = iter.next().unwrap_or_else(|| json!(0));
                let slot = current
                    .entry("timestamp")
                    .or_insert_with(|| json!({}));
                if !slot.is_object() {
                    *slot = json!({});
                }
                if let Value::Object(ts) = slot {
                    ts.insert(key, value);
                }
            }
            _ => {
                let value = iter.next().unwrap_or_else(|| Value::String(String::new()));
                current.insert(key, value);
            }
        }
    }
    if !current.is_empty() {
        objects.push(current);
    }
    objects
}

/// Neutral object for a single-object category field.
#[must_use]
pub fn default_object(field: &str) -> Option<Value> {
    match field {
        "hookAnalysis" => Some(json!({
            "hookType": "",
            "openingSummary": "",
            "effectiveness": DEFAULT_SCORE
        })),
        "audioMix" => Some(json!({
            "voiceClarity": DEFAULT_SCORE,
            "musicBalance": DEFAULT_SCORE,
            "notes": ""
        })),
        "qualityChecks" => Some(json!({
            "resolution": "",
            "lighting": "",
            "framing": "",
            "exportSettings": ""
        })),
        _ => None,
    }
}

/// Truncates every capped list field of a `category` report.
#[must_use]
pub fn enforce_limits(doc: Value, category: Category) -> Value {
    let Value::Object(mut map) = doc else {
        return doc;
    };
    let mut caps = vec![
        ("issues", MAX_ISSUES),
        ("strengths", MAX_STRENGTHS),
        ("priorityActions", MAX_PRIORITY_ACTIONS),
    ];
    if let Some(limit) = category.specific_limit() {
        caps.push((category.specific_field(), limit));
    }
    for (field, limit) in caps {
        if let Some(Value::Array(items)) = map.get_mut(field) {
            items.truncate(limit);
        }
    }
    Value::Object(map)
}

/// Supplies every required field of a `category` report that is absent or null.
#[must_use]
pub fn fill_defaults(doc: Value, category: Category) -> Value {
    let Value::Object(mut map) = doc else {
        return doc;
    };

    set_if_absent(&mut map, "score", json!(DEFAULT_SCORE));
    set_if_absent(&mut map, "summary", json!(""));
    for field in ["issues", "strengths", "priorityActions"] {
        set_if_absent(&mut map, field, json!([]));
    }

    let specific = category.specific_field();
    if let Some(default) = default_object(specific) {
        set_if_absent(&mut map, specific, default.clone());
        if let (Some(Value::Object(target)), Value::Object(defaults)) =
            (map.get_mut(specific), default)
        {
            for (key, value) in defaults {
                set_if_absent(target, &key, value);
            }
        }
    } else {
        set_if_absent(&mut map, specific, json!([]));
        fill_items(&mut map, specific, &item_defaults(specific, category));
    }
    fill_items(&mut map, "issues", &item_defaults("issues", category));

    Value::Object(map)
}

fn set_if_absent(map: &mut Map<String, Value>, key: &str, value: Value) {
    if map.get(key).is_none_or(Value::is_null) {
        map.insert(key.to_string(), value);
    }
}

fn fill_items(map: &mut Map<String, Value>, field: &str, defaults: &[(&str, Value)]) {
    let Some(Value::Array(items)) = map.get_mut(field) else {
        return;
    };
    for (index, item) in items.iter_mut().enumerate() {
        let Value::Object(obj) = item else {
            continue;
        };
        set_if_absent(obj, "id", json!(format!("{field}-{}", index + 1)));
        for (key, value) in defaults {
            set_if_absent(obj, key, value.clone());
        }
        if obj.get("timestamp").is_some_and(Value::is_null) {
            obj.remove("timestamp");
        }
    }
}

fn item_defaults(field: &str, category: Category) -> Vec<(&'static str, Value)> {
    match field {
        "issues" => vec![
            ("type", json!("other")),
            ("severity", json!("minor")),
            ("category", json!(category.as_str())),
            ("description", json!("")),
            ("suggestion", json!("")),
        ],
        "rewrites" => vec![("original", json!("")), ("suggested", json!(""))],
        "segments" => vec![("pace", json!("")), ("note", json!(""))],
        "cutSuggestions" => vec![("action", json!("")), ("reason", json!(""))],
        "dropOffRisks" => vec![("severity", json!("minor")), ("reason", json!(""))],
        "callsToAction" => vec![("text", json!("")), ("placement", json!(""))],
        _ => Vec::new(),
    }
}

/// All three passes for one category.
#[must_use]
pub fn normalize_for(doc: Value, category: Category) -> Value {
    let doc = match doc {
        Value::Array(mut items) if items.len() == 1 && items[0].is_object() => items.remove(0),
        other => other,
    };
    fill_defaults(enforce_limits(normalize(doc), category), category)
}
