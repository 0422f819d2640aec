//! Zero-value-safe readers over the loosely-typed object tree every cluster
//! object decodes to once stripped of its concrete Rust type
//! (`serde_json::Value`, from a `DynamicObject`'s `.data`).
//!
//! Every reader here returns the zero value on absence or type mismatch; none
//! of them panic, unwrap, or surface a parse error. Component code elsewhere
//! in the crate must never reach past this boundary into raw `Value` maps —
//! if a new shape is needed, add an accessor here instead.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use serde_json::Value;

/// Walks `path` through nested JSON objects, returning `None` as soon as a
/// segment is missing or the current value is not an object.
fn walk<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for segment in path {
        current = current.as_object()?.get(*segment)?;
    }
    Some(current)
}

/// Reads a nested string field; returns `""` on absence or type mismatch.
#[must_use]
pub fn nested_str<'a>(value: &'a Value, path: &[&str]) -> &'a str {
    walk(value, path).and_then(Value::as_str).unwrap_or_default()
}

/// Reads a nested string field as an owned `Option<String>`: `None` means
/// absent, distinct from present-but-empty.
#[must_use]
pub fn nested_string_opt(value: &Value, path: &[&str]) -> Option<String> {
    walk(value, path).and_then(Value::as_str).map(str::to_string)
}

/// Reads a nested boolean; returns `false` on absence or type mismatch.
#[must_use]
pub fn nested_bool(value: &Value, path: &[&str]) -> bool {
    walk(value, path).and_then(Value::as_bool).unwrap_or(false)
}

/// Reads a nested f64; returns `0.0` on absence or type mismatch.
#[must_use]
pub fn nested_f64(value: &Value, path: &[&str]) -> f64 {
    walk(value, path).and_then(Value::as_f64).unwrap_or(0.0)
}

/// Reads a nested array of strings; returns an empty `Vec` on absence, type
/// mismatch, or non-string elements (those are skipped, not fatal).
#[must_use]
pub fn nested_string_slice(value: &Value, path: &[&str]) -> Vec<String> {
    walk(value, path)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Reads a nested array of objects; returns an empty `Vec` on absence or type
/// mismatch.
#[must_use]
pub fn nested_array<'a>(value: &'a Value, path: &[&str]) -> &'a [Value] {
    walk(value, path).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

/// Reads a nested string-to-string map (e.g. `matchLabels`, `annotations`);
/// returns an empty map on absence or type mismatch.
#[must_use]
pub fn nested_string_map(value: &Value, path: &[&str]) -> std::collections::BTreeMap<String, String> {
    walk(value, path)
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Reads a nested object's raw value, for callers that need to hand it to a
/// further accessor call or embed it verbatim in `Details`.
#[must_use]
pub fn nested_value<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    walk(value, path)
}

/// Reads a `LabelSelector`-shaped sub-object (`{matchLabels, matchExpressions}`).
///
/// Returns `None` when the field is absent — "no selector constraint, select
/// everything in scope" — which is distinct from `Some(LabelSelector::default())`,
/// meaning the field was present but both of its sub-fields were empty (a
/// selector that, by Kubernetes selector semantics, also matches everything,
/// but was *authored* explicitly).
#[must_use]
pub fn nested_label_selector(value: &Value, path: &[&str]) -> Option<LabelSelector> {
    let raw = walk(value, path)?;
    if !raw.is_object() {
        return None;
    }
    let match_labels = nested_string_map(raw, &["matchLabels"]);
    let match_labels = if match_labels.is_empty() { None } else { Some(match_labels.into_iter().collect()) };

    let match_expressions: Vec<_> = nested_array(raw, &["matchExpressions"])
        .iter()
        .filter_map(|expr| {
            let key = expr.get("key")?.as_str()?.to_string();
            let operator = expr.get("operator")?.as_str()?.to_string();
            let values = expr
                .get("values")
                .and_then(Value::as_array)
                .map(|vs| vs.iter().filter_map(|v| v.as_str().map(str::to_string)).collect());
            Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement { key, operator, values })
        })
        .collect();
    let match_expressions = if match_expressions.is_empty() { None } else { Some(match_expressions) };

    Some(LabelSelector { match_labels, match_expressions })
}
