//! The reconciliation template: the fixed JSON shape every submission is
//! mapped onto.
//!
//! A template is an ordinary JSON document whose leaves are either
//! *placeholders* (`"<value>"`, `"<date>"`, or an empty string) to be
//! filled from the document, or *constants* (field ids, labels, input types)
//! that describe the field and must survive reconciliation untouched:
//!
//! ```json
//! {
//!     "coverage_values": [
//!         {
//!             "coverage_parameter_id": "cvg_o3mw_cyb_effective_date",
//!             "value": "<value>",
//!             "input_type": "date"
//!         }
//!     ]
//! }
//! ```
//!
//! The template is loaded once per process and shared read-only behind an
//! `Arc`. The literal file text is kept alongside the parsed value because
//! the model is shown the template exactly as written.

use crate::error::IntakeError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*<[^<>]*>\s*$").expect("placeholder regex is valid"));

/// Whether a template leaf is a placeholder to be filled from the document.
pub fn is_placeholder(value: &Value) -> bool {
    match value {
        Value::String(s) => s.trim().is_empty() || PLACEHOLDER.is_match(s),
        _ => false,
    }
}

/// A loaded, immutable reconciliation template.
#[derive(Debug, Clone)]
pub struct Template {
    path: Option<PathBuf>,
    text: String,
    value: Value,
}

impl Template {
    /// Load and parse the template file at `path`.
    ///
    /// # Errors
    /// [`IntakeError::Io`] if the file cannot be read,
    /// [`IntakeError::InvalidTemplate`] if it is not a JSON object.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IntakeError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| IntakeError::io(path, e))?;
        let mut template = Self::parse(text).map_err(|source| IntakeError::InvalidTemplate {
            path: path.to_path_buf(),
            source,
        })?;
        template.path = Some(path.to_path_buf());
        if !template.value.is_object() {
            return Err(IntakeError::InvalidConfig(format!(
                "Template '{}' must be a JSON object at the top level",
                path.display()
            )));
        }
        info!(
            "Template loaded from {}: {} top-level fields",
            path.display(),
            template.top_level_keys().len()
        );
        Ok(template)
    }

    /// Build a template from JSON text already in memory.
    pub fn from_json_str(text: impl Into<String>) -> Result<Self, IntakeError> {
        let template = Self::parse(text.into()).map_err(|source| IntakeError::InvalidTemplate {
            path: PathBuf::from("<memory>"),
            source,
        })?;
        if !template.value.is_object() {
            return Err(IntakeError::InvalidConfig(
                "Template must be a JSON object at the top level".into(),
            ));
        }
        Ok(template)
    }

    fn parse(text: String) -> Result<Self, serde_json::Error> {
        let value = serde_json::from_str(&text)?;
        Ok(Self {
            path: None,
            text,
            value,
        })
    }

    /// The template exactly as written on disk.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The parsed template.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Where the template was loaded from, if it came from a file.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Top-level field names.
    pub fn top_level_keys(&self) -> Vec<&str> {
        match &self.value {
            Value::Object(map) => map.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Rebuild `candidate` on the template's shape.
    ///
    /// - every template key is present in the result;
    /// - placeholder leaves take the candidate's value, or `""` when the
    ///   candidate has none (missing, `null`, or still a placeholder);
    /// - constant leaves keep the template's value;
    /// - keys the candidate invented are dropped;
    /// - a one-element template array whose record has no identifying
    ///   constants is a schema applied to every candidate element;
    /// - any other array is a fixed list: each template element takes the
    ///   candidate element carrying the same identifying constants, or the
    ///   element at the same position when that one does not contradict
    ///   them. Unmatched template elements come out blank.
    pub fn conform(&self, candidate: &Value) -> Value {
        conform_value(&self.value, Some(candidate))
    }

    /// Paths (`a.b[0].c`) where `candidate` lacks a template field.
    ///
    /// Used to report drift when the output is preserved as-is.
    pub fn missing_fields(&self, candidate: &Value) -> Vec<String> {
        let mut missing = Vec::new();
        collect_missing(&self.value, candidate, String::new(), &mut missing);
        missing
    }
}

fn conform_value(template: &Value, candidate: Option<&Value>) -> Value {
    match template {
        Value::Object(fields) => {
            let given = candidate.and_then(Value::as_object);
            let mut out = Map::with_capacity(fields.len());
            for (key, field) in fields {
                let value = conform_value(field, given.and_then(|g| g.get(key)));
                out.insert(key.clone(), value);
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            let given = candidate.and_then(Value::as_array);
            match items.as_slice() {
                [] => Value::Array(given.cloned().unwrap_or_default()),
                [record] if is_repeating(record) => match given {
                    Some(elems) if !elems.is_empty() => Value::Array(
                        elems
                            .iter()
                            .map(|e| conform_value(record, Some(e)))
                            .collect(),
                    ),
                    _ => Value::Array(vec![conform_value(record, None)]),
                },
                _ => {
                    let paired = pair_elements(items, given.map_or(&[][..], Vec::as_slice));
                    Value::Array(
                        items
                            .iter()
                            .zip(paired)
                            .map(|(item, elem)| conform_value(item, elem))
                            .collect(),
                    )
                }
            }
        }
        leaf if is_placeholder(leaf) => fill_placeholder(candidate),
        constant => constant.clone(),
    }
}

fn fill_placeholder(candidate: Option<&Value>) -> Value {
    match candidate {
        None | Some(Value::Null) => Value::String(String::new()),
        Some(v) if is_placeholder(v) => Value::String(String::new()),
        Some(v @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => v.clone(),
        Some(nested) => {
            debug!("Flattening nested value into placeholder leaf");
            Value::String(nested.to_string())
        }
    }
}

/// Constant scalar leaves that identify a template record.
///
/// Keys named `id` or ending in `_id` win; without any, every constant
/// scalar leaf counts.
fn identity(record: &Value) -> Vec<(&str, &Value)> {
    let Value::Object(fields) = record else {
        return Vec::new();
    };
    let constants: Vec<(&str, &Value)> = fields
        .iter()
        .filter(|(_, v)| {
            matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_)) && !is_placeholder(v)
        })
        .map(|(k, v)| (k.as_str(), v))
        .collect();
    let ids: Vec<(&str, &Value)> = constants
        .iter()
        .copied()
        .filter(|(k, _)| *k == "id" || k.ends_with("_id"))
        .collect();
    if ids.is_empty() {
        constants
    } else {
        ids
    }
}

fn is_repeating(record: &Value) -> bool {
    identity(record).is_empty()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Agreement {
    Match,
    Neutral,
    Conflict,
}

fn agreement(identity: &[(&str, &Value)], candidate: &Value) -> Agreement {
    let Some(given) = candidate.as_object() else {
        return Agreement::Neutral;
    };
    let mut matched = false;
    for (key, expected) in identity {
        match given.get(*key) {
            Some(v) if v == *expected => matched = true,
            Some(Value::Null) | None => {}
            Some(_) => return Agreement::Conflict,
        }
    }
    if matched {
        Agreement::Match
    } else {
        Agreement::Neutral
    }
}

/// Pair every template element with at most one candidate element.
///
/// First by identifying constants, then by position for the leftovers.
/// Each candidate element is used once; extra candidates are dropped.
fn pair_elements<'a>(items: &[Value], given: &'a [Value]) -> Vec<Option<&'a Value>> {
    let identities: Vec<_> = items.iter().map(identity).collect();
    let mut used = vec![false; given.len()];
    let mut paired: Vec<Option<&'a Value>> = vec![None; items.len()];

    for (slot, ident) in paired.iter_mut().zip(&identities) {
        if ident.is_empty() {
            continue;
        }
        let found = given
            .iter()
            .enumerate()
            .find(|(j, e)| !used[*j] && agreement(ident, e) == Agreement::Match);
        if let Some((j, elem)) = found {
            used[j] = true;
            *slot = Some(elem);
        }
    }

    for (i, (slot, ident)) in paired.iter_mut().zip(&identities).enumerate() {
        if slot.is_some() || i >= given.len() || used[i] {
            continue;
        }
        if agreement(ident, &given[i]) != Agreement::Conflict {
            used[i] = true;
            *slot = Some(&given[i]);
        }
    }

    paired
}

fn collect_missing(template: &Value, candidate: &Value, path: String, out: &mut Vec<String>) {
    match (template, candidate) {
        (Value::Object(fields), Value::Object(given)) => {
            for (key, field) in fields {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                match given.get(key) {
                    Some(v) => collect_missing(field, v, child, out),
                    None => out.push(child),
                }
            }
        }
        (Value::Object(_), _) => out.push(if path.is_empty() { "$".into() } else { path }),
        (Value::Array(items), Value::Array(given)) => match items.as_slice() {
            [] => {}
            [record] if is_repeating(record) => {
                for (i, v) in given.iter().enumerate() {
                    collect_missing(record, v, format!("{path}[{i}]"), out);
                }
            }
            _ => {
                for (i, (item, elem)) in items.iter().zip(pair_elements(items, given)).enumerate() {
                    let child = format!("{path}[{i}]");
                    match elem {
                        Some(v) => collect_missing(item, v, child, out),
                        None => out.push(child),
                    }
                }
            }
        },
        (Value::Array(_), _) => out.push(path),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template(v: Value) -> Template {
        Template::from_json_str(v.to_string()).unwrap()
    }

    #[test]
    fn placeholder_detection() {
        assert!(is_placeholder(&json!("<value>")));
        assert!(is_placeholder(&json!(" <date> ")));
        assert!(is_placeholder(&json!("")));
        assert!(!is_placeholder(&json!("Cyber Effective Date")));
        assert!(!is_placeholder(&json!("<a> and <b>")));
        assert!(!is_placeholder(&json!(3)));
        assert!(!is_placeholder(&json!(null)));
    }

    #[test]
    fn fills_value_and_keeps_id() {
        let t = template(json!({"fields": [{"id": "x", "value": "<value>"}]}));
        let out = t.conform(&json!({"fields": [{"id": "x", "value": "42"}]}));
        assert_eq!(out["fields"][0]["id"], "x");
        assert_eq!(out["fields"][0]["value"], "42");
    }

    #[test]
    fn missing_value_becomes_blank_not_omitted() {
        let t = template(json!({"name": "<value>", "email": "<value>"}));
        let out = t.conform(&json!({"name": "Ada"}));
        assert_eq!(out, json!({"name": "Ada", "email": ""}));
    }

    #[test]
    fn leftover_marker_and_null_become_blank() {
        let t = template(json!({"a": "<value>", "b": "<value>"}));
        let out = t.conform(&json!({"a": "<value>", "b": null}));
        assert_eq!(out, json!({"a": "", "b": ""}));
    }

    fn coverage_template() -> Template {
        template(json!({
            "coverage_values": [
                {"coverage_parameter_id": "cvg_effective_date", "value": "<value>", "input_type": "date"},
                {"coverage_parameter_id": "cvg_aggregate_limit", "value": "<value>", "input_type": "select_one"},
                {"coverage_parameter_id": "cvg_retention", "value": "<value>", "input_type": "select_one"}
            ]
        }))
    }

    fn coverage(out: &Value) -> Vec<(&str, &str)> {
        out["coverage_values"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| {
                (
                    c["coverage_parameter_id"].as_str().unwrap(),
                    c["value"].as_str().unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn constants_survive_model_edits() {
        let out = coverage_template().conform(&json!({
            "coverage_values": [
                {"coverage_parameter_id": "cvg_effective_date", "value": "2024-01-01", "input_type": "text"}
            ],
            "invented": true
        }));
        assert_eq!(out["coverage_values"][0]["input_type"], "date");
        assert!(out.get("invented").is_none());
        assert_eq!(
            coverage(&out),
            [
                ("cvg_effective_date", "2024-01-01"),
                ("cvg_aggregate_limit", ""),
                ("cvg_retention", "")
            ]
        );
    }

    #[test]
    fn unknown_id_is_not_assigned_to_a_template_field() {
        let out = coverage_template().conform(&json!({
            "coverage_values": [{"coverage_parameter_id": "WRONG", "value": "2024-01-01"}]
        }));
        assert_eq!(
            coverage(&out),
            [
                ("cvg_effective_date", ""),
                ("cvg_aggregate_limit", ""),
                ("cvg_retention", "")
            ]
        );
    }

    #[test]
    fn omitted_element_does_not_shift_later_values() {
        let out = coverage_template().conform(&json!({
            "coverage_values": [
                {"coverage_parameter_id": "cvg_aggregate_limit", "value": "$1,000,000"},
                {"coverage_parameter_id": "cvg_retention", "value": "$25,000"}
            ]
        }));
        assert_eq!(
            coverage(&out),
            [
                ("cvg_effective_date", ""),
                ("cvg_aggregate_limit", "$1,000,000"),
                ("cvg_retention", "$25,000")
            ]
        );
    }

    #[test]
    fn reordered_elements_match_by_id() {
        let out = coverage_template().conform(&json!({
            "coverage_values": [
                {"coverage_parameter_id": "cvg_retention", "value": "$25,000"},
                {"coverage_parameter_id": "cvg_effective_date", "value": "2024-01-01"},
                {"coverage_parameter_id": "cvg_aggregate_limit", "value": "$1,000,000"}
            ]
        }));
        assert_eq!(
            coverage(&out),
            [
                ("cvg_effective_date", "2024-01-01"),
                ("cvg_aggregate_limit", "$1,000,000"),
                ("cvg_retention", "$25,000")
            ]
        );
    }

    #[test]
    fn extra_elements_are_dropped() {
        let out = coverage_template().conform(&json!({
            "coverage_values": [
                {"coverage_parameter_id": "cvg_bonus", "value": "yes"},
                {"coverage_parameter_id": "cvg_aggregate_limit", "value": "$1,000,000"},
                {"coverage_parameter_id": "cvg_retention", "value": "$25,000"},
                {"coverage_parameter_id": "cvg_effective_date", "value": "2024-01-01"}
            ]
        }));
        assert_eq!(out["coverage_values"].as_array().unwrap().len(), 3);
        assert_eq!(
            coverage(&out),
            [
                ("cvg_effective_date", "2024-01-01"),
                ("cvg_aggregate_limit", "$1,000,000"),
                ("cvg_retention", "$25,000")
            ]
        );
    }

    #[test]
    fn elements_without_ids_fall_back_to_position() {
        let out = coverage_template().conform(&json!({
            "coverage_values": [{"value": "2024-01-01"}, {"value": "$1,000,000"}]
        }));
        assert_eq!(
            coverage(&out),
            [
                ("cvg_effective_date", "2024-01-01"),
                ("cvg_aggregate_limit", "$1,000,000"),
                ("cvg_retention", "")
            ]
        );
    }

    #[test]
    fn single_keyed_record_is_not_repeated() {
        let t = template(json!({"fields": [{"id": "x", "value": "<value>"}]}));
        let out = t.conform(&json!({"fields": [
            {"id": "y", "value": "1"},
            {"id": "x", "value": "2"}
        ]}));
        assert_eq!(out, json!({"fields": [{"id": "x", "value": "2"}]}));

        let none = t.conform(&json!({"fields": [{"id": "y", "value": "1"}]}));
        assert_eq!(none, json!({"fields": [{"id": "x", "value": ""}]}));
    }

    #[test]
    fn missing_fields_follow_id_matching() {
        let t = coverage_template();
        let missing = t.missing_fields(&json!({
            "coverage_values": [
                {"coverage_parameter_id": "cvg_retention", "value": "$25,000", "input_type": "select_one"}
            ]
        }));
        assert_eq!(missing, ["coverage_values[0]", "coverage_values[1]"]);
    }

    #[test]
    fn single_record_array_repeats() {
        let t = template(json!({"items": [{"sku": "<value>", "qty": "<value>"}]}));
        let out = t.conform(&json!({"items": [
            {"sku": "A1", "qty": 2},
            {"sku": "B7"}
        ]}));
        assert_eq!(
            out,
            json!({"items": [{"sku": "A1", "qty": 2}, {"sku": "B7", "qty": ""}]})
        );

        let empty = t.conform(&json!({}));
        assert_eq!(empty, json!({"items": [{"sku": "", "qty": ""}]}));
    }

    #[test]
    fn nested_candidate_is_flattened_into_leaf() {
        let t = template(json!({"address": "<value>"}));
        let out = t.conform(&json!({"address": {"city": "Paris"}}));
        assert_eq!(out["address"], "{\"city\":\"Paris\"}");
    }

    #[test]
    fn non_object_candidate_yields_blank_template() {
        let t = template(json!({"a": "<value>", "meta": {"kind": "form"}}));
        let out = t.conform(&json!("nonsense"));
        assert_eq!(out, json!({"a": "", "meta": {"kind": "form"}}));
    }

    #[test]
    fn top_level_keys_in_order() {
        let t = Template::from_json_str(r#"{"zeta": "<value>", "alpha": "<value>"}"#).unwrap();
        let mut keys = t.top_level_keys();
        keys.sort_unstable();
        assert_eq!(keys, vec!["alpha", "zeta"]);
    }

    #[test]
    fn text_is_kept_verbatim() {
        let raw = "{\n    \"a\": \"<value>\"\n}";
        let t = Template::from_json_str(raw).unwrap();
        assert_eq!(t.text(), raw);
    }

    #[test]
    fn rejects_non_object_template() {
        assert!(Template::from_json_str("[1, 2]").is_err());
        assert!(Template::from_json_str("not json").is_err());
    }

    #[test]
    fn missing_fields_reports_paths() {
        let t = template(json!({
            "name": "<value>",
            "contact": {"email": "<value>", "phone": "<value>"},
            "rows": [{"k": "a", "v": "<value>"}, {"k": "b", "v": "<value>"}]
        }));
        let mut missing = t.missing_fields(&json!({
            "contact": {"email": "x"},
            "rows": [{"k": "a", "v": "1"}]
        }));
        missing.sort();
        assert_eq!(missing, vec!["contact.phone", "name", "rows[1]"]);
        assert!(t.missing_fields(&t.conform(&json!({}))).is_empty());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.json");
        std::fs::write(&path, r#"{"applicant": "<value>"}"#).unwrap();
        let t = Template::load(&path).unwrap();
        assert_eq!(t.path(), Some(path.as_path()));
        assert_eq!(t.top_level_keys(), vec!["applicant"]);

        let missing = Template::load(dir.path().join("nope.json")).unwrap_err();
        assert_eq!(missing.kind(), crate::error::ErrorKind::Io);
    }
}
