//! Companion sidecars: hook source code and schema formula fields.

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use prd_core::{defaults, LocalObject};

/// Sidecar extension for a hook runtime: `js` for node runtimes, else `py`.
pub fn hook_extension(runtime: Option<&str>) -> &'static str {
    match runtime {
        Some(rt) if rt.starts_with("node") => "js",
        _ => "py",
    }
}

/// Sidecar path for a hook JSON file.
pub fn hook_source_path(json_path: &Path, runtime: Option<&str>) -> PathBuf {
    json_path.with_extension(hook_extension(runtime))
}

/// Both possible sidecar paths of a hook.
pub fn hook_source_candidates(json_path: &Path) -> [PathBuf; 2] {
    [json_path.with_extension("py"), json_path.with_extension("js")]
}

/// Directory holding a schema's formula files.
pub fn formula_dir(schema_path: &Path) -> PathBuf {
    schema_path
        .parent()
        .map(|dir| dir.join(defaults::FORMULA_DIR))
        .unwrap_or_else(|| PathBuf::from(defaults::FORMULA_DIR))
}

pub fn formula_path(schema_path: &Path, field_id: &str) -> PathBuf {
    formula_dir(schema_path).join(format!("{}.py", field_id))
}

fn is_formula_datapoint(map: &serde_json::Map<String, JsonValue>) -> bool {
    map.get("category").and_then(JsonValue::as_str) == Some("datapoint")
        && map.get("formula").is_some_and(JsonValue::is_string)
}

fn collect_formulas(node: &JsonValue, out: &mut BTreeMap<String, String>) {
    match node {
        JsonValue::Object(map) => {
            if is_formula_datapoint(map) {
                if let (Some(id), Some(formula)) = (
                    map.get("id").and_then(JsonValue::as_str),
                    map.get("formula").and_then(JsonValue::as_str),
                ) {
                    out.insert(id.to_string(), formula.to_string());
                }
            }
            for child in map.values() {
                collect_formulas(child, out);
            }
        }
        JsonValue::Array(items) => {
            for item in items {
                collect_formulas(item, out);
            }
        }
        _ => {}
    }
}

/// Formula-bearing datapoints of a schema, keyed by field id.
pub fn formula_fields(schema: &LocalObject) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if let Some(content) = schema.field("content") {
        collect_formulas(content, &mut out);
    }
    out
}

fn replace_formula(node: &mut JsonValue, field_id: &str, code: &str) -> bool {
    match node {
        JsonValue::Object(map) => {
            if is_formula_datapoint(map) && map.get("id").and_then(JsonValue::as_str) == Some(field_id) {
                map.insert("formula".to_string(), JsonValue::String(code.to_string()));
                return true;
            }
            map.values_mut().any(|child| replace_formula(child, field_id, code))
        }
        JsonValue::Array(items) => items
            .iter_mut()
            .any(|item| replace_formula(item, field_id, code)),
        _ => false,
    }
}

/// Overwrite the `formula` of the datapoint with `field_id`. Returns whether
/// such a field exists.
pub fn set_formula(schema: &mut LocalObject, field_id: &str, code: &str) -> bool {
    match schema.extra.get_mut("content") {
        Some(content) => replace_formula(content, field_id, code),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> LocalObject {
        LocalObject::from_value(json!({
            "id": 9,
            "content": [{
                "category": "section",
                "id": "totals",
                "children": [
                    {"category": "datapoint", "id": "amount_due", "formula": "field.a + field.b"},
                    {"category": "datapoint", "id": "plain"},
                    {"category": "multivalue", "id": "items", "children": {
                        "category": "tuple", "id": "item", "children": [
                            {"category": "datapoint", "id": "line_total", "formula": "1"}
                        ]
                    }}
                ]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_hook_extension_by_runtime() {
        assert_eq!(hook_extension(Some("nodejs22.x")), "js");
        assert_eq!(hook_extension(Some("python3.12")), "py");
        assert_eq!(hook_extension(None), "py");
    }

    #[test]
    fn test_formula_fields_walks_nested_nodes() {
        let fields = formula_fields(&schema());
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["amount_due"], "field.a + field.b");
        assert_eq!(fields["line_total"], "1");
    }

    #[test]
    fn test_set_formula() {
        let mut schema = schema();
        assert!(set_formula(&mut schema, "line_total", "2"));
        assert_eq!(formula_fields(&schema)["line_total"], "2");
        assert!(!set_formula(&mut schema, "plain", "3"));
        assert!(!set_formula(&mut schema, "missing", "3"));
    }

    #[test]
    fn test_formula_path() {
        assert_eq!(
            formula_path(Path::new("q/schema.json"), "amount_due"),
            PathBuf::from("q/formula/amount_due.py")
        );
    }
}
