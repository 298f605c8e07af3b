//! Auto-discovery config templates.
//!
//! The `AD_DATADOGHQ_COM` payload of an app maps an app-local key to the
//! three fragments of a check definition:
//!
//! ```json
//! {"my-http-app": {"check_names": "[\"http_check\"]", "init_configs": "[{}]", "instances": "[{...}]"}}
//! ```
//!
//! Fragments follow the annotation convention: they are either inline JSON
//! or a string holding JSON text.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::DiscoveryError;

/// Separator between the owner and the app-local key in a template id.
pub const TEMPLATE_ID_SEPARATOR: char = '/';

const CHECK_NAMES: &str = "check_names";
const INIT_CONFIGS: &str = "init_configs";
const INSTANCES: &str = "instances";

/// One extracted check definition, ready for the downstream registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigTemplate {
    /// `<owner>/<app-local key>`.
    pub id: String,
    pub check_names: Value,
    pub init_configs: Value,
    pub instances: Value,
}

/// Result of extracting one payload: what parsed and what did not.
#[derive(Debug, Default)]
pub struct Extraction {
    pub templates: Vec<ConfigTemplate>,
    pub errors: Vec<DiscoveryError>,
}

/// Builds the template id for an app-local key.
pub fn template_id(owner: &str, key: &str) -> String {
    format!("{owner}{TEMPLATE_ID_SEPARATOR}{key}")
}

/// Parses an auto-discovery payload into config templates.
///
/// A payload that is not a JSON object fails as a whole. Past that point
/// each key is handled on its own: a broken key adds one
/// [`DiscoveryError::TemplateParse`] and its siblings are still extracted.
pub fn extract(owner: &str, payload: &str) -> Result<Extraction, DiscoveryError> {
    let entries: Map<String, Value> =
        serde_json::from_str(payload).map_err(|e| DiscoveryError::PayloadParse {
            owner: owner.to_string(),
            message: e.to_string(),
        })?;

    let mut extraction = Extraction::default();
    for (key, fragment) in entries {
        match parse_fragment(&fragment) {
            Ok((check_names, init_configs, instances)) => {
                extraction.templates.push(ConfigTemplate {
                    id: template_id(owner, &key),
                    check_names,
                    init_configs,
                    instances,
                })
            }
            Err(message) => extraction.errors.push(DiscoveryError::TemplateParse {
                owner: owner.to_string(),
                key,
                message,
            }),
        }
    }

    Ok(extraction)
}

fn parse_fragment(fragment: &Value) -> Result<(Value, Value, Value), String> {
    let fields = fragment
        .as_object()
        .ok_or_else(|| format!("expected an object, got {}", json_kind(fragment)))?;

    let check_names = field_array(fields, CHECK_NAMES)?;
    let init_configs = field_array(fields, INIT_CONFIGS)?;
    let instances = field_array(fields, INSTANCES)?;

    let names = check_names.as_array().map(Vec::len).unwrap_or_default();
    if let Some(bad) = check_names
        .as_array()
        .and_then(|a| a.iter().find(|n| !n.is_string()))
    {
        return Err(format!("{CHECK_NAMES} must hold strings, found {}", json_kind(bad)));
    }
    let inits = init_configs.as_array().map(Vec::len).unwrap_or_default();
    if names != inits {
        return Err(format!("{names} check name(s) but {inits} init config(s)"));
    }
    let insts = instances.as_array().map(Vec::len).unwrap_or_default();
    if names != insts {
        return Err(format!("{names} check name(s) but {insts} instance(s)"));
    }

    Ok((check_names, init_configs, instances))
}

/// Reads one fragment, decoding JSON carried inside a string.
fn field_array(fields: &Map<String, Value>, name: &str) -> Result<Value, String> {
    let raw = fields.get(name).ok_or_else(|| format!("missing {name}"))?;
    let value = match raw {
        Value::String(text) => serde_json::from_str(text)
            .map_err(|e| format!("cannot decode {name}: {e}"))?,
        other => other.clone(),
    };

    if value.is_array() {
        Ok(value)
    } else {
        Err(format!("{name} must be a list, got {}", json_kind(&value)))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn broken_key_does_not_abort_siblings() {
        let payload = r#"{"app1": {"check_names": "[]", "init_configs": "[]", "instances": "[]"}, "app2": "not-an-object"}"#;

        let extraction = extract("owner", payload).expect("top level is an object");

        assert_eq!(extraction.templates.len(), 1);
        assert_eq!(extraction.templates[0].id, "owner/app1");
        assert_eq!(extraction.errors.len(), 1);
        assert!(matches!(
            &extraction.errors[0],
            DiscoveryError::TemplateParse { owner, key, .. } if owner == "owner" && key == "app2"
        ));
    }

    #[test]
    fn malformed_payload_fails_whole_call() {
        let err = extract("owner", "{not json").expect_err("invalid json");
        assert!(matches!(err, DiscoveryError::PayloadParse { ref owner, .. } if owner == "owner"));

        let err = extract("owner", "[1, 2]").expect_err("not an object");
        assert_eq!(err.kind(), "payload_parse");
    }

    #[test]
    fn decodes_string_encoded_fragments() {
        let payload = json!({
            "my-http-app": {
                "check_names": "[\"http_check\"]",
                "init_configs": "[{}]",
                "instances": "[{\"name\": \"My app\", \"url\": \"http://%%host%%:%%port%%\"}]"
            }
        })
        .to_string();

        let extraction = extract("proc", &payload).expect("valid payload");
        assert!(extraction.errors.is_empty());

        let template = &extraction.templates[0];
        assert_eq!(template.id, "proc/my-http-app");
        assert_eq!(template.check_names, json!(["http_check"]));
        assert_eq!(template.init_configs, json!([{}]));
        assert_eq!(template.instances[0]["name"], "My app");
    }

    #[test]
    fn accepts_inline_fragments() {
        let payload = json!({
            "redis": {
                "check_names": ["redisdb", "redis_sentinel"],
                "init_configs": [{}, {}],
                "instances": [{"host": "%%host%%"}, {"host": "replica"}]
            }
        })
        .to_string();

        let extraction = extract("proc", &payload).expect("valid payload");
        assert_eq!(extraction.templates.len(), 1);
        assert_eq!(extraction.templates[0].instances.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn rejects_instance_count_mismatch() {
        let payload = json!({
            "k": {"check_names": ["a"], "init_configs": [{}], "instances": [{}, {}]},
            "none": {"check_names": ["a"], "init_configs": [{}], "instances": []}
        })
        .to_string();

        let extraction = extract("proc", &payload).expect("valid payload");
        assert!(extraction.templates.is_empty());
        assert_eq!(extraction.errors.len(), 2);
        assert!(extraction
            .errors
            .iter()
            .all(|e| matches!(e, DiscoveryError::TemplateParse { .. })));
    }

    #[test]
    fn reports_incomplete_fragments() {
        let payload = json!({
            "missing": {"check_names": "[\"a\"]", "init_configs": "[{}]"},
            "garbled": {"check_names": "[oops", "init_configs": "[]", "instances": "[]"},
            "mismatch": {"check_names": ["a", "b"], "init_configs": [{}], "instances": [{}]},
            "numbers": {"check_names": [1], "init_configs": [{}], "instances": [{}]},
            "scalar": {"check_names": "\"a\"", "init_configs": "[]", "instances": "[]"}
        })
        .to_string();

        let extraction = extract("proc", &payload).expect("top level is an object");
        assert!(extraction.templates.is_empty());

        let mut keys: Vec<&str> = extraction
            .errors
            .iter()
            .filter_map(|e| match e {
                DiscoveryError::TemplateParse { key, .. } => Some(key.as_str()),
                _ => None,
            })
            .collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["garbled", "mismatch", "missing", "numbers", "scalar"]);
    }

    #[test]
    fn empty_object_yields_nothing() {
        let extraction = extract("proc", "{}").expect("valid payload");
        assert!(extraction.templates.is_empty());
        assert!(extraction.errors.is_empty());
    }
}
