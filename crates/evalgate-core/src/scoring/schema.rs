//! Draft 2020-12 validation behind one wrapper, shared by every call site
//! (scorer output/tools checks and the OpenAI adapter's response check).

use crate::model::SchemaError;
use anyhow::{anyhow, Result};
use jsonschema::Draft;
use serde_json::{json, Value};

/// A compiled JSON schema. Compilation failures surface as scorer failures
/// on the cases that declared the schema, never as run aborts.
pub struct CompiledSchema {
    validator: jsonschema::Validator,
}

impl CompiledSchema {
    pub fn compile(schema: &Value) -> Result<Self> {
        // Our schema strategy is Draft 2020-12.
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(schema)
            .map_err(|e| anyhow!("schema compilation failed: {e}"))?;
        Ok(Self { validator })
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validator.is_valid(instance)
    }

    /// First `max` violations. Root-level violations get path `$`.
    pub fn errors(&self, instance: &Value, max: usize) -> Vec<SchemaError> {
        self.validator
            .iter_errors(instance)
            .take(max)
            .map(|err| {
                let path = err.instance_path().to_string();
                SchemaError {
                    path: if path.is_empty() { "$".to_string() } else { path },
                    message: err.to_string(),
                }
            })
            .collect()
    }
}

/// Default structured-output contract for routed chat backends. Injected in
/// openai mode when a case expects a route or refusal but declares no schema
/// of its own.
pub fn routing_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "route": {"type": "string", "enum": ["tech", "marketing", "investor", "unknown"]},
            "answer": {"type": "string"},
            "refusal": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "is_refusal": {"type": "boolean"},
                    "reason": {"type": ["string", "null"]},
                },
                "required": ["is_refusal", "reason"],
            },
        },
        "required": ["route", "answer", "refusal"],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_schema_compiles_and_validates() {
        let schema = CompiledSchema::compile(&routing_schema()).expect("schema should compile");
        let ok = json!({
            "route": "tech",
            "answer": "restart the agent",
            "refusal": {"is_refusal": false, "reason": null},
        });
        assert!(schema.is_valid(&ok));

        let bad_route = json!({
            "route": "legal",
            "answer": "",
            "refusal": {"is_refusal": false, "reason": null},
        });
        let errors = schema.errors(&bad_route, 3);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "/route");
    }

    #[test]
    fn error_paths_default_to_root() {
        let schema = CompiledSchema::compile(&json!({"type": "object"})).unwrap();
        let errors = schema.errors(&json!("not an object"), 3);
        assert_eq!(errors[0].path, "$");
    }

    #[test]
    fn error_list_is_bounded() {
        let schema = CompiledSchema::compile(&json!({
            "type": "object",
            "properties": {
                "a": {"type": "string"},
                "b": {"type": "string"},
                "c": {"type": "string"},
                "d": {"type": "string"},
            },
            "required": ["a", "b", "c", "d"],
        }))
        .unwrap();
        let errors = schema.errors(&json!({}), 3);
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn invalid_schema_fails_compilation() {
        assert!(CompiledSchema::compile(&json!({"type": 42})).is_err());
    }
}
