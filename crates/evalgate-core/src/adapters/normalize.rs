//! Tool-call normalization.
//!
//! Backends report tool invocations in a handful of shapes: the name and
//! arguments directly on the item (typed `tool_call`, `function_call`,
//! `file_search_call`, `web_search_call`, `computer_call`,
//! `code_interpreter_call` or `tool`), nested under a `function` or `call`
//! object, or as `tool_name` plus `input`. Each item is classified into
//! exactly one shape and reduced to `{name, arguments, raw}`; items that fit
//! no shape are dropped. Stringified JSON arguments that look like objects
//! or arrays are parsed; exact duplicates (same name and canonical
//! arguments) are dropped. Output order follows input order.

use crate::model::ToolCall;
use serde_json::{Map, Value};
use std::collections::HashSet;

enum CallShape<'a> {
    Direct {
        name: &'a str,
    },
    ToolName {
        name: &'a str,
    },
    Function {
        name: &'a str,
        function: &'a Map<String, Value>,
    },
    Call {
        name: &'a str,
        call: &'a Map<String, Value>,
    },
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn non_null(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn classify(item: &Map<String, Value>) -> Option<CallShape<'_>> {
    if let Some(name) = non_empty_str(item.get("name")) {
        return Some(CallShape::Direct { name });
    }
    if let Some(name) = non_empty_str(item.get("tool_name")) {
        return Some(CallShape::ToolName { name });
    }
    if let Some(Value::Object(function)) = item.get("function") {
        if let Some(name) = non_empty_str(function.get("name")) {
            return Some(CallShape::Function { name, function });
        }
    }
    if let Some(Value::Object(call)) = item.get("call") {
        if let Some(name) = non_empty_str(call.get("name")) {
            return Some(CallShape::Call { name, call });
        }
    }
    None
}

fn maybe_parse_json_arguments(value: Value) -> Value {
    let Value::String(ref s) = value else {
        return value;
    };
    let trimmed = s.trim();
    let looks_structured = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    if trimmed.is_empty() || !looks_structured {
        return value;
    }
    serde_json::from_str(trimmed).unwrap_or(value)
}

/// serde_json maps are BTree-backed, so this is key-sorted and stable for
/// identical values.
fn canonical_arguments(arguments: &Value) -> String {
    serde_json::to_string(arguments).unwrap_or_default()
}

/// Normalizes a backend's output items into deduplicated tool calls.
pub fn normalize_tool_calls(output: &[Value]) -> Vec<ToolCall> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut calls = Vec::new();
    for item in output {
        let Some(obj) = item.as_object() else {
            continue;
        };
        let (name, args) = match classify(obj) {
            Some(CallShape::Direct { name }) | Some(CallShape::ToolName { name }) => {
                let args = non_null(obj.get("arguments")).or_else(|| non_null(obj.get("input")));
                (name, args)
            }
            Some(CallShape::Function { name, function }) => {
                let args = non_null(function.get("arguments"))
                    .or_else(|| non_null(obj.get("arguments")))
                    .or_else(|| non_null(obj.get("input")));
                (name, args)
            }
            Some(CallShape::Call { name, call }) => {
                let args = non_null(call.get("arguments"))
                    .or_else(|| non_null(obj.get("arguments")))
                    .or_else(|| non_null(obj.get("input")));
                (name, args)
            }
            None => continue,
        };
        let arguments = maybe_parse_json_arguments(args.cloned().unwrap_or(Value::Null));
        let key = (name.to_string(), canonical_arguments(&arguments));
        if !seen.insert(key) {
            continue;
        }
        calls.push(ToolCall {
            name: name.to_string(),
            arguments,
            raw: item.clone(),
        });
    }
    calls
}

/// First-seen unique non-empty names, in call order.
pub fn tool_names(calls: &[ToolCall]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for call in calls {
        let name = call.name.trim();
        if !name.is_empty() && seen.insert(name.to_string()) {
            names.push(name.to_string());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(calls: &[ToolCall]) -> Vec<&str> {
        calls.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn direct_name_with_stringified_json_args() {
        let output = vec![json!({
            "type": "tool_call",
            "name": "file_search",
            "arguments": "{\"query\":\"pricing\"}",
        })];
        let calls = normalize_tool_calls(&output);
        assert_eq!(names(&calls), ["file_search"]);
        assert_eq!(calls[0].arguments, json!({"query": "pricing"}));
        assert!(calls[0].raw.is_object());
    }

    #[test]
    fn nested_function_object() {
        let output = vec![json!({
            "type": "function_call",
            "function": {"name": "code_interpreter", "arguments": {"code": "print(1)"}},
        })];
        let calls = normalize_tool_calls(&output);
        assert_eq!(names(&calls), ["code_interpreter"]);
        assert_eq!(calls[0].arguments, json!({"code": "print(1)"}));
    }

    #[test]
    fn call_wrapper_with_string_args() {
        let output = vec![json!({
            "type": "tool",
            "call": {"name": "web_search", "arguments": "{\"q\":\"openai\"}"},
        })];
        let calls = normalize_tool_calls(&output);
        assert_eq!(names(&calls), ["web_search"]);
        assert_eq!(calls[0].arguments, json!({"q": "openai"}));
    }

    #[test]
    fn tool_name_with_input() {
        let output = vec![json!({
            "type": "file_search_call",
            "tool_name": "file_search",
            "input": {"query": "refund"},
        })];
        let calls = normalize_tool_calls(&output);
        assert_eq!(names(&calls), ["file_search"]);
        assert_eq!(calls[0].arguments, json!({"query": "refund"}));
    }

    #[test]
    fn non_json_string_args_stay_verbatim() {
        let output = vec![json!({
            "type": "code_interpreter_call",
            "name": "code_interpreter",
            "arguments": "non-json-args",
        })];
        let calls = normalize_tool_calls(&output);
        assert_eq!(calls[0].arguments, json!("non-json-args"));
    }

    #[test]
    fn exact_duplicates_are_dropped() {
        let item = json!({
            "type": "tool_call",
            "name": "file_search",
            "arguments": "{\"query\":\"pricing\"}",
        });
        let calls = normalize_tool_calls(&[item.clone(), item]);
        assert_eq!(calls.len(), 1);
    }

    #[test]
    fn same_name_different_args_both_kept() {
        let output = vec![
            json!({"name": "file_search", "arguments": {"query": "a"}}),
            json!({"name": "file_search", "arguments": {"query": "b"}}),
        ];
        let calls = normalize_tool_calls(&output);
        assert_eq!(calls.len(), 2);
        assert_eq!(tool_names(&calls), ["file_search"]);
    }

    #[test]
    fn shapeless_items_are_skipped() {
        let output = vec![
            json!({"type": "message", "content": [{"type": "output_text", "text": "hi"}]}),
            json!("not an object"),
            json!({"arguments": {"q": 1}}),
        ];
        assert!(normalize_tool_calls(&output).is_empty());
    }

    #[test]
    fn missing_args_normalize_to_null() {
        let output = vec![json!({"type": "web_search_call", "name": "web_search"})];
        let calls = normalize_tool_calls(&output);
        assert_eq!(calls[0].arguments, Value::Null);
    }
}
