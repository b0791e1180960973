//! Recovery of tool calls from free-form model text.
//!
//! The model is asked to answer with `{"name": ..., "arguments": {...}}`, but
//! nothing enforces it. Anything that does not parse cleanly is treated as the
//! model's final answer rather than an error.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```json\s*(.*?)\s*```").expect("fenced JSON pattern"));

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToolCall {
    /// Locally generated, unique per call.
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// What a model reply turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// One or more tool calls, in the order the model listed them.
    ToolCalls(Vec<ParsedToolCall>),
    /// No parseable tool call: the text is the answer.
    PlainAnswer(String),
}

/// Classify a raw completion as tool call(s) or a plain answer.
pub fn parse_model_reply(text: &str) -> ModelReply {
    match extract_tool_calls(text) {
        Some(calls) => {
            tracing::info!(
                tools = ?calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                "Parsed tool call from model reply"
            );
            ModelReply::ToolCalls(calls)
        }
        None => {
            tracing::debug!("No tool call in model reply; treating it as the final answer");
            ModelReply::PlainAnswer(text.to_string())
        }
    }
}

/// A fenced ```json block wins. Otherwise every `{` or `[` is tried in turn
/// and the first JSON value shaped like a tool call is taken, ignoring
/// whatever prose surrounds it. A JSON value that is not a tool call is
/// skipped whole, so nothing nested inside it is considered.
fn extract_tool_calls(text: &str) -> Option<Vec<ParsedToolCall>> {
    if let Some(captures) = FENCED_JSON.captures(text) {
        let value: Value = serde_json::from_str(captures.get(1)?.as_str()).ok()?;
        return tool_calls_from(&value);
    }

    let mut offset = 0;
    while let Some(found) = text[offset..].find(['{', '[']) {
        let start = offset + found;
        let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(value)) => {
                if let Some(calls) = tool_calls_from(&value) {
                    return Some(calls);
                }
                offset = start + values.byte_offset();
            }
            _ => offset = start + 1,
        }
    }
    None
}

fn tool_calls_from(value: &Value) -> Option<Vec<ParsedToolCall>> {
    match value {
        Value::Object(_) => Some(vec![tool_call_from(value)?]),
        Value::Array(items) if !items.is_empty() => {
            items.iter().map(tool_call_from).collect()
        }
        _ => None,
    }
}

fn tool_call_from(value: &Value) -> Option<ParsedToolCall> {
    let object = value.as_object()?;
    let name = object.get("name")?.as_str()?;
    let arguments = object.get("arguments")?;
    if name.trim().is_empty() {
        return None;
    }
    Some(ParsedToolCall {
        id: format!("tool_call_{}", Uuid::new_v4()),
        name: name.to_string(),
        arguments: arguments.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn single_call(reply: ModelReply) -> ParsedToolCall {
        match reply {
            ModelReply::ToolCalls(mut calls) if calls.len() == 1 => calls.remove(0),
            other => panic!("expected one tool call, got {:?}", other),
        }
    }

    #[test]
    fn bare_json_object() {
        let call = single_call(parse_model_reply(
            r#"{"name": "get_diff", "arguments": {"commit_hash": "abc123"}}"#,
        ));
        assert_eq!(call.name, "get_diff");
        assert_eq!(call.arguments, json!({ "commit_hash": "abc123" }));
        assert!(call.id.starts_with("tool_call_"));
    }

    #[test]
    fn fenced_json_with_surrounding_prose() {
        let text = "Sure, here you go:\n```JSON\n{\"name\": \"scan_file_tree\", \"arguments\": {}}\n```\nLet me know.";
        let call = single_call(parse_model_reply(text));
        assert_eq!(call.name, "scan_file_tree");
        assert_eq!(call.arguments, json!({}));
    }

    #[test]
    fn first_object_wins_over_trailing_text_with_braces() {
        let text = r#"I'll call {"name": "calculate_loc_per_language", "arguments": {}} and then {maybe} more."#;
        let call = single_call(parse_model_reply(text));
        assert_eq!(call.name, "calculate_loc_per_language");
    }

    #[test]
    fn bracketed_prose_before_the_call_is_skipped() {
        let cases = [
            r#"Step [1]: {"name": "get_diff", "arguments": {}}"#,
            r#"See [README](x). {"name": "get_diff", "arguments": {}}"#,
            r#"Note {not json} then {"name": "get_diff", "arguments": {}}"#,
            r#"Data {"count": 2} first, {"name": "get_diff", "arguments": {}}"#,
        ];
        for text in cases {
            let call = single_call(parse_model_reply(text));
            assert_eq!(call.name, "get_diff", "input: {}", text);
        }
    }

    #[test]
    fn batch_of_calls() {
        let text = r#"[{"name": "scan_file_tree", "arguments": {}}, {"name": "get_diff", "arguments": {}}]"#;
        match parse_model_reply(text) {
            ModelReply::ToolCalls(calls) => {
                let names: Vec<_> = calls.iter().map(|c| c.name.as_str()).collect();
                assert_eq!(names, vec!["scan_file_tree", "get_diff"]);
                assert_ne!(calls[0].id, calls[1].id);
            }
            other => panic!("expected tool calls, got {:?}", other),
        }
    }

    #[test]
    fn degraded_replies_are_plain_answers() {
        let cases = [
            "The repository is mostly Python.",
            r#"{"name": "get_diff"}"#,
            r#"{"arguments": {}}"#,
            r#"{"name": "get_diff", "arguments": "#,
            "```json\nnot json\n```",
            r#"[{"name": "get_diff", "arguments": {}}, {"oops": 1}]"#,
            "[]",
        ];
        for text in cases {
            assert_eq!(
                parse_model_reply(text),
                ModelReply::PlainAnswer(text.to_string()),
                "input: {}",
                text
            );
        }
    }
}
