//! Decision protocol: turning an assistant message into a [`Decision`].
//!
//! Three shapes are understood, checked in this order:
//!
//! 1. **Native tool calls** on the message. Each becomes an
//!    [`ActionRequest`]; the message text is kept as the draft response.
//! 2. **Structured JSON** in the message text (optionally fenced):
//!    `{"rationale": ..., "actions": [{"tool": ..., "args": {...}}], "response": ..., "is_complete": ...}`.
//!    `think` is accepted for `rationale` and `name` for `tool`.
//! 3. **Plain text**: a complete decision whose draft is the text.
//!
//! Parsing never retries the model. A message that claims to be structured
//! but cannot be read yields a [`ParseFailure`], and callers fall back to
//! [`fallback_decision`].

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;
use waypoint_core::{ActionRequest, Decision, Message};

/// Draft used when the reasoning backend itself fails.
pub const REASONER_FAILURE_MESSAGE: &str =
    "Sorry, something went wrong while handling your request. Please try again.";

/// Draft used when the backend answered but the answer could not be parsed.
pub const PARSE_FALLBACK_MESSAGE: &str =
    "Sorry, I couldn't work out how to handle that request. Could you rephrase it?";

/// Keys whose presence marks a JSON reply as a structured decision.
const STRUCTURED_KEYS: [&str; 5] = ["actions", "response", "is_complete", "rationale", "think"];

/// Why an assistant message could not be read as a decision.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseFailure {
    #[error("tool call #{index} has an empty tool name")]
    EmptyToolName { index: usize },

    #[error("arguments for '{tool_name}' are not a JSON object: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("malformed structured decision: {0}")]
    MalformedStructure(String),
}

/// Parse the assistant message produced for reasoning iteration `iteration`.
pub fn parse_decision(message: &Message, iteration: u32) -> Result<Decision, ParseFailure> {
    if !message.tool_calls.is_empty() {
        return from_tool_calls(message, iteration);
    }

    if let Some(structured) = structured_candidate(&message.content)? {
        return from_structured(structured, iteration);
    }

    Ok(Decision::complete(
        format!("iteration {iteration}: answer"),
        message.content.trim(),
    ))
}

/// The conservative decision used after a [`ParseFailure`]: end the turn
/// and ask the user to rephrase.
pub fn fallback_decision(failure: &ParseFailure) -> Decision {
    Decision::complete(format!("fallback: {failure}"), PARSE_FALLBACK_MESSAGE)
}

// ── Native tool calls ─────────────────────────────────────────────────────

fn from_tool_calls(message: &Message, iteration: u32) -> Result<Decision, ParseFailure> {
    let mut seen_ids = HashSet::new();
    let mut actions = Vec::with_capacity(message.tool_calls.len());

    for (index, call) in message.tool_calls.iter().enumerate() {
        let tool_name = call.name.trim();
        if tool_name.is_empty() {
            return Err(ParseFailure::EmptyToolName { index });
        }
        let args = parse_arguments(tool_name, &call.arguments)?;

        let call_id = if !call.id.trim().is_empty() && seen_ids.insert(call.id.clone()) {
            call.id.clone()
        } else {
            fresh_call_id()
        };
        actions.push(ActionRequest::new(call_id, tool_name, args));
    }

    let names: Vec<&str> = actions.iter().map(|a| a.tool_name.as_str()).collect();
    Ok(Decision::act(
        format!("iteration {iteration}: calling {}", names.join(", ")),
        actions,
        message.content.trim(),
    ))
}

fn parse_arguments(tool_name: &str, raw: &str) -> Result<Value, ParseFailure> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(Value::Null) => Ok(Value::Object(Default::default())),
        Ok(other) => Err(ParseFailure::InvalidArguments {
            tool_name: tool_name.to_string(),
            reason: format!("expected an object, got {other}"),
        }),
        Err(e) => Err(ParseFailure::InvalidArguments {
            tool_name: tool_name.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn fresh_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

// ── Structured JSON replies ───────────────────────────────────────────────

#[derive(Deserialize)]
struct StructuredReply {
    #[serde(default, alias = "think")]
    rationale: Option<String>,
    #[serde(default)]
    actions: Vec<StructuredAction>,
    #[serde(default)]
    response: String,
    #[serde(default)]
    is_complete: Option<bool>,
}

#[derive(Deserialize)]
struct StructuredAction {
    #[serde(alias = "name")]
    tool: String,
    #[serde(default)]
    args: Value,
}

/// The JSON object in `content`, if the text looks like a structured reply.
///
/// Brace-wrapped text that is not valid JSON is a failure, not prose.
fn structured_candidate(content: &str) -> Result<Option<Value>, ParseFailure> {
    let text = strip_fences(content.trim());
    if !(text.starts_with('{') && text.ends_with('}')) {
        return Ok(None);
    }
    let value: Value =
        serde_json::from_str(text).map_err(|e| ParseFailure::MalformedStructure(e.to_string()))?;
    let is_structured = value
        .as_object()
        .is_some_and(|object| STRUCTURED_KEYS.iter().any(|key| object.contains_key(*key)));
    Ok(is_structured.then_some(value))
}

fn strip_fences(text: &str) -> &str {
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn from_structured(value: Value, iteration: u32) -> Result<Decision, ParseFailure> {
    let reply: StructuredReply =
        serde_json::from_value(value).map_err(|e| ParseFailure::MalformedStructure(e.to_string()))?;

    let rationale = reply
        .rationale
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| format!("iteration {iteration}"));

    if reply.is_complete == Some(true) {
        return Ok(Decision::complete(rationale, reply.response.trim()));
    }

    let mut actions = Vec::with_capacity(reply.actions.len());
    for (index, action) in reply.actions.into_iter().enumerate() {
        let tool_name = action.tool.trim();
        if tool_name.is_empty() {
            return Err(ParseFailure::EmptyToolName { index });
        }
        let args = match action.args {
            Value::Null => Value::Object(Default::default()),
            args @ Value::Object(_) => args,
            other => {
                return Err(ParseFailure::InvalidArguments {
                    tool_name: tool_name.to_string(),
                    reason: format!("expected an object, got {other}"),
                });
            }
        };
        actions.push(ActionRequest::new(fresh_call_id(), tool_name, args));
    }

    Ok(Decision::act(rationale, actions, reply.response.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_core::MessageToolCall;

    fn with_calls(content: &str, calls: Vec<(&str, &str, &str)>) -> Message {
        let mut msg = Message::assistant(content);
        msg.tool_calls = calls
            .into_iter()
            .map(|(id, name, args)| MessageToolCall {
                id: id.into(),
                name: name.into(),
                arguments: args.into(),
            })
            .collect();
        msg
    }

    #[test]
    fn plain_text_is_complete() {
        let d = parse_decision(&Message::assistant("It is sunny in Oslo."), 2).unwrap();
        assert!(d.is_complete());
        assert!(d.actions().is_empty());
        assert_eq!(d.draft_response(), "It is sunny in Oslo.");
    }

    #[test]
    fn tool_calls_become_actions() {
        let msg = with_calls(
            "Setting it now.",
            vec![("call_a", "set_destination", r#"{"poi_name":"Central Park"}"#)],
        );
        let d = parse_decision(&msg, 1).unwrap();
        assert!(!d.is_complete());
        assert_eq!(d.actions()[0].call_id, "call_a");
        assert_eq!(d.actions()[0].args["poi_name"], "Central Park");
        assert!(d.rationale().starts_with("iteration 1"));
        assert_eq!(d.draft_response(), "Setting it now.");
    }

    #[test]
    fn empty_arguments_mean_no_arguments() {
        let msg = with_calls("", vec![("c1", "stop_navigation", "  ")]);
        let d = parse_decision(&msg, 1).unwrap();
        assert!(d.actions()[0].args.is_empty());
    }

    #[test]
    fn duplicate_or_missing_call_ids_are_replaced() {
        let msg = with_calls(
            "",
            vec![
                ("same", "get_weather", r#"{"city":"Oslo"}"#),
                ("same", "get_weather", r#"{"city":"Bergen"}"#),
                ("", "get_weather", r#"{"city":"Tromso"}"#),
            ],
        );
        let d = parse_decision(&msg, 1).unwrap();
        let ids: HashSet<&str> = d.actions().iter().map(|a| a.call_id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains("same"));
    }

    #[test]
    fn non_object_arguments_fail() {
        let msg = with_calls("", vec![("c1", "get_weather", "[1,2]")]);
        let err = parse_decision(&msg, 1).unwrap_err();
        assert!(matches!(err, ParseFailure::InvalidArguments { .. }));
    }

    #[test]
    fn blank_tool_name_fails() {
        let msg = with_calls("", vec![("c1", " ", "{}")]);
        assert_eq!(
            parse_decision(&msg, 1).unwrap_err(),
            ParseFailure::EmptyToolName { index: 0 }
        );
    }

    #[test]
    fn structured_reply_with_actions() {
        let text = r#"```json
{"think": "need weather", "actions": [{"name": "get_weather", "args": {"city": "Paris"}}], "response": ""}
```"#;
        let d = parse_decision(&Message::assistant(text), 3).unwrap();
        assert!(!d.is_complete());
        assert_eq!(d.rationale(), "need weather");
        assert_eq!(d.actions()[0].tool_name, "get_weather");
        assert!(d.actions()[0].call_id.starts_with("call_"));
    }

    #[test]
    fn structured_complete_reply_drops_actions() {
        let text = r#"{"rationale": "done", "actions": [{"tool": "get_weather", "args": {}}], "response": "Bye", "is_complete": true}"#;
        let d = parse_decision(&Message::assistant(text), 1).unwrap();
        assert!(d.is_complete());
        assert!(d.actions().is_empty());
        assert_eq!(d.draft_response(), "Bye");
    }

    #[test]
    fn unrelated_json_object_is_plain_text() {
        let d = parse_decision(&Message::assistant(r#"{"temperature": 4}"#), 1).unwrap();
        assert!(d.is_complete());
        assert_eq!(d.draft_response(), r#"{"temperature": 4}"#);
    }

    #[test]
    fn broken_structure_is_a_parse_failure() {
        let err = parse_decision(&Message::assistant("{actions: [oops}"), 1).unwrap_err();
        assert!(matches!(err, ParseFailure::MalformedStructure(_)));

        let err = parse_decision(&Message::assistant(r#"{"actions": "get_weather"}"#), 1).unwrap_err();
        assert!(matches!(err, ParseFailure::MalformedStructure(_)));
    }

    #[test]
    fn fallback_is_complete_without_actions() {
        let d = fallback_decision(&ParseFailure::EmptyToolName { index: 0 });
        assert!(d.is_complete());
        assert!(d.actions().is_empty());
        assert_eq!(d.draft_response(), PARSE_FALLBACK_MESSAGE);
    }
}
