//! Turning terminal input into resume values.

use serde_json::{Map, Value};
use waypoint_core::{InterruptKind, InterruptRequest, ResumeToken, ResumeValue};

/// Interpret a free-form answer to `request`.
///
/// Returns `None` when the input makes no sense for the interrupt, so the
/// caller can ask again. `cancel` (or `no`) is understood everywhere.
pub fn parse_answer(request: &InterruptRequest, input: &str) -> Option<ResumeValue> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if ResumeToken::parse(input) == Some(ResumeToken::Cancel) {
        return Some(ResumeValue::cancel());
    }

    match request.kind {
        InterruptKind::Confirmation => ResumeToken::parse(input).map(ResumeValue::Token),
        InterruptKind::Selection => Some(match input.parse::<u64>() {
            Ok(n) => ResumeValue::selected(n),
            Err(_) => ResumeValue::selected(input),
        }),
        InterruptKind::AskParams => param_patch(request.missing_params(), input).map(ResumeValue::params),
    }
}

/// Interpret the `VALUE` argument of `waypoint resume`.
///
/// Accepts JSON in any wire shape (`{"params": ...}`, `{"selected": ...}`,
/// `"confirm"`), a bare confirm/cancel token, or a bare candidate number.
pub fn parse_value(input: &str) -> Option<ResumeValue> {
    let input = input.trim();
    if let Ok(value) = serde_json::from_str::<ResumeValue>(input) {
        return Some(value);
    }
    if let Some(token) = ResumeToken::parse(input) {
        return Some(ResumeValue::Token(token));
    }
    input.parse::<u64>().ok().map(ResumeValue::selected)
}

/// A JSON object, `field=value` pairs, or a plain value for the single
/// missing field.
fn param_patch(missing: &[String], input: &str) -> Option<Value> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(input) {
        return Some(Value::Object(map));
    }

    if input.contains('=') {
        let mut map = Map::new();
        for pair in input.split(',') {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            map.insert(key.to_string(), Value::String(value.trim().to_string()));
        }
        return Some(Value::Object(map));
    }

    match missing {
        [field] => {
            let mut map = Map::new();
            map.insert(field.clone(), Value::String(input.to_string()));
            Some(Value::Object(map))
        }
        _ => None,
    }
}
