//! Interrupt controller: the three human-in-the-loop gates.
//!
//! Gates run in a fixed order for every non-duplicate action:
//!
//! 1. **ask_params**: a field with a registered prompt is absent, `null`, or blank.
//! 2. **confirmation**: the tool is on the high-risk list.
//! 3. **selection**: after the tool ran, its result is list-shaped and the
//!    tool is registered as selection-required.
//!
//! Gates 1 and 2 fire before the tool runs, gate 3 after. The controller
//! itself is stateless; parking the interrupt is the executor's job.

use serde_json::{Map, Value};
use thiserror::Error;
use waypoint_config::HitlConfig;
use waypoint_core::{
    ActionRequest, Candidate, InterruptKind, InterruptPayload, InterruptRequest, ParamPrompt,
    PendingInterrupt, ResumeToken, ResumeValue, ToolResult,
};

/// Keys under which list-shaped results are commonly nested.
const LIST_KEYS: [&str; 8] = [
    "results",
    "items",
    "data",
    "list",
    "candidates",
    "pois",
    "trains",
    "mPoiInfoList",
];

const NAME_KEYS: [&str; 3] = ["name", "title", "mName"];
const DESCRIPTION_KEYS: [&str; 3] = ["description", "address", "mAddress"];

/// A resume value that does not answer the pending interrupt.
#[derive(Debug, Clone, Error)]
#[error("cannot resume {kind} interrupt: {reason}")]
pub struct ResumeMismatch {
    pub kind: InterruptKind,
    pub reason: String,
}

/// What a valid resume value asks the executor to do.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeOutcome {
    /// Record the action as cancelled; nothing runs.
    Cancelled,
    /// Continue with this action (arguments possibly patched).
    Proceed(ActionRequest),
    /// Record this candidate as the action's result.
    Selected(Candidate),
}

#[derive(Debug, Clone)]
pub struct InterruptController {
    config: HitlConfig,
}

impl InterruptController {
    pub fn new(config: HitlConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HitlConfig {
        &self.config
    }

    pub fn requires_confirmation(&self, tool_name: &str) -> bool {
        self.config.require_confirmation.iter().any(|t| t == tool_name)
    }

    pub fn requires_selection(&self, tool_name: &str) -> bool {
        self.config.require_selection.iter().any(|t| t == tool_name)
    }

    // ── Gate 1: missing parameters ────────────────────────────────────

    pub fn check_missing(&self, action: &ActionRequest) -> Option<InterruptRequest> {
        let registered = self.config.param_prompts.get(&action.tool_name)?;

        let mut fields: Vec<&String> = registered.keys().collect();
        fields.sort();

        let prompts: Vec<ParamPrompt> = fields
            .into_iter()
            .filter(|field| is_missing(action.args.get(field.as_str())))
            .map(|field| ParamPrompt {
                field: field.clone(),
                prompt: registered[field].clone(),
            })
            .collect();

        if prompts.is_empty() {
            return None;
        }

        tracing::debug!(
            tool = %action.tool_name,
            call_id = %action.call_id,
            missing = prompts.len(),
            "ask_params gate triggered"
        );

        let message = prompts
            .iter()
            .map(|p| p.prompt.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Some(InterruptRequest {
            kind: InterruptKind::AskParams,
            tool_name: action.tool_name.clone(),
            call_id: action.call_id.clone(),
            message,
            payload: InterruptPayload::AskParams {
                missing_params: prompts.iter().map(|p| p.field.clone()).collect(),
                prompts,
                current_args: action.args.clone(),
            },
        })
    }

    // ── Gate 2: confirmation ──────────────────────────────────────────

    pub fn check_confirmation(&self, action: &ActionRequest) -> Option<InterruptRequest> {
        if !self.requires_confirmation(&action.tool_name) {
            return None;
        }

        let message = self
            .config
            .confirmation_templates
            .get(&action.tool_name)
            .and_then(|template| render_template(template, &action.args))
            .unwrap_or_else(|| {
                self.config
                    .default_confirmation
                    .replace("{tool}", &action.tool_name)
            });

        tracing::debug!(tool = %action.tool_name, call_id = %action.call_id, "confirmation gate triggered");

        Some(InterruptRequest {
            kind: InterruptKind::Confirmation,
            tool_name: action.tool_name.clone(),
            call_id: action.call_id.clone(),
            message,
            payload: InterruptPayload::Confirmation {
                args: action.args.clone(),
            },
        })
    }

    // ── Gate 3: selection ─────────────────────────────────────────────

    pub fn check_selection(&self, action: &ActionRequest, result: &ToolResult) -> Option<InterruptRequest> {
        if !self.requires_selection(&action.tool_name) {
            return None;
        }

        let value = match &result.data {
            Some(data) => data.clone(),
            None => serde_json::from_str(&result.output).ok()?,
        };
        let items = list_items(&value)?;
        if items.len() < self.config.min_candidates.max(1) {
            return None;
        }

        let candidates: Vec<Candidate> = items
            .into_iter()
            .take(self.config.max_candidates.max(1))
            .enumerate()
            .map(|(i, raw)| to_candidate(i + 1, raw))
            .collect();

        let template = self
            .config
            .selection_templates
            .get(&action.tool_name)
            .unwrap_or(&self.config.default_selection);
        let message = template.replace("{count}", &candidates.len().to_string());

        tracing::debug!(
            tool = %action.tool_name,
            call_id = %action.call_id,
            candidates = candidates.len(),
            "selection gate triggered"
        );

        Some(InterruptRequest {
            kind: InterruptKind::Selection,
            tool_name: action.tool_name.clone(),
            call_id: action.call_id.clone(),
            message,
            payload: InterruptPayload::Selection { candidates },
        })
    }

    // ── Resume ────────────────────────────────────────────────────────

    /// Interpret `value` as the answer to `pending`.
    ///
    /// Pure: a mismatch leaves nothing changed anywhere. `cancel` is a valid
    /// answer to every kind.
    pub fn apply_resume(
        &self,
        pending: &PendingInterrupt,
        value: ResumeValue,
    ) -> Result<ResumeOutcome, ResumeMismatch> {
        let kind = pending.request.kind;
        if value.is_cancel() {
            return Ok(ResumeOutcome::Cancelled);
        }

        let mismatch = |reason: String| ResumeMismatch { kind, reason };

        match (kind, value) {
            (InterruptKind::AskParams, ResumeValue::Params { params }) => {
                let mut action = pending.action.clone();
                for field in pending.request.missing_params() {
                    if let Some(v) = params.get(field) {
                        action.args.insert(field.clone(), v.clone());
                    }
                }
                Ok(ResumeOutcome::Proceed(action))
            }
            (InterruptKind::Confirmation, ResumeValue::Token(ResumeToken::Confirm)) => {
                Ok(ResumeOutcome::Proceed(pending.action.clone()))
            }
            (InterruptKind::Selection, ResumeValue::Selected { selected }) => {
                resolve_selection(pending.request.candidates(), &selected)
                    .cloned()
                    .map(ResumeOutcome::Selected)
                    .ok_or_else(|| mismatch(format!("no candidate matches {selected}")))
            }
            (_, other) => Err(mismatch(format!(
                "expected {}, got {}",
                expected_shape(kind),
                other.shape()
            ))),
        }
    }
}

fn expected_shape(kind: InterruptKind) -> &'static str {
    match kind {
        InterruptKind::AskParams => "{\"params\": {...}} or cancel",
        InterruptKind::Confirmation => "confirm or cancel",
        InterruptKind::Selection => "{\"selected\": ...} or cancel",
    }
}

fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Fill `{field}` placeholders from `args`. `None` when any placeholder
/// has no value.
fn render_template(template: &str, args: &Map<String, Value>) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return Some(out);
        };
        let key = &after[..close];
        match args.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => out.push_str(s),
            Some(Value::Null) | Some(Value::String(_)) | None => return None,
            Some(other) => out.push_str(&other.to_string()),
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Some(out)
}

// ── Candidate extraction ──────────────────────────────────────────────────

/// The items of a list-shaped result.
///
/// Accepts a bare array, an array under one of [`LIST_KEYS`], the same under
/// one level of `value` nesting, and any of those after unwrapping an
/// MCP-style `content[0].text` JSON string once.
pub fn list_items(value: &Value) -> Option<Vec<Value>> {
    if let Some(items) = find_list(value) {
        return Some(items.clone());
    }

    let text = value.get("content")?.get(0)?.get("text")?.as_str()?;
    let inner: Value = serde_json::from_str(text).ok()?;
    find_list(&inner).cloned()
}

fn find_list(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => keyed_list(map).or_else(|| match map.get("value")? {
            Value::Array(items) => Some(items),
            Value::Object(inner) => keyed_list(inner),
            _ => None,
        }),
        _ => None,
    }
}

fn keyed_list(map: &Map<String, Value>) -> Option<&Vec<Value>> {
    LIST_KEYS.iter().find_map(|key| map.get(*key)?.as_array())
}

fn first_str<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| item.get(*key)?.as_str())
}

fn to_candidate(id: usize, raw: Value) -> Candidate {
    let name = first_str(&raw, &NAME_KEYS)
        .map(String::from)
        .unwrap_or_else(|| match &raw {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
    let description = first_str(&raw, &DESCRIPTION_KEYS).unwrap_or_default().to_string();
    Candidate {
        id,
        name,
        description,
        raw,
    }
}

/// Find the candidate a `selected` value refers to: a 1-based id (number or
/// numeric string), a candidate object (matched by `id`, then `raw`), or a
/// display name.
fn resolve_selection<'a>(candidates: &'a [Candidate], selected: &Value) -> Option<&'a Candidate> {
    let by_id = |id: u64| candidates.iter().find(|c| c.id as u64 == id);

    match selected {
        Value::Number(n) => by_id(n.as_u64()?),
        Value::String(s) => match s.trim().parse::<u64>() {
            Ok(id) => by_id(id),
            Err(_) => candidates.iter().find(|c| c.name == s.trim()),
        },
        Value::Object(map) => match map.get("id").and_then(Value::as_u64) {
            Some(id) => by_id(id),
            None => map
                .get("raw")
                .and_then(|raw| candidates.iter().find(|c| &c.raw == raw))
                .or_else(|| candidates.iter().find(|c| &c.raw == selected)),
        },
        _ => None,
    }
}
