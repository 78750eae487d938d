//! Decisions, action requests and observations.
//!
//! A [`Decision`] is what the reasoner hands the run controller each
//! iteration; each [`ActionRequest`] in it is executed at most once and leaves
//! behind an [`Observation`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// One tool invocation requested by a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Identifier unique within the turn (matches the LLM's tool_call.id when present)
    pub call_id: String,

    /// Name of the tool to invoke
    pub tool_name: String,

    /// Arguments, always a JSON object
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ActionRequest {
    /// Build a request. Non-object `args` are treated as "no arguments".
    pub fn new(call_id: impl Into<String>, tool_name: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            args,
        }
    }

    /// The dedup signature of this request's tool name and arguments.
    pub fn signature(&self) -> String {
        signature_of(&self.tool_name, &self.args)
    }

    pub fn args_value(&self) -> Value {
        Value::Object(self.args.clone())
    }
}

/// The reasoner's output for one iteration.
///
/// Construct through [`Decision::complete`] or [`Decision::act`]; both keep
/// the invariant that a complete decision carries no actions. Deserialized
/// decisions are normalized the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawDecision")]
pub struct Decision {
    rationale: String,
    actions: Vec<ActionRequest>,
    draft_response: String,
    is_complete: bool,
}

impl Decision {
    /// A final decision: no further tool use this turn.
    pub fn complete(rationale: impl Into<String>, draft_response: impl Into<String>) -> Self {
        Self {
            rationale: rationale.into(),
            actions: Vec::new(),
            draft_response: draft_response.into(),
            is_complete: true,
        }
    }

    /// A decision to run `actions`. An empty action list yields a complete decision.
    pub fn act(
        rationale: impl Into<String>,
        actions: Vec<ActionRequest>,
        draft_response: impl Into<String>,
    ) -> Self {
        let is_complete = actions.is_empty();
        Self {
            rationale: rationale.into(),
            actions,
            draft_response: draft_response.into(),
            is_complete,
        }
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn actions(&self) -> &[ActionRequest] {
        &self.actions
    }

    pub fn draft_response(&self) -> &str {
        &self.draft_response
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    /// Mutable access to a pending action, used when a parameter patch is merged.
    pub fn action_mut(&mut self, index: usize) -> Option<&mut ActionRequest> {
        self.actions.get_mut(index)
    }
}

#[derive(Deserialize)]
struct RawDecision {
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    actions: Vec<ActionRequest>,
    #[serde(default)]
    draft_response: String,
    #[serde(default)]
    is_complete: bool,
}

impl From<RawDecision> for Decision {
    fn from(raw: RawDecision) -> Self {
        if raw.is_complete {
            Decision::complete(raw.rationale, raw.draft_response)
        } else {
            Decision::act(raw.rationale, raw.actions, raw.draft_response)
        }
    }
}

/// Outcome class of an executed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationStatus {
    Success,
    Error,
    Cancelled,
}

impl ObservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

/// The recorded outcome of one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub call_id: String,
    pub tool_name: String,

    /// Dedup signature of the arguments the action actually ran with
    pub signature: String,

    pub status: ObservationStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl Observation {
    pub fn success(action: &ActionRequest, payload: impl Into<String>) -> Self {
        Self::with_status(action, ObservationStatus::Success, Some(payload.into()), None)
    }

    pub fn failure(action: &ActionRequest, error_detail: impl Into<String>) -> Self {
        Self::with_status(action, ObservationStatus::Error, None, Some(error_detail.into()))
    }

    pub fn cancelled(action: &ActionRequest) -> Self {
        Self::with_status(
            action,
            ObservationStatus::Cancelled,
            None,
            Some("cancelled by user".into()),
        )
    }

    fn with_status(
        action: &ActionRequest,
        status: ObservationStatus,
        payload: Option<String>,
        error_detail: Option<String>,
    ) -> Self {
        Self {
            call_id: action.call_id.clone(),
            tool_name: action.tool_name.clone(),
            signature: action.signature(),
            status,
            payload,
            error_detail,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ObservationStatus::Success
    }

    /// The text fed back to the reasoner for this observation.
    pub fn content_text(&self) -> String {
        match self.status {
            ObservationStatus::Success => self.payload.clone().unwrap_or_default(),
            ObservationStatus::Error | ObservationStatus::Cancelled => {
                self.error_detail.clone().unwrap_or_default()
            }
        }
    }
}

// ── Canonical signatures ──────────────────────────────────────────────────

/// Compute the dedup signature of a tool invocation.
///
/// Arguments are written in a canonical form first: object keys sorted at
/// every depth, `null` members dropped, strings trimmed, and integral floats
/// folded into integers. The result is a SHA-256 hex digest.
pub fn signature_of(tool_name: &str, args: &Map<String, Value>) -> String {
    let mut canonical = String::new();
    write_canonical_object(args, &mut canonical);

    let mut hasher = Sha256::new();
    hasher.update(tool_name.trim().as_bytes());
    hasher.update([0u8]);
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

fn write_canonical_object(map: &Map<String, Value>, out: &mut String) {
    let mut keys: Vec<&String> = map
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, _)| k)
        .collect();
    keys.sort();

    out.push('{');
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::String((*key).clone()).to_string());
        out.push(':');
        write_canonical(&map[key.as_str()], out);
    }
    out.push('}');
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                out.push_str(&(f as i64).to_string())
            }
            _ => out.push_str(&n.to_string()),
        },
        Value::String(s) => out.push_str(&Value::String(s.trim().to_string()).to_string()),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => write_canonical_object(map, out),
    }
}
