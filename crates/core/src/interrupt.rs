//! Human-in-the-loop boundary types.
//!
//! An [`InterruptRequest`] is what a suspended run hands to its caller; a
//! [`ResumeValue`] is what the caller hands back. Both serialize to flat JSON
//! so they can cross an HTTP boundary unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which gate raised the interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptKind {
    /// Required arguments are missing
    AskParams,
    /// A high-risk tool needs explicit approval
    Confirmation,
    /// A list-shaped result needs the user to pick one entry
    Selection,
}

impl InterruptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AskParams => "ask_params",
            Self::Confirmation => "confirmation",
            Self::Selection => "selection",
        }
    }
}

impl std::fmt::Display for InterruptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The prompt shown for one missing argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamPrompt {
    pub field: String,
    pub prompt: String,
}

/// One selectable entry of a list-shaped tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Stable 1-based position in the original result
    pub id: usize,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// The untouched item from the tool result
    pub raw: Value,
}

/// Gate-specific data carried by an interrupt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InterruptPayload {
    AskParams {
        missing_params: Vec<String>,
        prompts: Vec<ParamPrompt>,
        current_args: Map<String, Value>,
    },
    Confirmation {
        args: Map<String, Value>,
    },
    Selection {
        candidates: Vec<Candidate>,
    },
}

/// A structured prompt surfaced to the caller while a run is suspended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptRequest {
    pub kind: InterruptKind,
    pub tool_name: String,
    /// The action this interrupt belongs to
    pub call_id: String,
    pub message: String,
    pub payload: InterruptPayload,
}

impl InterruptRequest {
    /// Candidates of a selection interrupt; empty for other kinds.
    pub fn candidates(&self) -> &[Candidate] {
        match &self.payload {
            InterruptPayload::Selection { candidates } => candidates,
            _ => &[],
        }
    }

    /// Fields listed by an ask_params interrupt; empty for other kinds.
    pub fn missing_params(&self) -> &[String] {
        match &self.payload {
            InterruptPayload::AskParams { missing_params, .. } => missing_params,
            _ => &[],
        }
    }
}

/// Confirm/cancel answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResumeToken {
    #[serde(alias = "yes", alias = "ok", alias = "确认")]
    Confirm,
    #[serde(alias = "no", alias = "取消")]
    Cancel,
}

impl ResumeToken {
    /// Parse a free-form answer (case-insensitive). Unknown input yields `None`.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "confirm" | "yes" | "y" | "ok" | "确认" => Some(Self::Confirm),
            "cancel" | "no" | "n" | "取消" => Some(Self::Cancel),
            _ => None,
        }
    }
}

/// The caller's answer to an [`InterruptRequest`].
///
/// Wire shapes: `{"params": {...}}`, `{"selected": <candidate or id>}`,
/// or a bare `"confirm"` / `"cancel"` token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResumeValue {
    Params { params: Map<String, Value> },
    Selected { selected: Value },
    Token(ResumeToken),
}

impl ResumeValue {
    pub fn confirm() -> Self {
        Self::Token(ResumeToken::Confirm)
    }

    pub fn cancel() -> Self {
        Self::Token(ResumeToken::Cancel)
    }

    /// Build a parameter patch. Non-object values produce an empty patch.
    pub fn params(patch: Value) -> Self {
        match patch {
            Value::Object(params) => Self::Params { params },
            _ => Self::Params { params: Map::new() },
        }
    }

    pub fn selected(selected: impl Into<Value>) -> Self {
        Self::Selected {
            selected: selected.into(),
        }
    }

    pub fn is_cancel(&self) -> bool {
        matches!(self, Self::Token(ResumeToken::Cancel))
    }

    /// Short description of the value's shape, for error messages.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Params { .. } => "params",
            Self::Selected { .. } => "selected",
            Self::Token(ResumeToken::Confirm) => "confirm",
            Self::Token(ResumeToken::Cancel) => "cancel",
        }
    }
}
