//! HTTP API v1 over the run controller.
//!
//! Endpoints:
//!
//! - `POST   /v1/chat`                    - Start a turn, get the outcome
//! - `POST   /v1/chat/stream`             - Start a turn, get an SSE stream
//! - `POST   /v1/chat/resume`             - Answer a pending interrupt
//! - `POST   /v1/chat/resume/stream`      - Answer a pending interrupt, SSE
//! - `GET    /v1/conversations`           - List stored conversations
//! - `GET    /v1/conversations/{id}`      - One conversation's state
//! - `DELETE /v1/conversations/{id}`      - Drop a conversation
//! - `GET    /v1/tools`                   - List available tools
//! - `GET    /v1/traces/{conversation_id}` - Execution traces of a conversation
//!
//! Run errors map to status codes: unknown conversation → 404, outstanding
//! or missing interrupt → 409, resume value of the wrong shape → 422,
//! storage failures → 500.

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    response::sse::{Event as SseEvent, Sse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use waypoint_agent::{RunError, RunEvent, Runtime, TurnOutcome};
use waypoint_core::{
    CheckpointSummary, ConversationId, InterruptRequest, Message, ResumeValue, RunNode,
    ToolDefinition,
};
use waypoint_telemetry::Trace;

// ── State ─────────────────────────────────────────────────────────────────

/// Shared state for the v1 API.
pub struct ApiV1State {
    pub runtime: Runtime,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl ApiV1State {
    pub fn new(runtime: Runtime) -> Self {
        Self {
            runtime,
            start_time: chrono::Utc::now(),
        }
    }
}

pub type SharedApiState = Arc<ApiV1State>;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/stream", post(chat_stream_handler))
        .route("/chat/resume", post(resume_handler))
        .route("/chat/resume/stream", post(resume_stream_handler))
        .route("/conversations", get(list_conversations_handler))
        .route(
            "/conversations/{id}",
            get(get_conversation_handler).delete(delete_conversation_handler),
        )
        .route("/tools", get(list_tools_handler))
        .route("/traces/{conversation_id}", get(list_traces_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Deserialize)]
struct ChatRequest {
    /// Existing conversation ID (omit to start a new one).
    #[serde(default)]
    conversation_id: Option<String>,
    message: String,
}

#[derive(Deserialize)]
struct ResumeRequest {
    conversation_id: String,
    /// `"confirm"`, `"cancel"`, `{"params": {...}}` or `{"selected": ...}`
    value: ResumeValue,
}

/// A completed reply already carries `conversation_id`; only an interrupt
/// needs it added alongside.
#[derive(Serialize)]
struct ChatResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<String>,
    #[serde(flatten)]
    outcome: TurnOutcome,
}

impl ChatResponse {
    fn new(id: &ConversationId, outcome: TurnOutcome) -> Self {
        let conversation_id = match outcome {
            TurnOutcome::Completed(_) => None,
            TurnOutcome::Interrupted(_) => Some(id.to_string()),
        };
        Self {
            conversation_id,
            outcome,
        }
    }
}

#[derive(Serialize)]
struct ConversationListResponse {
    count: usize,
    conversations: Vec<CheckpointSummary>,
}

#[derive(Serialize)]
struct ConversationDetailResponse {
    id: String,
    node: RunNode,
    turns: u32,
    iteration_count: u32,
    total_tool_calls: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pending_interrupt: Option<InterruptRequest>,
    messages: Vec<Message>,
    created_at: String,
    updated_at: String,
}

#[derive(Serialize)]
struct ToolListResponse {
    count: usize,
    tools: Vec<ToolDefinition>,
}

#[derive(Serialize)]
struct TraceListResponse {
    count: usize,
    traces: Vec<Trace>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn run_error(e: RunError) -> ApiError {
    let status = match &e {
        RunError::ConversationNotFound(_) => StatusCode::NOT_FOUND,
        RunError::InterruptOutstanding(_) | RunError::NoPendingInterrupt(_) => StatusCode::CONFLICT,
        RunError::ResumeMismatch(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RunError::Checkpoint(_) => {
            tracing::error!(error = %e, "Checkpoint failure while serving request");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    api_error(status, e.to_string())
}

fn conversation_id(requested: Option<String>, message: &str) -> Result<ConversationId, ApiError> {
    if message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "message must not be empty"));
    }
    Ok(requested
        .filter(|id| !id.trim().is_empty())
        .map(ConversationId)
        .unwrap_or_default())
}

fn sse_event(event: RunEvent) -> Result<SseEvent, Infallible> {
    let data = serde_json::to_string(&event).unwrap_or_default();
    Ok(SseEvent::default().event(event.event_type()).data(data))
}

/// First SSE frame of a stream: tells the client which conversation it is in.
fn conversation_event(id: &ConversationId) -> Result<SseEvent, Infallible> {
    let data = serde_json::json!({ "conversation_id": id.as_str() }).to_string();
    Ok(SseEvent::default().event("conversation").data(data))
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn chat_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let id = conversation_id(payload.conversation_id, &payload.message)?;
    info!(conversation_id = %id, "v1/chat request");

    let outcome = state
        .runtime
        .controller
        .run_turn(&id, &payload.message)
        .await
        .map_err(run_error)?;

    Ok(Json(ChatResponse::new(&id, outcome)))
}

async fn resume_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<ResumeRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let id = ConversationId(payload.conversation_id);
    info!(conversation_id = %id, value = payload.value.shape(), "v1/chat/resume request");

    let outcome = state
        .runtime
        .controller
        .resume_turn(&id, payload.value)
        .await
        .map_err(run_error)?;

    Ok(Json(ChatResponse::new(&id, outcome)))
}

// ── SSE Streaming ─────────────────────────────────────────────────────────

/// `POST /v1/chat/stream`: Start a turn, receive an SSE stream of run events.
///
/// Run errors arrive as an `error` event since the response has already
/// started by then.
async fn chat_stream_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let id = conversation_id(payload.conversation_id, &payload.message)?;
    info!(conversation_id = %id, "v1/chat/stream SSE request");

    let first = conversation_event(&id);
    let rx = state
        .runtime
        .controller
        .clone()
        .run_turn_stream(id, payload.message);

    let stream = tokio_stream::once(first).chain(ReceiverStream::new(rx).map(sse_event));
    Ok(Sse::new(stream))
}

/// `POST /v1/chat/resume/stream`: Answer an interrupt, receive an SSE stream.
async fn resume_stream_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<ResumeRequest>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let id = ConversationId(payload.conversation_id);
    info!(conversation_id = %id, value = payload.value.shape(), "v1/chat/resume/stream SSE request");

    let first = conversation_event(&id);
    let rx = state
        .runtime
        .controller
        .clone()
        .resume_turn_stream(id, payload.value);

    Sse::new(tokio_stream::once(first).chain(ReceiverStream::new(rx).map(sse_event)))
}

// ── Conversations ─────────────────────────────────────────────────────────

async fn list_conversations_handler(
    State(state): State<SharedApiState>,
) -> Result<Json<ConversationListResponse>, ApiError> {
    let conversations = state
        .runtime
        .controller
        .conversations()
        .await
        .map_err(run_error)?;
    Ok(Json(ConversationListResponse {
        count: conversations.len(),
        conversations,
    }))
}

async fn get_conversation_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationDetailResponse>, ApiError> {
    let conv = state
        .runtime
        .controller
        .conversation(&ConversationId(id.clone()))
        .await
        .map_err(run_error)?
        .ok_or_else(|| run_error(RunError::ConversationNotFound(id)))?;

    Ok(Json(ConversationDetailResponse {
        id: conv.conversation_id.to_string(),
        node: conv.node,
        turns: conv.turns,
        iteration_count: conv.iteration_count,
        total_tool_calls: conv.total_tool_calls,
        pending_interrupt: conv.pending_interrupt.map(|p| p.request),
        messages: conv.messages,
        created_at: conv.created_at.to_rfc3339(),
        updated_at: conv.updated_at.to_rfc3339(),
    }))
}

async fn delete_conversation_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let existed = state
        .runtime
        .controller
        .delete(&ConversationId(id.clone()))
        .await
        .map_err(run_error)?;
    if existed {
        info!(conversation_id = %id, "Conversation deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(run_error(RunError::ConversationNotFound(id)))
    }
}

// ── Tools / traces ────────────────────────────────────────────────────────

async fn list_tools_handler(State(state): State<SharedApiState>) -> Json<ToolListResponse> {
    let tools = state.runtime.tools.definitions();
    Json(ToolListResponse {
        count: tools.len(),
        tools,
    })
}

async fn list_traces_handler(
    State(state): State<SharedApiState>,
    Path(conversation_id): Path<String>,
) -> Result<Json<TraceListResponse>, ApiError> {
    let telemetry = state
        .runtime
        .telemetry
        .as_ref()
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "telemetry is disabled"))?;
    let traces = telemetry.traces_for_conversation(&conversation_id);
    Ok(Json(TraceListResponse {
        count: traces.len(),
        traces,
    }))
}
