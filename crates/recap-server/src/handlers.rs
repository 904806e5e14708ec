use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use recap_core::{ConversationId, MessageRecord};
use recap_engine::{EngineError, SummaryOutcome};

use crate::server::AppState;

/// Engine error rendered as `{"error": ...}`.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Every engine error is a caller mistake; pipeline failures arrive as
        // a `failed` summary status instead.
        let status = match &self.0 {
            EngineError::InvalidCount(_) | EngineError::InvalidTone(_) | EngineError::InvalidCapacity(_) => {
                StatusCode::BAD_REQUEST
            }
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreResponse {
    pub stored: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToneBody {
    pub tone: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SummarizeBody {
    pub count: i64,
    #[serde(default)]
    pub tone: Option<String>,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn store_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<ConversationId>,
    Json(record): Json<MessageRecord>,
) -> Result<Json<StoreResponse>, ApiError> {
    let outcome = state.service.store_message(&conversation_id, record)?;
    Ok(Json(StoreResponse {
        stored: outcome.stored(),
    }))
}

pub async fn set_tone(
    State(state): State<AppState>,
    Path(conversation_id): Path<ConversationId>,
    Json(body): Json<ToneBody>,
) -> Result<Json<ToneBody>, ApiError> {
    let tone = state.service.set_tone(&conversation_id, &body.tone)?;
    Ok(Json(ToneBody {
        tone: tone.to_string(),
    }))
}

pub async fn summarize(
    State(state): State<AppState>,
    Path(conversation_id): Path<ConversationId>,
    Json(body): Json<SummarizeBody>,
) -> Result<Json<SummaryOutcome>, ApiError> {
    let outcome = state
        .service
        .summarize(&conversation_id, body.count, body.tone.as_deref())
        .await?;
    Ok(Json(outcome))
}
