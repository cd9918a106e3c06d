use axum::extract::State;
use axum::{routing::post, Json, Router};
use tracing::info;
use validator::Validate;

use crate::agents::{GeminiReasoningAgent, ReasoningAgent, TurnOrchestrator};
use crate::models::{AppState, ChatRequest, ChatResponse};
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(post_chat))
        .with_state(state)
}

/// Process one chat turn.
///
/// The session write guard is held for the whole turn: the orchestrator's
/// working-directory snapshot diffing is only sound under single-turn
/// exclusivity, so turns are strictly serialized here.
async fn post_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> AppResult<Json<ChatResponse>> {
    request
        .validate()
        .map_err(|e| AppError::InvalidRequest(e.to_string()))?;

    info!(message_len = request.message.len(), "Received chat turn");

    let mut guard = state.sessions.write().await;
    let session = guard
        .as_mut()
        .ok_or_else(|| AppError::Auth("Nenhuma sessão ativa. Faça login primeiro.".to_string()))?;

    let agent = match &session.model {
        Some(model) if !session.api_key.is_empty() => {
            Some(GeminiReasoningAgent::new(&session.api_key, model)?)
        }
        _ => None,
    };

    let orchestrator = TurnOrchestrator::new(&state.config.workspace);
    let reply = orchestrator
        .run_turn(
            session,
            &request.message,
            agent.as_ref().map(|a| a as &dyn ReasoningAgent),
        )
        .await?;

    Ok(Json(ChatResponse { reply }))
}
