use axum::extract::State;
use axum::{
    routing::{get, post},
    Json, Router,
};
use tracing::info;
use validator::Validate;

use crate::agents::reconciler;
use crate::llm::google::GoogleAdapter;
use crate::models::{
    AppState, ModelSelectRequest, ModelsResponse, SessionView, TraceToggleRequest,
};
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/session", get(get_session))
        .route("/api/session/reset", post(reset_session))
        .route("/api/session/trace", post(toggle_trace))
        .route("/api/session/model", post(select_model))
        .route("/api/models", get(list_models))
        .with_state(state)
}

fn no_session() -> AppError {
    AppError::Auth("Nenhuma sessão ativa. Faça login primeiro.".to_string())
}

async fn get_session(State(state): State<AppState>) -> AppResult<Json<SessionView>> {
    let guard = state.sessions.read().await;
    let session = guard.as_ref().ok_or_else(no_session)?;
    Ok(Json(session.view()))
}

/// Restart the analysis: clear the transcript and purge every derived
/// artifact, keeping the credential and dataset-free session alive.
async fn reset_session(State(state): State<AppState>) -> AppResult<Json<SessionView>> {
    let mut guard = state.sessions.write().await;
    let session = guard.as_mut().ok_or_else(no_session)?;

    session.reset();
    session.dataset = None;
    reconciler::purge_artifacts(&state.config.workspace.plots_dir)?;

    info!("Session reset");
    Ok(Json(session.view()))
}

async fn toggle_trace(
    State(state): State<AppState>,
    Json(request): Json<TraceToggleRequest>,
) -> AppResult<Json<SessionView>> {
    let mut guard = state.sessions.write().await;
    let session = guard.as_mut().ok_or_else(no_session)?;
    session.show_trace = request.enabled;
    Ok(Json(session.view()))
}

async fn select_model(
    State(state): State<AppState>,
    Json(request): Json<ModelSelectRequest>,
) -> AppResult<Json<SessionView>> {
    request
        .validate()
        .map_err(|e| AppError::InvalidRequest(e.to_string()))?;

    let mut guard = state.sessions.write().await;
    let session = guard.as_mut().ok_or_else(no_session)?;
    session.model = Some(request.model);
    Ok(Json(session.view()))
}

/// List generation-capable models. Listing failures never surface as errors;
/// the client gets an empty list and the diagnostic goes to the log.
async fn list_models(State(state): State<AppState>) -> AppResult<Json<ModelsResponse>> {
    let api_key = {
        let guard = state.sessions.read().await;
        guard.as_ref().ok_or_else(no_session)?.api_key.clone()
    };

    let models = GoogleAdapter::new(&api_key).list_generation_models().await;
    Ok(Json(ModelsResponse { models }))
}
