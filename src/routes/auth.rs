use axum::extract::State;
use axum::{routing::post, Json, Router};
use tracing::{info, warn};
use validator::Validate;

use crate::agents::reconciler;
use crate::llm::google::GoogleAdapter;
use crate::models::{AppState, LoginRequest, SessionView};
use crate::session::Session;
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .with_state(state)
}

/// Validate the supplied API key against the provider and open the session.
/// Everything else in the API is gated on this succeeding.
async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<SessionView>> {
    request
        .validate()
        .map_err(|e| AppError::InvalidRequest(e.to_string()))?;

    let adapter = GoogleAdapter::new(&request.api_key);
    if !adapter.validate_key().await? {
        return Err(AppError::Auth(
            "Chave de API do Gemini inválida ou sem permissão.".to_string(),
        ));
    }

    // The credential lives in the process environment for the session's
    // lifetime; it is never written to disk.
    std::env::set_var("GOOGLE_API_KEY", &request.api_key);

    let mut session = Session::new(request.user_name.trim(), request.api_key);

    let models = adapter.list_generation_models().await;
    session.model = pick_default_model(&models, &state.config.llm.default_model);
    if session.model.is_none() {
        warn!("No generation-capable Gemini model available at login");
    }

    info!(user = %session.user_name, model = ?session.model, "Session opened");
    let view = session.view();
    state.sessions.login(session).await;

    Ok(Json(view))
}

/// Destroy the session: purge all derived artifacts and drop the credential
/// from the process environment.
async fn logout(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let session = state
        .sessions
        .logout()
        .await
        .ok_or_else(|| AppError::NotFound("Nenhuma sessão ativa.".to_string()))?;

    reconciler::purge_artifacts(&state.config.workspace.plots_dir)?;
    std::env::remove_var("GOOGLE_API_KEY");

    info!(user = %session.user_name, "Session closed");
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

fn pick_default_model(models: &[String], preferred: &str) -> Option<String> {
    if models.iter().any(|m| m == preferred) {
        Some(preferred.to_string())
    } else {
        models.first().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_default_model_prefers_configured() {
        let models = vec![
            "gemini-1.5-pro-latest".to_string(),
            "gemini-1.5-flash-latest".to_string(),
        ];
        assert_eq!(
            pick_default_model(&models, "gemini-1.5-flash-latest"),
            Some("gemini-1.5-flash-latest".to_string())
        );
    }

    #[test]
    fn test_pick_default_model_falls_back_to_first() {
        let models = vec!["gemini-1.5-pro-latest".to_string()];
        assert_eq!(
            pick_default_model(&models, "gemini-1.5-flash-latest"),
            Some("gemini-1.5-pro-latest".to_string())
        );
    }

    #[test]
    fn test_pick_default_model_empty_listing() {
        assert_eq!(pick_default_model(&[], "gemini-1.5-flash-latest"), None);
    }
}
