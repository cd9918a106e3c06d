use async_trait::async_trait;
use axum::extract::State;
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Router};
use tracing::info;

use crate::agents::{GeminiReasoningAgent, ReasoningAgent};
use crate::models::AppState;
use crate::report;
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/export", get(export_report))
        .with_state(state)
}

/// Summarizer used when no reasoning backend is configured; the exporter
/// turns its failure into the visible placeholder instead of aborting.
struct UnconfiguredSummarizer;

#[async_trait]
impl ReasoningAgent for UnconfiguredSummarizer {
    async fn invoke(&self, _payload: &str) -> AppResult<String> {
        Err(AppError::Config(
            "Nenhum modelo configurado para gerar o sumário.".to_string(),
        ))
    }

    async fn invoke_verbose(&self, payload: &str) -> AppResult<String> {
        self.invoke(payload).await
    }
}

/// Build the PDF report for the current transcript and offer it as a named
/// download. The filename derives from the active dataset's base name.
async fn export_report(State(state): State<AppState>) -> AppResult<Response> {
    let (transcript, user_name, base_name, summarizer) = {
        let guard = state.sessions.read().await;
        let session = guard.as_ref().ok_or_else(|| {
            AppError::Auth("Nenhuma sessão ativa. Faça login primeiro.".to_string())
        })?;

        let summarizer: Box<dyn ReasoningAgent> = match &session.model {
            Some(model) if !session.api_key.is_empty() => {
                Box::new(GeminiReasoningAgent::new(&session.api_key, model)?)
            }
            _ => Box::new(UnconfiguredSummarizer),
        };

        (
            session.transcript.clone(),
            session.user_name.clone(),
            session
                .dataset
                .as_ref()
                .map(|d| d.base_name().to_string())
                .unwrap_or_else(|| "analise".to_string()),
            summarizer,
        )
    };

    let exported = report::export_transcript(
        &transcript,
        &user_name,
        summarizer.as_ref(),
        &state.config.workspace.report_font_path,
    )
    .await?;

    info!(
        bytes = exported.bytes.len(),
        warnings = exported.warnings.len(),
        "Report exported"
    );

    let disposition = format!("attachment; filename=\"relatorio_eda_{}.pdf\"", base_name);
    let mut response = (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        exported.bytes,
    )
        .into_response();

    if !exported.warnings.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&exported.warnings.join(" | ")) {
            response.headers_mut().insert("x-report-warnings", value);
        }
    }

    Ok(response)
}
