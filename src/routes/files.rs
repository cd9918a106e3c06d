use axum::extract::{Multipart, State};
use axum::{routing::post, Json, Router};
use tracing::info;

use crate::agents::reconciler;
use crate::dataset;
use crate::models::{AppState, UploadResponse};
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/files", post(upload_file))
        .with_state(state)
}

/// Accept a CSV upload and install it as the session's active dataset.
///
/// A new dataset starts a new analysis: the transcript is cleared and all
/// artifacts from the previous dataset are purged. An unparseable upload
/// leaves the session untouched.
async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    let mut guard = state.sessions.write().await;
    let session = guard
        .as_mut()
        .ok_or_else(|| AppError::Auth("Nenhuma sessão ativa. Faça login primeiro.".to_string()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidRequest(format!("Upload inválido: {}", e)))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };

        if !filename.to_lowercase().ends_with(".csv") {
            return Err(AppError::Dataset(
                "Apenas arquivos CSV são suportados.".to_string(),
            ));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidRequest(format!("Falha ao ler o upload: {}", e)))?;

        let uploads_dir = &state.config.workspace.uploads_dir;
        tokio::fs::create_dir_all(uploads_dir).await?;
        let local_path = uploads_dir.join(format!("{}_{}", uuid::Uuid::new_v4(), filename));
        tokio::fs::write(&local_path, &data).await?;

        let record = match dataset::profile_csv(&local_path, &filename) {
            Ok(record) => record,
            Err(e) => {
                // The rejected upload leaves nothing behind.
                let _ = tokio::fs::remove_file(&local_path).await;
                return Err(e);
            }
        };

        info!(filename = %filename, rows = record.row_count, "Dataset uploaded");

        reconciler::purge_artifacts(&state.config.workspace.plots_dir)?;
        session.install_dataset(record.clone());

        return Ok(Json(UploadResponse { dataset: record }));
    }

    Err(AppError::InvalidRequest(
        "Nenhum arquivo enviado.".to_string(),
    ))
}
