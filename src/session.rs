use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

use crate::dataset::DatasetRecord;
use crate::models::TranscriptEntry;

/// Number of transcript entries handed to the reasoning agent as context.
pub const HISTORY_WINDOW: usize = 10;

/// The single user's working context.
///
/// Lifecycle: created at login, reset (transcript cleared, artifacts purged by
/// the caller) on explicit restart or dataset change, destroyed at logout.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_name: String,
    pub api_key: String,
    pub model: Option<String>,
    pub dataset: Option<DatasetRecord>,
    pub transcript: Vec<TranscriptEntry>,
    pub show_trace: bool,
}

impl Session {
    pub fn new(user_name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            api_key: api_key.into(),
            model: None,
            dataset: None,
            transcript: Vec::new(),
            show_trace: false,
        }
    }

    /// Append an entry. The transcript is strictly append-only; nothing is
    /// ever rewritten in place.
    pub fn push_entry(&mut self, entry: TranscriptEntry) {
        self.transcript.push(entry);
    }

    /// The bounded sliding window handed to the reasoning agent.
    pub fn recent_entries(&self) -> &[TranscriptEntry] {
        let start = self.transcript.len().saturating_sub(HISTORY_WINDOW);
        &self.transcript[start..]
    }

    /// Clear the transcript; artifact files are purged separately by the
    /// caller since they live on disk.
    pub fn reset(&mut self) {
        info!(entries = self.transcript.len(), "Resetting session transcript");
        self.transcript.clear();
    }

    /// Install a freshly uploaded dataset. A new dataset starts a new
    /// analysis, so the transcript is reset as well.
    pub fn install_dataset(&mut self, dataset: DatasetRecord) {
        info!(filename = %dataset.filename, rows = dataset.row_count, "Installing dataset");
        self.reset();
        self.dataset = Some(dataset);
    }

    pub fn is_configured(&self) -> bool {
        self.model.is_some() && !self.api_key.is_empty()
    }

    /// Client-facing snapshot of the session. The credential never leaves the
    /// process.
    pub fn view(&self) -> crate::models::SessionView {
        crate::models::SessionView {
            user_name: self.user_name.clone(),
            model: self.model.clone(),
            dataset: self.dataset.clone(),
            show_trace: self.show_trace,
            transcript: self.transcript.clone(),
        }
    }
}

/// Process-local store for the single active session.
///
/// Single-user by construction: holding the write guard for the duration of a
/// turn is the concurrency discipline that makes the orchestrator's
/// working-directory snapshot diffing sound.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionStore {
    pub async fn login(&self, session: Session) {
        let mut guard = self.inner.write().await;
        *guard = Some(session);
    }

    pub async fn logout(&self) -> Option<Session> {
        let mut guard = self.inner.write().await;
        guard.take()
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, Option<Session>> {
        self.inner.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, Option<Session>> {
        self.inner.write().await
    }
}
