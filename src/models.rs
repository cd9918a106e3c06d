use crate::config::Config;
use crate::dataset::DatasetRecord;
use crate::session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sessions: SessionStore,
}

// Core domain records. The transcript is the single source of truth for
// rendering, export and the sliding context window handed to the reasoning
// agent; entries are append-only and never mutated after they enter the
// transcript.

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One exchange half: a user turn or the assistant response to it.
///
/// Artifacts and the reasoning trace are attached between the agent call
/// returning and the entry being appended; afterwards the entry is immutable.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<ReasoningStep>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl TranscriptEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            artifacts: Vec::new(),
            trace: None,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn with_artifacts(mut self, artifacts: Vec<Artifact>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_trace(mut self, trace: Option<Vec<ReasoningStep>>) -> Self {
        self.trace = trace;
        self
    }
}

/// A generated chart image relocated into the managed artifact directory.
/// Lifetime is bound to the session; never referenced by two entries.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Artifact {
    pub id: uuid::Uuid,
    pub path: std::path::PathBuf,
}

/// One atomic unit of the agent's exposed thought process.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReasoningStep {
    pub kind: StepKind,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Thought,
    Action,
    ActionInput,
    Observation,
}

impl StepKind {
    /// Maps a raw stream label to its step kind.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Thought" => Some(StepKind::Thought),
            "Action" => Some(StepKind::Action),
            "Action Input" => Some(StepKind::ActionInput),
            "Observation" => Some(StepKind::Observation),
            _ => None,
        }
    }
}

// API Request/Response types

#[derive(Debug, serde::Deserialize, validator::Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "user_name must not be empty"))]
    pub user_name: String,
    #[validate(length(min = 1, message = "api_key must not be empty"))]
    pub api_key: String,
}

#[derive(Debug, serde::Deserialize, validator::Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, message = "message must not be empty"))]
    pub message: String,
}

#[derive(Debug, serde::Serialize)]
pub struct ChatResponse {
    pub reply: TranscriptEntry,
}

#[derive(Debug, serde::Deserialize)]
pub struct TraceToggleRequest {
    pub enabled: bool,
}

#[derive(Debug, serde::Deserialize, validator::Validate)]
pub struct ModelSelectRequest {
    #[validate(length(min = 1, message = "model must not be empty"))]
    pub model: String,
}

#[derive(Debug, serde::Serialize)]
pub struct ModelsResponse {
    pub models: Vec<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct SessionView {
    pub user_name: String,
    pub model: Option<String>,
    pub dataset: Option<DatasetRecord>,
    pub show_trace: bool,
    pub transcript: Vec<TranscriptEntry>,
}

#[derive(Debug, serde::Serialize)]
pub struct UploadResponse {
    pub dataset: DatasetRecord,
}

#[derive(Debug, serde::Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}
