use anyhow::Result;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LLMConfig,
    pub workspace: WorkspaceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    pub google_api_key: String,
    pub default_model: String,
}

/// Filesystem layout shared by the orchestrator, the artifact reconciler and
/// the report exporter.
///
/// `working_dir` is where the reasoning agent's generated code drops files;
/// `plots_dir` is the managed artifact directory, purged wholesale on session
/// reset and logout.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceConfig {
    pub working_dir: PathBuf,
    pub plots_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub report_font_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                cors_allowed_origins: env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
            },
            llm: LLMConfig {
                google_api_key: env::var("GOOGLE_API_KEY").unwrap_or_default(),
                default_model: env::var("REPLY_LLM_MODEL")
                    .unwrap_or_else(|_| "gemini-1.5-flash-latest".to_string()),
            },
            workspace: WorkspaceConfig {
                working_dir: env::var("AGENT_WORKING_DIR")
                    .unwrap_or_else(|_| ".".to_string())
                    .into(),
                plots_dir: env::var("PLOTS_DIR")
                    .unwrap_or_else(|_| "temp_plots".to_string())
                    .into(),
                uploads_dir: env::var("UPLOADS_DIR")
                    .unwrap_or_else(|_| "uploads".to_string())
                    .into(),
                report_font_path: env::var("REPORT_FONT_PATH")
                    .unwrap_or_else(|_| "assets/DejaVuSans.ttf".to_string())
                    .into(),
            },
        })
    }
}
