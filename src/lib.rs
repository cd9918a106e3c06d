// Dataconverse - conversational exploratory data analysis backed by an LLM reasoning agent

pub mod agents;
pub mod config;
pub mod dataset;
pub mod llm;
pub mod models;
pub mod report;
pub mod routes;
pub mod session;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
