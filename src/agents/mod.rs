//! Agent System
//!
//! This module contains the turn pipeline that powers the data-analysis
//! assistant:
//!
//! - **Turn Orchestrator**: classifies each user turn, delegates real
//!   questions to the reasoning agent and assembles the transcript entry
//! - **Artifact Reconciler**: claims chart images the agent's generated code
//!   dropped into the working directory
//! - **Thought-Trace Parser**: turns the agent's raw verbose stream into
//!   structured reasoning steps
//!
//! ## Pipeline Overview
//!
//! ```text
//! User Message
//!      │
//!      ▼
//! ┌──────────────┐
//! │ Orchestrator │  → greeting fast path, or delegation payload
//! └──────────────┘
//!      │ snapshot working dir, invoke agent, snapshot again
//!      ▼
//! ┌──────────────┐   ┌──────────────┐
//! │  Reconciler  │   │ Trace Parser │
//! └──────────────┘   └──────────────┘
//!      │                   │
//!      └───────┬───────────┘
//!              ▼
//!      TranscriptEntry
//! ```

pub mod gemini;
pub mod orchestrator;
pub mod reconciler;
pub mod trace;

// Re-export main components
pub use gemini::GeminiReasoningAgent;
pub use orchestrator::TurnOrchestrator;

use async_trait::async_trait;

use crate::types::AppResult;

/// The external reasoning backend, specified at its interface boundary.
///
/// `invoke` returns the agent's final textual answer. When executing generated
/// code the backend may write files into the ambient working directory as an
/// unlisted side effect; the orchestrator detects those by snapshot diffing.
///
/// `invoke_verbose` is the separate trace-capture invocation: it returns the
/// raw interleaved reasoning stream (Thought/Action/Action Input/Observation
/// markers) for the same payload. Callers accept the duplicate cost; a failure
/// on this path must never fail the turn.
#[async_trait]
pub trait ReasoningAgent: Send + Sync {
    async fn invoke(&self, payload: &str) -> AppResult<String>;
    async fn invoke_verbose(&self, payload: &str) -> AppResult<String>;
}
