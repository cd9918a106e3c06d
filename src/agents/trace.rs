//! Thought-Trace Parser
//!
//! Converts the agent's raw verbose stream into an ordered list of typed
//! reasoning steps. This is a best-effort presentational transform over an
//! unstable upstream text format: it never errors, and unlabeled text outside
//! any recognized span is silently dropped.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{ReasoningStep, StepKind};

const FINISHED_MARKER: &str = "> Finished chain.";

fn ansi_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").unwrap())
}

/// Matches either a step label or the chain restart marker. The restart
/// marker only terminates the preceding span, it produces no step of its own.
fn label_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(Thought|Action Input|Action|Observation):|> Entering new AgentExecutor chain\.")
            .unwrap()
    })
}

/// Parse a raw verbose stream into ordered reasoning steps.
///
/// Text after the first completion marker is wrap-up output and is discarded.
pub fn parse_trace(raw: &str) -> Vec<ReasoningStep> {
    let stripped = ansi_regex().replace_all(raw, "");
    let stripped: &str = stripped.as_ref();
    let cleaned = match stripped.find(FINISHED_MARKER) {
        Some(idx) => &stripped[..idx],
        None => stripped,
    };

    let matches: Vec<regex::Captures<'_>> = label_regex().captures_iter(cleaned).collect();

    let mut steps = Vec::new();
    for (i, cap) in matches.iter().enumerate() {
        let Some(label) = cap.get(1) else {
            continue;
        };
        let Some(kind) = StepKind::from_label(label.as_str()) else {
            continue;
        };
        let span_start = cap.get(0).map(|m| m.end()).unwrap_or(0);
        let span_end = matches
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(cleaned.len());
        steps.push(ReasoningStep {
            kind,
            content: cleaned[span_start..span_end].trim().to_string(),
        });
    }

    steps
}
