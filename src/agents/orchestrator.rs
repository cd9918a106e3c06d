//! Turn Orchestrator
//!
//! The core state machine for one chat turn: classify the incoming message,
//! answer conversational noise directly, or delegate to the reasoning agent
//! and reconcile its results (text, chart side effects, reasoning trace) into
//! a transcript entry.

use std::collections::HashSet;
use std::fs;

use tracing::{info, warn};

use crate::agents::{reconciler, trace, ReasoningAgent};
use crate::config::WorkspaceConfig;
use crate::models::TranscriptEntry;
use crate::session::Session;
use crate::types::{AppError, AppResult};

/// Greetings answered without waking the reasoning backend. Matching is done
/// on the lowercased message with surrounding `?!., ` stripped.
const SIMPLE_GREETINGS: &[&str] = &["oi", "olá", "ola", "tudo bem?", "tudo bem", "eai", "e ai"];

const GREETING_REPLY: &str =
    "Olá! Sou seu assistente de análise. Como posso ajudar com seus dados hoje?";

/// The well-known filename generated code is instructed to write charts to.
const PLOT_SENTINEL: &str = "plot.png";

const SYSTEM_PROMPT: &str = r#"Você é um assistente de IA especialista em Análise Exploratória de Dados (EDA). Sua missão é ser um parceiro analítico para o usuário.

**FORMATO DE SAÍDA OBRIGATÓRIO:**
Sua resposta DEVE SEMPRE começar com "Thought:" e terminar com o bloco "Final Answer:". Toda a sua resposta final para o usuário deve estar contida nele. NUNCA dê a resposta final sem o prefixo "Final Answer:".

**Sua Diretriz Principal: Adapte-se ao usuário.**

1.  **Para Saudações Simples (oi, olá, etc.):** Se o usuário apenas cumprimentar, responda de forma breve e amigável e aguarde o comando dele. Não inicie uma análise completa.

2.  **Para Pedidos de Análise:** Quando o usuário pedir uma análise, siga a estrutura abaixo:
    a. **Primeiro, atenda:** Entregue o resultado direto (texto ou gráfico) que foi solicitado.
    b. **Depois, guie:** Após entregar o resultado, agregue valor:
        - **Explique:** Diga o que o resultado significa.
        - **Observe:** Compartilhe qualquer insight proativo que você encontrou.
        - **Sugira:** Recomende um próximo passo lógico para a análise.
        - **Engaje:** Termine com uma pergunta para manter a conversa fluindo.

**Outras Diretrizes Importantes:**
- **Idioma:** Responda sempre no idioma da pergunta do usuário.
- **Melhores Práticas:** Crie gráficos com títulos e rótulos claros.
- **Gráficos:** **CRÍTICO: Salve sempre o gráfico em `plot.png`**. Nunca exiba gráficos de forma interativa."#;

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .trim_matches(|c: char| "?!., ".contains(c))
        .to_string()
}

fn is_greeting(text: &str) -> bool {
    let normalized = normalize(text);
    SIMPLE_GREETINGS.contains(&normalized.as_str())
}

pub struct TurnOrchestrator<'a> {
    workspace: &'a WorkspaceConfig,
}

impl<'a> TurnOrchestrator<'a> {
    pub fn new(workspace: &'a WorkspaceConfig) -> Self {
        Self { workspace }
    }

    /// Process one user turn and return the assistant entry.
    ///
    /// The transcript is not touched here: the caller appends the user entry
    /// and the returned entry atomically on success, so a failed turn leaves
    /// the transcript exactly as it was.
    pub async fn handle_turn(
        &self,
        session: &Session,
        user_text: &str,
        agent: Option<&dyn ReasoningAgent>,
    ) -> AppResult<TranscriptEntry> {
        if is_greeting(user_text) {
            info!("Greeting fast path, skipping agent invocation");
            return Ok(TranscriptEntry::assistant(GREETING_REPLY));
        }

        let agent = agent.ok_or_else(|| {
            AppError::Config(
                "Selecione um modelo Gemini e verifique se a chave de API está configurada."
                    .to_string(),
            )
        })?;

        let payload = self.build_payload(session, user_text);

        // A stale chart from an earlier run must not be attributed to this
        // turn.
        let working_dir = &self.workspace.working_dir;
        let stale = working_dir.join(PLOT_SENTINEL);
        if stale.exists() {
            fs::remove_file(&stale)?;
        }

        let before = reconciler::snapshot_files(working_dir)?;

        let output = agent.invoke(&payload).await?;
        info!(response_len = output.len(), "Agent invocation complete");

        let trace = if session.show_trace {
            match agent.invoke_verbose(&payload).await {
                Ok(raw) => Some(trace::parse_trace(&raw)),
                Err(e) => {
                    warn!(error = %e, "Trace capture failed, continuing without trace");
                    None
                }
            }
        } else {
            None
        };

        let after = reconciler::snapshot_files(working_dir)?;
        let new_files: HashSet<String> = after.difference(&before).cloned().collect();
        let artifacts = reconciler::reconcile(working_dir, &self.workspace.plots_dir, &new_files)?;
        if !artifacts.is_empty() {
            info!(count = artifacts.len(), "Artifacts bound to turn");
        }

        Ok(TranscriptEntry::assistant(output)
            .with_artifacts(artifacts)
            .with_trace(trace))
    }

    /// Run one full turn against a session: on success the user entry and the
    /// assistant entry are appended together; on failure nothing is appended.
    pub async fn run_turn(
        &self,
        session: &mut Session,
        user_text: &str,
        agent: Option<&dyn ReasoningAgent>,
    ) -> AppResult<TranscriptEntry> {
        let reply = self.handle_turn(session, user_text, agent).await?;
        session.push_entry(TranscriptEntry::user(user_text));
        session.push_entry(reply.clone());
        Ok(reply)
    }

    /// Compose the delegation payload: behavioral instructions, the active
    /// dataset, the bounded history window and the current turn.
    fn build_payload(&self, session: &Session, user_text: &str) -> String {
        let history = session
            .recent_entries()
            .iter()
            .map(|e| format!(" - {}: {}", e.role, e.content))
            .collect::<Vec<_>>()
            .join("\n");

        let dataset = session
            .dataset
            .as_ref()
            .map(|d| d.describe())
            .unwrap_or_else(|| "Nenhum conjunto de dados carregado.".to_string());

        format!(
            "{}\n\n**Conjunto de Dados Ativo:**\n{}\n\n**Contexto da Conversa Anterior:**\n{}\n\n**Pergunta do Usuário:**\n{}",
            SYSTEM_PROMPT, dataset, history, user_text
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockAgent {
        reply: String,
        verbose: Option<String>,
        writes: Vec<PathBuf>,
        fail: bool,
        fail_verbose: bool,
        invocations: AtomicUsize,
    }

    impl MockAgent {
        fn answering(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                verbose: None,
                writes: Vec::new(),
                fail: false,
                fail_verbose: false,
                invocations: AtomicUsize::new(0),
            }
        }

        fn writing(reply: &str, paths: Vec<PathBuf>) -> Self {
            Self {
                writes: paths,
                ..Self::answering(reply)
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::answering("")
            }
        }

        fn invocation_count(&self) -> usize {
            self.invocations.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReasoningAgent for MockAgent {
        async fn invoke(&self, _payload: &str) -> AppResult<String> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::LLMApi("backend unavailable".to_string()));
            }
            for path in &self.writes {
                std::fs::write(path, b"png-bytes").unwrap();
            }
            Ok(self.reply.clone())
        }

        async fn invoke_verbose(&self, _payload: &str) -> AppResult<String> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            if self.fail_verbose {
                return Err(AppError::LLMApi("verbose channel down".to_string()));
            }
            Ok(self
                .verbose
                .clone()
                .unwrap_or_else(|| format!("Thought: ok\nFinal Answer: {}", self.reply)))
        }
    }

    fn workspace(dir: &tempfile::TempDir) -> WorkspaceConfig {
        WorkspaceConfig {
            working_dir: dir.path().to_path_buf(),
            plots_dir: dir.path().join("temp_plots"),
            uploads_dir: dir.path().join("uploads"),
            report_font_path: dir.path().join("DejaVuSans.ttf"),
        }
    }

    fn configured_session() -> Session {
        let mut session = Session::new("Ana", "key");
        session.model = Some("gemini-1.5-flash-latest".to_string());
        session
    }

    #[tokio::test]
    async fn test_greetings_short_circuit_without_backend_calls() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&dir);
        let orchestrator = TurnOrchestrator::new(&ws);
        let session = configured_session();
        let agent = MockAgent::answering("não deveria ser chamado");

        for greeting in ["oi", "Oi!", "OLÁ", "tudo bem?", " e ai. ", "ola,"] {
            let entry = orchestrator
                .handle_turn(&session, greeting, Some(&agent))
                .await
                .unwrap();
            assert_eq!(entry.content, GREETING_REPLY);
            assert!(entry.artifacts.is_empty());
        }

        assert_eq!(agent.invocation_count(), 0);
        // The greeting fast path never touches the artifact directory.
        assert!(!ws.plots_dir.exists());
    }

    #[tokio::test]
    async fn test_non_greeting_without_backend_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&dir);
        let orchestrator = TurnOrchestrator::new(&ws);
        let mut session = configured_session();

        let err = orchestrator
            .run_turn(&mut session, "Quantas linhas tem o arquivo?", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(session.transcript.is_empty());
    }

    #[tokio::test]
    async fn test_turn_claims_generated_chart() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&dir);
        let orchestrator = TurnOrchestrator::new(&ws);
        let mut session = configured_session();

        let plot_path = dir.path().join("plot.png");
        let agent = MockAgent::writing("Final Answer: histograma gerado.", vec![plot_path.clone()]);

        let entry = orchestrator
            .run_turn(&mut session, "Faça um histograma da coluna idade", Some(&agent))
            .await
            .unwrap();

        assert_eq!(entry.artifacts.len(), 1);
        assert!(entry.artifacts[0].path.exists());
        assert!(entry.artifacts[0].path.starts_with(&ws.plots_dir));
        // The working-directory copy is gone.
        assert!(!plot_path.exists());
    }

    #[tokio::test]
    async fn test_multiple_charts_all_claimed() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&dir);
        let orchestrator = TurnOrchestrator::new(&ws);
        let session = configured_session();

        let agent = MockAgent::writing(
            "Final Answer: dois gráficos.",
            vec![dir.path().join("plot.png"), dir.path().join("extra.png")],
        );

        let entry = orchestrator
            .handle_turn(&session, "Compare as colunas", Some(&agent))
            .await
            .unwrap();
        assert_eq!(entry.artifacts.len(), 2);
    }

    #[tokio::test]
    async fn test_stale_sentinel_is_not_misattributed() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&dir);
        let orchestrator = TurnOrchestrator::new(&ws);
        let session = configured_session();

        // A chart left behind by an earlier run.
        std::fs::write(dir.path().join("plot.png"), b"stale").unwrap();

        let agent = MockAgent::answering("Final Answer: só texto.");
        let entry = orchestrator
            .handle_turn(&session, "Descreva os dados", Some(&agent))
            .await
            .unwrap();

        assert!(entry.artifacts.is_empty());
        assert!(!dir.path().join("plot.png").exists());
    }

    #[tokio::test]
    async fn test_failed_turn_leaves_transcript_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&dir);
        let orchestrator = TurnOrchestrator::new(&ws);
        let mut session = configured_session();
        let agent = MockAgent::failing();

        let err = orchestrator
            .run_turn(&mut session, "Descreva os dados", Some(&agent))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::LLMApi(_)));
        assert!(session.transcript.is_empty());
    }

    #[tokio::test]
    async fn test_successful_turn_appends_user_and_assistant_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&dir);
        let orchestrator = TurnOrchestrator::new(&ws);
        let mut session = configured_session();
        let agent = MockAgent::answering("Final Answer: 42 linhas.");

        orchestrator
            .run_turn(&mut session, "Quantas linhas?", Some(&agent))
            .await
            .unwrap();

        assert_eq!(session.transcript.len(), 2);
        assert_eq!(session.transcript[0].role, crate::models::Role::User);
        assert_eq!(session.transcript[0].content, "Quantas linhas?");
        assert_eq!(session.transcript[1].role, crate::models::Role::Assistant);

        // A failed turn afterwards adds nothing.
        let failing = MockAgent::failing();
        let _ = orchestrator
            .run_turn(&mut session, "E colunas?", Some(&failing))
            .await
            .unwrap_err();
        assert_eq!(session.transcript.len(), 2);
    }

    #[tokio::test]
    async fn test_trace_mode_attaches_parsed_steps() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&dir);
        let orchestrator = TurnOrchestrator::new(&ws);
        let mut session = configured_session();
        session.show_trace = true;

        let mut agent = MockAgent::answering("Final Answer: feito.");
        agent.verbose = Some("Thought: contar linhas\nAction: python\n> Finished chain.".to_string());

        let entry = orchestrator
            .handle_turn(&session, "Conte as linhas", Some(&agent))
            .await
            .unwrap();

        let steps = entry.trace.unwrap();
        assert_eq!(steps.len(), 2);
        // Answer + verbose capture: two invocations.
        assert_eq!(agent.invocation_count(), 2);
    }

    #[tokio::test]
    async fn test_trace_capture_failure_does_not_fail_the_turn() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&dir);
        let orchestrator = TurnOrchestrator::new(&ws);
        let mut session = configured_session();
        session.show_trace = true;

        let mut agent = MockAgent::answering("Final Answer: feito.");
        agent.fail_verbose = true;

        let entry = orchestrator
            .handle_turn(&session, "Conte as linhas", Some(&agent))
            .await
            .unwrap();
        assert_eq!(entry.content, "Final Answer: feito.");
        assert!(entry.trace.is_none());
    }

    #[tokio::test]
    async fn test_trace_disabled_invokes_backend_once() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&dir);
        let orchestrator = TurnOrchestrator::new(&ws);
        let session = configured_session();
        let agent = MockAgent::answering("Final Answer: feito.");

        orchestrator
            .handle_turn(&session, "Conte as linhas", Some(&agent))
            .await
            .unwrap();
        assert_eq!(agent.invocation_count(), 1);
    }

    #[tokio::test]
    async fn test_payload_carries_window_dataset_and_turn() {
        let dir = tempfile::tempdir().unwrap();
        let ws = workspace(&dir);
        let orchestrator = TurnOrchestrator::new(&ws);
        let mut session = configured_session();
        session.dataset = Some(crate::dataset::DatasetRecord {
            id: "d1".to_string(),
            filename: "idades.csv".to_string(),
            local_path: dir.path().join("idades.csv"),
            columns: vec!["idade".to_string()],
            row_count: 100,
            preview: vec![],
        });
        for i in 0..15 {
            session.push_entry(TranscriptEntry::user(format!("pergunta {}", i)));
        }

        let payload = orchestrator.build_payload(&session, "Faça um histograma da coluna idade");
        assert!(payload.contains("idades.csv"));
        assert!(payload.contains("Faça um histograma da coluna idade"));
        // The window keeps the last 10 entries only.
        assert!(payload.contains("pergunta 14"));
        assert!(payload.contains("pergunta 5"));
        assert!(!payload.contains("pergunta 4\n"));
    }

    #[test]
    fn test_normalize_strips_surrounding_punctuation() {
        assert_eq!(normalize("  Oi!?  "), "oi");
        assert_eq!(normalize("Tudo bem?"), "tudo bem");
        assert!(is_greeting("OLA"));
        assert!(!is_greeting("oi, faça um histograma"));
    }
}
