//! Report Exporter
//!
//! Renders the session transcript into a durable, shareable PDF: a title
//! block, an AI-generated executive summary, then the verbatim turn-by-turn
//! record with embedded chart images. The document is produced entirely
//! in memory; nothing is persisted here.

use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tracing::warn;

use crate::agents::ReasoningAgent;
use crate::models::{Role, TranscriptEntry};
use crate::types::{AppError, AppResult};

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 40.0;
const BOTTOM_LIMIT: f32 = 60.0;

const REPORT_TITLE: &str = "Relatório de Análise de Dados";
const AGENT_LABEL: &str = "Agente de IA";

const SUMMARY_INSTRUCTION: &str = "Você é um analista de dados sênior. Sua tarefa é ler o histórico de uma conversa entre um usuário e um agente de IA sobre uma análise de dados e escrever um sumário executivo conciso em português (2 a 3 parágrafos). O sumário deve destacar as principais perguntas feitas, as análises realizadas e os insights ou conclusões mais importantes encontrados. Ignore saudações e foque nos resultados.";

pub struct ExportedReport {
    pub bytes: Vec<u8>,
    pub warnings: Vec<String>,
}

/// Export the transcript as a PDF.
///
/// Summarization failures degrade to a visible placeholder; a missing
/// preferred font degrades to the built-in fallback with a warning. Neither
/// aborts the export.
pub async fn export_transcript(
    transcript: &[TranscriptEntry],
    user_name: &str,
    summarizer: &dyn ReasoningAgent,
    font_path: &Path,
) -> AppResult<ExportedReport> {
    let summary = generate_summary(transcript, summarizer).await;

    let mut warnings = Vec::new();
    let mut builder = ReportBuilder::new(font_path, &mut warnings);

    builder.heading(REPORT_TITLE, 16.0);
    builder.line(&format!("Autor: {}", user_name), 9.0);
    builder.line(
        &format!(
            "Gerado em: {}",
            chrono::Local::now().format("%d/%m/%Y %H:%M:%S")
        ),
        9.0,
    );
    builder.blank(10.0);

    builder.heading("Sumário Executivo", 12.0);
    builder.paragraph(&summary, 10.0);

    builder.new_page();
    builder.heading("Histórico Detalhado da Análise", 12.0);
    builder.blank(5.0);

    for entry in transcript {
        let actor = match entry.role {
            Role::User => user_name,
            Role::Assistant => AGENT_LABEL,
        };
        builder.heading(actor, 11.0);
        builder.paragraph(&entry.content, 10.0);
        for artifact in &entry.artifacts {
            builder.image(&artifact.path);
        }
        builder.blank(7.0);
    }

    let bytes = builder.finish()?;
    Ok(ExportedReport { bytes, warnings })
}

async fn generate_summary(
    transcript: &[TranscriptEntry],
    summarizer: &dyn ReasoningAgent,
) -> String {
    let history = transcript
        .iter()
        .map(|e| format!("{}: {}", e.role, e.content))
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        "{}\n\nHistórico da Conversa:\n---\n{}\n---\n\nSumário Executivo:",
        SUMMARY_INSTRUCTION, history
    );

    match summarizer.invoke(&prompt).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Executive summary generation failed, using placeholder");
            format!("Ocorreu um erro ao gerar o sumário executivo: {}", e)
        }
    }
}

enum FontKind {
    /// Embedded TrueType font loaded from the configured path.
    Embedded(Vec<u8>),
    /// Built-in Helvetica fallback.
    Builtin,
}

struct PageDraft {
    operations: Vec<Operation>,
    images: Vec<(Stream, (f32, f32), (f32, f32))>,
}

impl PageDraft {
    fn new() -> Self {
        Self {
            operations: Vec::new(),
            images: Vec::new(),
        }
    }
}

struct ReportBuilder<'a> {
    pages: Vec<PageDraft>,
    y: f32,
    font: FontKind,
    warnings: &'a mut Vec<String>,
}

impl<'a> ReportBuilder<'a> {
    fn new(font_path: &Path, warnings: &'a mut Vec<String>) -> Self {
        let font = match std::fs::read(font_path) {
            Ok(bytes) => FontKind::Embedded(bytes),
            Err(_) => {
                let warning = format!(
                    "Fonte {} não encontrada. Usando Helvetica como alternativa. Caracteres especiais podem não ser exibidos corretamente.",
                    font_path.display()
                );
                warn!("{}", warning);
                warnings.push(warning);
                FontKind::Builtin
            }
        };

        Self {
            pages: vec![PageDraft::new()],
            y: PAGE_HEIGHT - MARGIN,
            font,
            warnings,
        }
    }

    fn new_page(&mut self) {
        self.pages.push(PageDraft::new());
        self.y = PAGE_HEIGHT - MARGIN;
    }

    fn ensure_room(&mut self, height: f32) {
        if self.y - height < BOTTOM_LIMIT {
            self.new_page();
        }
    }

    fn blank(&mut self, height: f32) {
        self.y -= height;
    }

    fn text_line(&mut self, text: &str, size: f32, font: &str) {
        self.ensure_room(size * 1.4);
        self.y -= size * 1.4;
        let y = self.y;
        if let Some(page) = self.pages.last_mut() {
            page.operations.push(Operation::new("BT", vec![]));
            page.operations
                .push(Operation::new("Tf", vec![font.into(), size.into()]));
            page.operations
                .push(Operation::new("Td", vec![MARGIN.into(), y.into()]));
            page.operations.push(Operation::new(
                "Tj",
                vec![Object::String(
                    encode_win_ansi(text),
                    lopdf::StringFormat::Literal,
                )],
            ));
            page.operations.push(Operation::new("ET", vec![]));
        }
    }

    fn heading(&mut self, text: &str, size: f32) {
        self.text_line(text, size, "F2");
    }

    fn line(&mut self, text: &str, size: f32) {
        self.text_line(text, size, "F1");
    }

    fn paragraph(&mut self, text: &str, size: f32) {
        let max_chars = ((PAGE_WIDTH - 2.0 * MARGIN) / (size * 0.5)) as usize;
        for raw_line in text.lines() {
            if raw_line.trim().is_empty() {
                self.blank(size);
                continue;
            }
            for line in wrap_text(raw_line, max_chars) {
                self.line(&line, size);
            }
        }
    }

    /// Place a chart image scaled to fit the page width. Missing or
    /// undecodable files are skipped with a diagnostic.
    fn image(&mut self, path: &Path) {
        if !path.exists() {
            warn!(path = %path.display(), "Artifact file missing at export time, skipping");
            return;
        }
        let stream = match lopdf::xobject::image(path) {
            Ok(stream) => stream,
            Err(e) => {
                let warning = format!(
                    "Não foi possível incorporar a imagem {}: {}",
                    path.display(),
                    e
                );
                warn!("{}", warning);
                self.warnings.push(warning);
                return;
            }
        };

        let width = stream
            .dict
            .get(b"Width")
            .and_then(Object::as_i64)
            .unwrap_or(600) as f32;
        let height = stream
            .dict
            .get(b"Height")
            .and_then(Object::as_i64)
            .unwrap_or(400) as f32;

        let display_width = PAGE_WIDTH - 2.0 * MARGIN;
        let display_height = display_width * height / width;

        self.ensure_room(display_height + 10.0);
        self.y -= display_height + 5.0;
        let position = (MARGIN, self.y);
        self.y -= 5.0;

        if let Some(page) = self.pages.last_mut() {
            page.images
                .push((stream, position, (display_width, display_height)));
        }
    }

    fn finish(self) -> AppResult<Vec<u8>> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let (regular_id, bold_id) = match self.font {
            FontKind::Embedded(bytes) => {
                let embedded = embed_truetype(&mut doc, bytes);
                // The embedded face covers headings too; bold is emulated by size.
                (embedded, embedded)
            }
            FontKind::Builtin => {
                let regular = doc.add_object(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => "Helvetica",
                    "Encoding" => "WinAnsiEncoding",
                });
                let bold = doc.add_object(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => "Helvetica-Bold",
                    "Encoding" => "WinAnsiEncoding",
                });
                (regular, bold)
            }
        };

        let mut kids: Vec<Object> = Vec::new();
        let mut xobjects = lopdf::Dictionary::new();
        let mut image_counter = 0usize;

        for draft in self.pages {
            let mut operations = draft.operations;
            for (stream, (x, y), (w, h)) in draft.images {
                image_counter += 1;
                let name = format!("Im{}", image_counter);
                let image_id = doc.add_object(stream);
                xobjects.set(name.as_bytes().to_vec(), image_id);

                operations.push(Operation::new("q", vec![]));
                operations.push(Operation::new(
                    "cm",
                    vec![
                        w.into(),
                        0.into(),
                        0.into(),
                        h.into(),
                        x.into(),
                        y.into(),
                    ],
                ));
                operations.push(Operation::new("Do", vec![name.as_str().into()]));
                operations.push(Operation::new("Q", vec![]));
            }

            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content
                    .encode()
                    .map_err(|e| AppError::Internal(format!("PDF encoding failed: {}", e)))?,
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => regular_id,
                "F2" => bold_id,
            },
            "XObject" => xobjects,
        });

        let count = kids.len() as i32;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| AppError::Internal(format!("PDF serialization failed: {}", e)))?;
        Ok(bytes)
    }
}

fn embed_truetype(doc: &mut Document, bytes: Vec<u8>) -> lopdf::ObjectId {
    let length = bytes.len() as i32;
    let font_file_id = doc.add_object(Stream::new(
        dictionary! { "Length1" => length },
        bytes,
    ));
    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => "DejaVuSans",
        "Flags" => 32,
        "FontBBox" => vec![(-1021).into(), (-415).into(), 1681.into(), 1167.into()],
        "ItalicAngle" => 0,
        "Ascent" => 928,
        "Descent" => -236,
        "CapHeight" => 729,
        "StemV" => 80,
        "FontFile2" => font_file_id,
    });
    let widths: Vec<Object> = (32..=255).map(|_| 600.into()).collect();
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "TrueType",
        "BaseFont" => "DejaVuSans",
        "FirstChar" => 32,
        "LastChar" => 255,
        "Widths" => widths,
        "FontDescriptor" => descriptor_id,
        "Encoding" => "WinAnsiEncoding",
    })
}

/// Encode text for the WinAnsi-encoded fonts used above. Characters outside
/// Latin-1 degrade to `?`, which is what the font-fallback warning refers to.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| {
            let code = c as u32;
            if code <= 0xFF {
                code as u8
            } else {
                b'?'
            }
        })
        .collect()
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Artifact;
    use async_trait::async_trait;

    struct StubSummarizer {
        fail: bool,
    }

    #[async_trait]
    impl ReasoningAgent for StubSummarizer {
        async fn invoke(&self, _payload: &str) -> AppResult<String> {
            if self.fail {
                Err(AppError::LLMApi("summarizer offline".to_string()))
            } else {
                Ok("A conversa analisou a distribuição de idades.".to_string())
            }
        }

        async fn invoke_verbose(&self, payload: &str) -> AppResult<String> {
            self.invoke(payload).await
        }
    }

    fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[tokio::test]
    async fn test_export_empty_transcript_with_failing_summarizer() {
        let summarizer = StubSummarizer { fail: true };
        let report = export_transcript(
            &[],
            "Ana",
            &summarizer,
            Path::new("missing/DejaVuSans.ttf"),
        )
        .await
        .unwrap();

        assert!(report.bytes.starts_with(b"%PDF"));
        assert!(report.bytes.len() > 500);
        // The missing font produced a visible warning.
        assert!(report.warnings.iter().any(|w| w.contains("Helvetica")));
        // Title block and the error placeholder made it into the page streams.
        assert!(contains_subslice(&report.bytes, b"rio de An"));
        assert!(contains_subslice(&report.bytes, b"rio executivo"));
    }

    #[tokio::test]
    async fn test_export_renders_entries_and_skips_missing_artifacts() {
        let summarizer = StubSummarizer { fail: false };
        let entries = vec![
            TranscriptEntry::user("Faça um histograma da coluna idade"),
            TranscriptEntry::assistant("Final Answer: histograma gerado.").with_artifacts(vec![
                Artifact {
                    id: uuid::Uuid::new_v4(),
                    path: "missing/plot.png".into(),
                },
            ]),
        ];

        let report = export_transcript(
            &entries,
            "Ana",
            &summarizer,
            Path::new("missing/DejaVuSans.ttf"),
        )
        .await
        .unwrap();

        assert!(report.bytes.starts_with(b"%PDF"));
        assert!(contains_subslice(&report.bytes, b"Agente de IA"));
        assert!(contains_subslice(&report.bytes, b"histograma gerado."));
    }

    #[test]
    fn test_encode_win_ansi() {
        assert_eq!(encode_win_ansi("idade"), b"idade".to_vec());
        assert_eq!(encode_win_ansi("é"), vec![0xE9]);
        assert_eq!(encode_win_ansi("→"), vec![b'?']);
    }

    #[test]
    fn test_wrap_text() {
        let lines = wrap_text("um dois tres quatro cinco", 9);
        assert_eq!(lines, vec!["um dois", "tres", "quatro", "cinco"]);
        assert!(wrap_text("", 10).is_empty());
        // A single oversized word is kept on its own line rather than split.
        assert_eq!(wrap_text("superpalavra", 4), vec!["superpalavra"]);
    }
}
