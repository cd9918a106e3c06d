use std::path::{Path, PathBuf};

use csv::ReaderBuilder;

use crate::types::{AppError, AppResult};

const PREVIEW_ROWS: usize = 5;

/// An uploaded tabular dataset, profiled at upload time so the delegation
/// payload can describe it to the reasoning agent and the client can echo a
/// sample back to the user.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DatasetRecord {
    pub id: String,
    pub filename: String,
    pub local_path: PathBuf,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub preview: Vec<Vec<String>>,
}

impl DatasetRecord {
    /// Base name used to derive the exported report filename.
    pub fn base_name(&self) -> &str {
        self.filename
            .split('.')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("analise")
    }

    /// One-paragraph description handed to the reasoning agent.
    pub fn describe(&self) -> String {
        format!(
            "{} ({} linhas; colunas: {}) disponível em {}",
            self.filename,
            self.row_count,
            self.columns.join(", "),
            self.local_path.display()
        )
    }
}

/// Profile a CSV file: headers, total row count and a head preview.
///
/// An unparseable upload is surfaced immediately and leaves no session state
/// behind; the caller only installs the record on success.
pub fn profile_csv(path: &Path, filename: &str) -> AppResult<DatasetRecord> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| AppError::Dataset(format!("Failed to open {}: {}", filename, e)))?;

    let columns: Vec<String> = rdr
        .headers()
        .map_err(|e| AppError::Dataset(format!("Failed to read headers of {}: {}", filename, e)))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    if columns.is_empty() {
        return Err(AppError::Dataset(format!("{} has no columns", filename)));
    }

    let mut row_count = 0usize;
    let mut preview = Vec::new();
    for record in rdr.records() {
        let record =
            record.map_err(|e| AppError::Dataset(format!("Malformed row in {}: {}", filename, e)))?;
        if preview.len() < PREVIEW_ROWS {
            preview.push(record.iter().map(|v| v.to_string()).collect());
        }
        row_count += 1;
    }

    Ok(DatasetRecord {
        id: uuid::Uuid::new_v4().to_string(),
        filename: filename.to_string(),
        local_path: path.to_path_buf(),
        columns,
        row_count,
        preview,
    })
}
