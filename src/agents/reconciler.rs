//! Artifact Reconciler
//!
//! Claims chart images the reasoning agent's generated code dropped into the
//! working directory and relocates them into the managed artifact directory
//! under collision-free names. Non-image files are ignored: not claimed, not
//! deleted.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use tracing::info;

use crate::models::Artifact;
use crate::types::AppResult;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp"];

fn is_image(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            IMAGE_EXTENSIONS.iter().any(|known| *known == ext)
        })
        .unwrap_or(false)
}

/// Snapshot the plain-file names currently present in a directory.
pub fn snapshot_files(dir: &Path) -> AppResult<HashSet<String>> {
    let mut names = HashSet::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

/// Relocate each candidate image into the managed artifact directory under a
/// fresh unique name.
///
/// Candidates come from an unordered set difference, so the returned order is
/// unspecified relative to generation order when one turn produced several
/// charts; filenames are visited in sorted order only for determinism.
pub fn reconcile(
    working_dir: &Path,
    plots_dir: &Path,
    new_files: &HashSet<String>,
) -> AppResult<Vec<Artifact>> {
    let mut candidates: Vec<&String> = new_files.iter().filter(|name| is_image(name)).collect();
    candidates.sort();

    let mut artifacts = Vec::new();
    for filename in candidates {
        fs::create_dir_all(plots_dir)?;

        let id = uuid::Uuid::new_v4();
        let destination = plots_dir.join(format!("{}.png", id));
        fs::rename(working_dir.join(filename), &destination)?;
        info!(source = %filename, destination = %destination.display(), "Claimed artifact");

        artifacts.push(Artifact {
            id,
            path: destination,
        });
    }

    Ok(artifacts)
}

/// Purge the managed artifact directory wholesale. Used on session reset and
/// logout; a directory that never existed is not an error.
pub fn purge_artifacts(plots_dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(plots_dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
