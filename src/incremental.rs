// WHY: Public utilities for incremental batch runs
// Provides helpers for result-file naming and I/O used by the CLI, parallel driver and tests

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::pipeline::ExtractionResult;

/// Generate result file path from source document path: `<stem>_citations.json`
pub fn generate_result_path(source_path: &Path) -> PathBuf {
    let mut result_path = source_path.to_path_buf();
    let file_stem = result_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");
    result_path.set_file_name(format!("{file_stem}_citations.json"));
    result_path
}

/// Check if a result file exists for given source document
/// WHY: Core utility for incremental processing - check if work is already done
pub fn result_file_exists<P: AsRef<Path>>(source_path: P) -> bool {
    generate_result_path(source_path.as_ref()).exists()
}

/// Serialize an extraction result next to its source document
///
/// # Example
/// ```no_run
/// use citespan::{incremental::write_result_file, CitationEngine};
/// let engine = CitationEngine::with_defaults().expect("patterns compile");
/// let result = engine.extract("A claim [1].");
/// write_result_file("path/to/paper.txt", &result).expect("Failed to write result file");
/// ```
pub fn write_result_file<P: AsRef<Path>>(source_path: P, result: &ExtractionResult) -> Result<PathBuf> {
    let result_path = generate_result_path(source_path.as_ref());
    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(&result_path, json)
        .with_context(|| format!("Failed to write {}", result_path.display()))?;
    Ok(result_path)
}

/// Async variant used by the parallel driver
pub async fn write_result_file_async<P: AsRef<Path>>(
    source_path: P,
    result: &ExtractionResult,
) -> Result<PathBuf> {
    let result_path = generate_result_path(source_path.as_ref());
    let json = serde_json::to_string_pretty(result)?;
    tokio::fs::write(&result_path, json)
        .await
        .with_context(|| format!("Failed to write {}", result_path.display()))?;
    Ok(result_path)
}

/// Load a previously written result for given source document
pub fn read_result_file<P: AsRef<Path>>(source_path: P) -> Result<ExtractionResult> {
    let result_path = generate_result_path(source_path.as_ref());
    let content = std::fs::read_to_string(&result_path)
        .with_context(|| format!("Failed to read {}", result_path.display()))?;
    Ok(serde_json::from_str(&content)?)
}
