use anyhow::{anyhow, Result};
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use glob::glob;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct DiscoveryConfig {
    /// Abort on the first unreadable path instead of reporting it
    pub fail_fast: bool,
}

/// A discovered document, with the reason it cannot be processed if any
#[derive(Debug, Clone)]
pub struct FileValidation {
    pub path: PathBuf,
    pub error: Option<String>,
}

/// Stream every `**/*.txt` document under `root_dir`, checking each is a readable file
pub fn discover_files(
    root_dir: impl AsRef<Path>,
    config: DiscoveryConfig,
) -> Result<impl Stream<Item = Result<FileValidation>>> {
    let pattern = format!("{}/**/*.txt", root_dir.as_ref().display());
    let paths = glob(&pattern).map_err(|e| anyhow!("Invalid discovery pattern {pattern}: {e}"))?;

    Ok(stream::iter(paths).then(move |entry| {
        let fail_fast = config.fail_fast;
        async move {
            // UTF-8 validation happens when the reader loads the document
            let error = match entry {
                Ok(path) => match fs::metadata(&path).await {
                    Ok(metadata) if metadata.is_file() => {
                        return Ok(FileValidation { path, error: None });
                    }
                    Ok(_) => (path.clone(), format!("Path is not a file: {}", path.display())),
                    Err(e) => (path.clone(), format!("Cannot access file {}: {e}", path.display())),
                },
                Err(e) => (e.path().to_path_buf(), format!("Glob iteration error: {e}")),
            };
            let (path, message) = error;
            warn!("{}", message);
            if fail_fast {
                return Err(anyhow!(message));
            }
            Ok(FileValidation {
                path,
                error: Some(message),
            })
        }
    }))
}

/// Drain [`discover_files`] into a Vec, logging a validity summary
pub async fn collect_discovered_files(
    root_dir: impl AsRef<Path>,
    config: DiscoveryConfig,
) -> Result<Vec<FileValidation>> {
    let files: Vec<FileValidation> = discover_files(root_dir, config)?.try_collect().await?;

    let invalid_count = files.iter().filter(|f| f.error.is_some()).count();
    info!(
        "Document discovery summary: {} valid, {} invalid",
        files.len() - invalid_count,
        invalid_count
    );
    Ok(files)
}

/// Valid document paths under `root_dir`, sorted
pub async fn find_text_files<P: AsRef<Path>>(root_dir: P) -> Result<Vec<PathBuf>> {
    let mut valid_files: Vec<PathBuf> = collect_discovered_files(root_dir, DiscoveryConfig::default())
        .await?
        .into_iter()
        .filter(|v| v.error.is_none())
        .map(|v| v.path)
        .collect();
    valid_files.sort();
    Ok(valid_files)
}
