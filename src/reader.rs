use anyhow::Result;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};
use tracing::{debug, info, warn};

/// Configuration for file reading behavior
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Whether to fail fast on first error or continue processing
    pub fail_fast: bool,
    /// Buffer size for async reading (default: 8KB)
    pub buffer_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            fail_fast: false,
            buffer_size: 8192, // WHY: 8KB is optimal for most filesystems and network storage
        }
    }
}

/// Statistics for document reading operations
#[derive(Debug, Clone)]
pub struct ReadStats {
    pub file_path: String,
    pub bytes_read: u64,
    pub chars_read: u64,
    pub duration_ms: u64,
    pub read_error: Option<String>,
}

/// Async reader that loads whole documents and validates their encoding
pub struct AsyncFileReader {
    config: ReaderConfig,
}

impl AsyncFileReader {
    pub fn new(config: ReaderConfig) -> Self {
        Self { config }
    }

    /// Read a whole document with async buffered I/O
    /// WHY: span offsets refer to the exact file text, so content is never split into lines
    pub async fn read_document<P: AsRef<Path>>(
        &self,
        file_path: P,
    ) -> Result<(Option<String>, ReadStats)> {
        let path = file_path.as_ref();
        let start_time = std::time::Instant::now();
        debug!("Starting async read of document: {}", path.display());

        let mut stats = ReadStats {
            file_path: path.display().to_string(),
            bytes_read: 0,
            chars_read: 0,
            duration_ms: 0,
            read_error: None,
        };

        let file = match File::open(path).await {
            Ok(file) => file,
            Err(e) => {
                let error_msg = format!("Failed to open file {}: {}", path.display(), e);
                return self.fail(error_msg, stats, start_time);
            }
        };

        // WHY: BufReader with custom buffer size reduces syscalls and improves throughput
        let mut reader = BufReader::with_capacity(self.config.buffer_size, file);
        let mut bytes = Vec::new();
        if let Err(e) = reader.read_to_end(&mut bytes).await {
            let error_msg = format!("Failed to read file {}: {}", path.display(), e);
            return self.fail(error_msg, stats, start_time);
        }
        stats.bytes_read = bytes.len() as u64;

        let content = match String::from_utf8(bytes) {
            Ok(content) => content,
            Err(e) => {
                let error_msg = format!(
                    "UTF-8 decoding error in {} at byte {}",
                    path.display(),
                    e.utf8_error().valid_up_to()
                );
                return self.fail(error_msg, stats, start_time);
            }
        };

        stats.chars_read = content.chars().count() as u64;
        stats.duration_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Successfully read {}: {} bytes, {} chars in {}ms",
            path.display(),
            stats.bytes_read,
            stats.chars_read,
            stats.duration_ms
        );
        Ok((Some(content), stats))
    }

    fn fail(
        &self,
        error_msg: String,
        mut stats: ReadStats,
        start_time: std::time::Instant,
    ) -> Result<(Option<String>, ReadStats)> {
        warn!("{}", error_msg);
        if self.config.fail_fast {
            return Err(anyhow::anyhow!(error_msg));
        }
        stats.duration_ms = start_time.elapsed().as_millis() as u64;
        stats.read_error = Some(error_msg);
        Ok((None, stats))
    }

    /// Read multiple documents sequentially
    pub async fn read_files_batch<P: AsRef<Path>>(
        &self,
        file_paths: &[P],
    ) -> Result<Vec<(Option<String>, ReadStats)>> {
        info!("Starting batch read of {} files", file_paths.len());

        let mut results = Vec::with_capacity(file_paths.len());
        // WHY: sequential processing ensures memory usage stays bounded for large file sets
        for file_path in file_paths {
            results.push(self.read_document(file_path).await?);
        }

        info!("Completed batch read of {} files", results.len());
        Ok(results)
    }
}

/// Convenience function for reading a single document with default configuration
/// WHY: Simplifies common use case for integration tests and external callers
pub async fn read_file_async<P: AsRef<Path>>(file_path: P) -> Result<String> {
    let reader = AsyncFileReader::new(ReaderConfig {
        fail_fast: true,
        ..ReaderConfig::default()
    });
    let (content, _stats) = reader.read_document(file_path).await?;
    Ok(content.unwrap_or_default())
}
