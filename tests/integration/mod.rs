// Integration test utilities and common code
// WHY: Centralized utilities avoid duplication across integration tests
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use citespan::incremental::generate_result_path;
use citespan::ExtractionResult;

/// Test fixture helper for creating temporary directories with text documents
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub root_path: PathBuf,
}

impl TestFixture {
    /// Create a new test fixture with temporary directory
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root_path = temp_dir.path().to_path_buf();

        Self {
            temp_dir,
            root_path,
        }
    }

    /// Create a document with given content, creating parent directories as needed
    pub fn create_document<P: AsRef<Path>>(&self, relative_path: P, content: &str) -> PathBuf {
        self.create_raw_document(relative_path, content.as_bytes())
    }

    /// Create a document from raw bytes (for encoding failures)
    pub fn create_raw_document<P: AsRef<Path>>(&self, relative_path: P, content: &[u8]) -> PathBuf {
        let file_path = self.root_path.join(relative_path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        fs::write(&file_path, content).expect("Failed to write test file");
        file_path
    }

    pub fn result_exists<P: AsRef<Path>>(&self, source_path: P) -> bool {
        generate_result_path(source_path.as_ref()).exists()
    }

    /// Parse the result file written for a source document
    pub fn read_result<P: AsRef<Path>>(&self, source_path: P) -> ExtractionResult {
        let content = fs::read_to_string(generate_result_path(source_path.as_ref()))
            .expect("Failed to read result file");
        serde_json::from_str(&content).expect("Result file should be valid JSON")
    }

    pub fn stats_path(&self) -> PathBuf {
        self.root_path.join("run_stats.json")
    }
}

/// Slice `text` by character offsets, as recorded in span records
pub fn char_slice(text: &str, start: usize, end: usize) -> String {
    text.chars().skip(start).take(end.saturating_sub(start)).collect()
}
