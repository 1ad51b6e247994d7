//! Local directory loader.

use glob::{MatchOptions, Pattern};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::IngestError;
use crate::models::{Document, DocumentMetadata};
use crate::utils::{
    calculate_checksum, has_content, is_pdf, is_text_file, read_file_content, read_pdf_content,
};

/// Documents read from a directory, plus what was left behind.
#[derive(Debug, Default)]
pub struct LoadedDocuments {
    pub documents: Vec<Document>,
    pub files_matched: usize,
    /// Matched files that were unreadable, undecodable or blank.
    pub skipped: Vec<PathBuf>,
}

/// Loads every file under a directory whose relative path matches a glob.
///
/// `**/*.pdf` files go through PDF text extraction; everything else is read
/// as UTF-8 text.
#[derive(Debug)]
pub struct LocalSource {
    root: PathBuf,
    pattern: Pattern,
    max_file_size: u64,
}

impl LocalSource {
    pub fn new(root: PathBuf, pattern: &str, max_file_size: u64) -> Result<Self, IngestError> {
        let pattern = Pattern::new(pattern)
            .map_err(|e| IngestError::InvalidPattern(format!("{pattern}: {e}")))?;

        Ok(Self {
            root,
            pattern,
            max_file_size,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Collect matching files in a stable, sorted order.
    pub fn collect_files(&self) -> Result<Vec<PathBuf>, IngestError> {
        if !self.root.is_dir() {
            return Err(IngestError::WalkError(format!(
                "not a directory: {}",
                self.root.display()
            )));
        }

        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|e| IngestError::WalkError(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            if self.pattern.matches_path_with(relative, options) {
                files.push(path.to_path_buf());
            }
        }

        Ok(files)
    }

    /// Read a single file into a document.
    pub fn read_document(&self, path: &Path) -> std::io::Result<Document> {
        let content = if is_pdf(path) {
            read_pdf_content(path, self.max_file_size)?
        } else if is_text_file(path) {
            read_file_content(path, self.max_file_size)?
        } else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "binary file",
            ));
        };

        let checksum = calculate_checksum(&content);
        let metadata = DocumentMetadata {
            filename: path.file_name().map(|n| n.to_string_lossy().to_string()),
            extension: path.extension().map(|e| e.to_string_lossy().to_string()),
            size_bytes: content.len() as u64,
        };

        Ok(Document::new(
            content,
            path.to_string_lossy().to_string(),
            checksum,
            metadata,
        ))
    }

    /// Load every matching file. Unreadable and blank files are skipped.
    pub fn load(&self) -> Result<LoadedDocuments, IngestError> {
        let files = self.collect_files()?;
        let mut loaded = LoadedDocuments {
            files_matched: files.len(),
            ..Default::default()
        };

        for path in files {
            match self.read_document(&path) {
                Ok(document) if has_content(&document.content) => {
                    debug!(path = %path.display(), chars = document.content.len(), "loaded document");
                    loaded.documents.push(document);
                }
                Ok(_) => {
                    debug!(path = %path.display(), "skipping blank file");
                    loaded.skipped.push(path);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable file");
                    loaded.skipped.push(path);
                }
            }
        }

        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("db1/sub")).unwrap();
        fs::write(dir.path().join("top.txt"), "Oben.").unwrap();
        fs::write(dir.path().join("db1/a.txt"), "Datenbank eins.").unwrap();
        fs::write(dir.path().join("db1/sub/b.txt"), "Tiefer.").unwrap();
        fs::write(dir.path().join("db1/notes.md"), "# Notizen").unwrap();
        fs::write(dir.path().join("db1/empty.txt"), "  \n").unwrap();
        dir
    }

    #[test]
    fn test_default_pattern_matches_all_depths() {
        let dir = tree();
        let source = LocalSource::new(dir.path().to_path_buf(), "**/*.txt", 1024).unwrap();
        let files = source.collect_files().unwrap();
        assert_eq!(files.len(), 4);
        assert!(files.iter().all(|f| f.extension().unwrap() == "txt"));
    }

    #[test]
    fn test_pattern_selects_extension() {
        let dir = tree();
        let source = LocalSource::new(dir.path().to_path_buf(), "**/*.md", 1024).unwrap();
        let loaded = source.load().unwrap();
        assert_eq!(loaded.files_matched, 1);
        assert_eq!(loaded.documents[0].content, "# Notizen");
        assert_eq!(loaded.documents[0].metadata.extension.as_deref(), Some("md"));
    }

    #[test]
    fn test_blank_and_oversized_files_are_skipped() {
        let dir = tree();
        fs::write(dir.path().join("db1/big.txt"), "x".repeat(2048)).unwrap();
        let source = LocalSource::new(dir.path().to_path_buf(), "db1/*.txt", 1024).unwrap();

        let loaded = source.load().unwrap();
        assert_eq!(loaded.files_matched, 3);
        assert_eq!(loaded.documents.len(), 1);
        assert_eq!(loaded.skipped.len(), 2);
        assert!(loaded.documents[0].source.ends_with("a.txt"));
    }

    #[test]
    fn test_broken_pdf_is_skipped() {
        let dir = tree();
        fs::write(dir.path().join("db1/kaputt.pdf"), b"%PDF-1.4\nnot really a pdf").unwrap();
        let source = LocalSource::new(dir.path().to_path_buf(), "**/*.pdf", 1024).unwrap();

        let loaded = source.load().unwrap();
        assert_eq!(loaded.files_matched, 1);
        assert!(loaded.documents.is_empty());
        assert_eq!(loaded.skipped.len(), 1);
    }

    #[test]
    fn test_source_is_file_path() {
        let dir = tree();
        let source = LocalSource::new(dir.path().to_path_buf(), "top.txt", 1024).unwrap();
        let loaded = source.load().unwrap();
        assert_eq!(
            loaded.documents[0].source,
            dir.path().join("top.txt").to_string_lossy()
        );
    }

    #[test]
    fn test_invalid_pattern() {
        let err = LocalSource::new(PathBuf::from("."), "**/[", 1024).unwrap_err();
        assert!(matches!(err, IngestError::InvalidPattern(_)));
    }

    #[test]
    fn test_missing_directory() {
        let source = LocalSource::new(PathBuf::from("/nonexistent/ragchat"), "**/*.txt", 1024)
            .unwrap();
        assert!(matches!(
            source.collect_files().unwrap_err(),
            IngestError::WalkError(_)
        ));
    }
}
