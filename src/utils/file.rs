//! File utilities for ingestion.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("valid regex"));
static TRAILING_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+\n").expect("valid regex"));

/// Calculate SHA-256 checksum of content.
pub fn calculate_checksum(content: &str) -> String {
    let hash = Sha256::digest(content.as_bytes());
    hex::encode(hash)
}

/// Whether the path has a `.pdf` extension (case-insensitive).
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("pdf"))
}

/// Check if a file is likely a text file.
///
/// Known binary extensions are rejected outright; anything else is sniffed
/// for NUL bytes in its first 512 bytes.
pub fn is_text_file(path: &Path) -> bool {
    if let Some(ext) = path.extension() {
        let ext = ext.to_string_lossy().to_lowercase();
        if is_binary_extension(&ext) {
            return false;
        }
    }

    let Ok(file) = fs::File::open(path) else {
        return false;
    };
    let mut buffer = [0u8; 512];
    let mut reader = std::io::BufReader::new(file);
    match reader.read(&mut buffer) {
        Ok(0) => true,
        Ok(n) => !buffer[..n].contains(&0),
        Err(_) => false,
    }
}

/// Read file content with size limit.
pub fn read_file_content(path: &Path, max_size: u64) -> std::io::Result<String> {
    check_size(path, max_size)?;
    fs::read_to_string(path)
}

/// Extract the plain text of a PDF with size limit.
pub fn read_pdf_content(path: &Path, max_size: u64) -> std::io::Result<String> {
    check_size(path, max_size)?;
    let text = guarded_extract(|| pdf_extract::extract_text(path))?;
    Ok(normalize_extracted_text(&text))
}

/// Run an extractor, turning an error or a panic inside it into `InvalidData`.
///
/// Some malformed PDFs make the extractor panic; the file is then skipped
/// like any other unreadable one.
fn guarded_extract<E: std::fmt::Display>(
    extract: impl FnOnce() -> Result<String, E> + std::panic::UnwindSafe,
) -> std::io::Result<String> {
    let invalid = |msg: String| std::io::Error::new(std::io::ErrorKind::InvalidData, msg);
    match std::panic::catch_unwind(extract) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(invalid(e.to_string())),
        Err(_) => Err(invalid("PDF extraction panicked".to_string())),
    }
}

fn check_size(path: &Path, max_size: u64) -> std::io::Result<()> {
    let metadata = fs::metadata(path)?;
    if metadata.len() > max_size {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "file exceeds maximum size: {} > {}",
                metadata.len(),
                max_size
            ),
        ));
    }
    Ok(())
}

/// Collapse the whitespace noise PDF extraction leaves behind.
pub fn normalize_extracted_text(text: &str) -> String {
    let text = TRAILING_SPACE.replace_all(text, "\n");
    let text = BLANK_RUNS.replace_all(&text, "\n\n");
    text.trim().to_string()
}

fn is_binary_extension(ext: &str) -> bool {
    matches!(
        ext,
        "exe"
            | "dll"
            | "so"
            | "dylib"
            | "o"
            | "png"
            | "jpg"
            | "jpeg"
            | "gif"
            | "webp"
            | "mp3"
            | "mp4"
            | "wav"
            | "zip"
            | "tar"
            | "gz"
            | "7z"
            | "doc"
            | "docx"
            | "xls"
            | "xlsx"
            | "ppt"
            | "pptx"
            | "db"
            | "sqlite"
            | "bin"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_calculate_checksum() {
        let checksum = calculate_checksum("hello world");
        assert_eq!(checksum.len(), 64);
        assert_eq!(checksum, calculate_checksum("hello world"));
    }

    #[test]
    fn test_extraction_panic_becomes_invalid_data() {
        let err = guarded_extract(|| -> Result<String, String> { panic!("broken xref table") })
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);

        let err = guarded_extract(|| Err::<String, _>("no pages")).unwrap_err();
        assert_eq!(err.to_string(), "no pages");
        assert_eq!(guarded_extract(|| Ok::<_, String>("Text".into())).unwrap(), "Text");
    }

    #[test]
    fn test_garbage_pdf_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kaputt.pdf");
        fs::write(&path, b"%PDF-1.4\nnot really a pdf").unwrap();
        let err = read_pdf_content(&path, 1024 * 1024).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_is_pdf() {
        assert!(is_pdf(&PathBuf::from("/data/db1/Handbuch.PDF")));
        assert!(is_pdf(&PathBuf::from("report.pdf")));
        assert!(!is_pdf(&PathBuf::from("notes.txt")));
        assert!(!is_pdf(&PathBuf::from("pdf")));
    }

    #[test]
    fn test_is_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("a.txt");
        std::fs::write(&text, "plain text").unwrap();
        assert!(is_text_file(&text));

        let binary = dir.path().join("blob.dat");
        std::fs::write(&binary, [0u8, 159, 146, 150]).unwrap();
        assert!(!is_text_file(&binary));

        assert!(!is_text_file(&dir.path().join("image.png")));
    }

    #[test]
    fn test_read_file_content_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, "x".repeat(100)).unwrap();

        assert!(read_file_content(&path, 10).is_err());
        assert_eq!(read_file_content(&path, 1000).unwrap().len(), 100);
    }

    #[test]
    fn test_normalize_extracted_text() {
        let raw = "  Title  \n\n\n\nFirst line   \nSecond line\n \n \n\nEnd\n";
        assert_eq!(
            normalize_extracted_text(raw),
            "Title\n\nFirst line\nSecond line\n\nEnd"
        );
    }
}
