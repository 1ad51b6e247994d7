//! Utility modules.

pub mod file;
pub mod retry;
pub mod text;

pub use file::{calculate_checksum, is_pdf, is_text_file, read_file_content, read_pdf_content};
pub use retry::{RetryConfig, RetryResult, Retryable, with_retry};
pub use text::{has_content, preview};
