mod directory;
mod docx;
mod html;
#[cfg(feature = "pdf")]
mod pdf;
mod text;

pub use directory::{DirectoryLoader, LoadReport, SkippedDocument};
pub use docx::DocxLoader;
pub use html::HtmlLoader;
#[cfg(feature = "pdf")]
pub use pdf::PdfLoader;
pub use text::TextLoader;

use std::path::{Path, PathBuf};

use super::DocumentError;

/// Canonicalize `path` and reject files above `max_size` bytes.
pub(crate) async fn checked_path(path: &Path, max_size: u64) -> Result<PathBuf, DocumentError> {
    let path = tokio::fs::canonicalize(path).await?;
    let meta = tokio::fs::metadata(&path).await?;
    if meta.len() > max_size {
        return Err(DocumentError::FileTooLarge(meta.len()));
    }
    Ok(path)
}

pub(crate) fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}
