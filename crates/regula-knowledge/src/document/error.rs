use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("file too large: {0} bytes")]
    FileTooLarge(u64),

    #[error("document directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("directory walk failed: {0}")]
    Walk(#[from] ignore::Error),

    #[cfg(feature = "pdf")]
    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("HTML error: {0}")]
    Html(String),

    #[error("DOCX error: {0}")]
    Docx(String),
}
