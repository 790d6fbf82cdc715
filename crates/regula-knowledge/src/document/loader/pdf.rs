use std::path::Path;
use std::pin::Pin;

use super::super::{
    DEFAULT_MAX_FILE_SIZE, Document, DocumentError, DocumentLoader, DocumentMetadata,
};
use super::checked_path;

/// Loads a PDF as one document record per page.
pub struct PdfLoader {
    pub max_file_size: u64,
}

impl Default for PdfLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentLoader for PdfLoader {
    fn load(
        &self,
        path: &Path,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<Document>, DocumentError>> + Send + '_>>
    {
        let path = path.to_path_buf();
        let max_size = self.max_file_size;
        Box::pin(async move {
            let path = checked_path(&path, max_size).await?;
            let source = path.display().to_string();

            let content = tokio::task::spawn_blocking(move || {
                pdf_extract::extract_text(&path).map_err(|e| DocumentError::Pdf(e.to_string()))
            })
            .await
            .map_err(|e| DocumentError::Pdf(e.to_string()))??;

            Ok(split_pages(&content, &source))
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["pdf"]
    }
}

/// Split extracted text on form feeds into per-page records, dropping blank pages.
fn split_pages(content: &str, source: &str) -> Vec<Document> {
    content
        .split('\u{c}')
        .zip(1_u32..)
        .filter(|(page, _)| !page.trim().is_empty())
        .map(|(page, number)| {
            Document::new(
                page,
                DocumentMetadata::new(source, "pdf").with_page(number),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_numbered_from_one() {
        let docs = split_pages("first\u{c}\u{c}third", "a.pdf");
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].metadata.page, Some(1));
        assert_eq!(docs[1].metadata.page, Some(3));
        assert_eq!(docs[1].content, "third");
    }

    #[tokio::test]
    async fn invalid_pdf_errors() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.pdf");
        std::fs::write(&file, "not a pdf").unwrap();
        assert!(PdfLoader::default().load(&file).await.is_err());
    }
}
