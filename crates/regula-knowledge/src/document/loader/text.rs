use std::path::Path;
use std::pin::Pin;

use super::super::{
    DEFAULT_MAX_FILE_SIZE, Document, DocumentError, DocumentLoader, DocumentMetadata,
};
use super::{checked_path, extension};

pub struct TextLoader {
    pub max_file_size: u64,
}

impl Default for TextLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentLoader for TextLoader {
    fn load(
        &self,
        path: &Path,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<Document>, DocumentError>> + Send + '_>>
    {
        let path = path.to_path_buf();
        let max_size = self.max_file_size;
        Box::pin(async move {
            let path = checked_path(&path, max_size).await?;
            let format = match extension(&path).as_str() {
                "md" | "markdown" => "md",
                _ => "txt",
            };
            let content = tokio::fs::read_to_string(&path).await?;

            Ok(vec![Document::new(
                content,
                DocumentMetadata::new(path.display().to_string(), format),
            )])
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["txt", "md", "markdown"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("directive.txt");
        std::fs::write(&file, "Article 1: Scope.").unwrap();

        let docs = TextLoader::default().load(&file).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "Article 1: Scope.");
        assert_eq!(docs[0].metadata.format, "txt");
        assert!(docs[0].metadata.page.is_none());
    }

    #[tokio::test]
    async fn markdown_format_tag() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("guide.MD");
        std::fs::write(&file, "# Guide").unwrap();

        let docs = TextLoader::default().load(&file).await.unwrap();
        assert_eq!(docs[0].metadata.format, "md");
    }

    #[tokio::test]
    async fn source_is_canonical_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "data").unwrap();

        let docs = TextLoader::default().load(&file).await.unwrap();
        let canonical = std::fs::canonicalize(&file).unwrap();
        assert_eq!(docs[0].metadata.source, canonical.display().to_string());
    }

    #[tokio::test]
    async fn missing_file_errors() {
        let result = TextLoader::default()
            .load(Path::new("/nonexistent/regula/file.txt"))
            .await;
        assert!(matches!(result, Err(DocumentError::Io(_))));
    }

    #[tokio::test]
    async fn oversized_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("big.txt");
        std::fs::write(&file, "xx").unwrap();

        let loader = TextLoader { max_file_size: 1 };
        assert!(matches!(
            loader.load(&file).await,
            Err(DocumentError::FileTooLarge(2))
        ));
    }
}
