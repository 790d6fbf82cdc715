use std::path::Path;
use std::pin::Pin;

use super::super::{
    DEFAULT_MAX_FILE_SIZE, Document, DocumentError, DocumentLoader, DocumentMetadata,
};
use super::checked_path;

const BLOCK_SELECTOR: &str = "h1, h2, h3, h4, h5, h6, p, li, td, pre, blockquote";

/// Extracts visible block text from HTML, one paragraph per block element.
pub struct HtmlLoader {
    pub max_file_size: u64,
}

impl Default for HtmlLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentLoader for HtmlLoader {
    fn load(
        &self,
        path: &Path,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<Document>, DocumentError>> + Send + '_>>
    {
        let path = path.to_path_buf();
        let max_size = self.max_file_size;
        Box::pin(async move {
            let path = checked_path(&path, max_size).await?;
            let html = tokio::fs::read_to_string(&path).await?;
            let source = path.display().to_string();

            let (content, title) = tokio::task::spawn_blocking(move || extract_text(&html))
                .await
                .map_err(|e| DocumentError::Html(e.to_string()))??;

            let mut metadata = DocumentMetadata::new(source, "html");
            if let Some(title) = title {
                metadata.extra.insert("title".into(), title);
            }
            Ok(vec![Document::new(content, metadata)])
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["html", "htm"]
    }
}

fn extract_text(html: &str) -> Result<(String, Option<String>), DocumentError> {
    let soup = scrape_core::Soup::parse(html);

    let title = soup
        .find_all("title")
        .map_err(|e| DocumentError::Html(format!("invalid selector: {e}")))?
        .into_iter()
        .map(|t| t.text().trim().to_owned())
        .find(|t| !t.is_empty());

    let blocks: Vec<String> = soup
        .find_all(BLOCK_SELECTOR)
        .map_err(|e| DocumentError::Html(format!("invalid selector: {e}")))?
        .into_iter()
        .map(|tag| collapse_whitespace(&tag.text()))
        .filter(|t| !t.is_empty())
        .collect();

    if !blocks.is_empty() {
        return Ok((blocks.join("\n\n"), title));
    }

    let body = soup
        .find_all("body")
        .map_err(|e| DocumentError::Html(format!("invalid selector: {e}")))?
        .into_iter()
        .map(|tag| collapse_whitespace(&tag.text()))
        .collect::<Vec<_>>()
        .join("\n\n");
    Ok((body, title))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
