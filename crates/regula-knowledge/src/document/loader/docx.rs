use std::io::Read;
use std::path::Path;
use std::pin::Pin;
use std::sync::LazyLock;

use regex::Regex;

use super::super::{
    DEFAULT_MAX_FILE_SIZE, Document, DocumentError, DocumentLoader, DocumentMetadata,
};
use super::checked_path;

const BODY_PART: &str = "word/document.xml";

/// Text runs, paragraph ends, tabs and line breaks of a WordprocessingML body.
static BODY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<w:t(?:\s[^>]*)?>(?P<text>[^<]*)</w:t>|(?P<para></w:p>)|(?P<tab><w:tab/>)|(?P<br><w:br/>)")
        .unwrap()
});

/// Loads the body text of a DOCX file as one document, paragraphs separated by
/// blank lines.
pub struct DocxLoader {
    pub max_file_size: u64,
}

impl Default for DocxLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentLoader for DocxLoader {
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

            let content = tokio::task::spawn_blocking(move || read_body(&path))
                .await
                .map_err(|e| DocumentError::Docx(e.to_string()))??;

            Ok(vec![Document::new(
                extract_text(&content),
                DocumentMetadata::new(source, "docx"),
            )])
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["docx"]
    }
}

fn read_body(path: &Path) -> Result<String, DocumentError> {
    let file = std::fs::File::open(path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| DocumentError::Docx(e.to_string()))?;
    let mut part = archive
        .by_name(BODY_PART)
        .map_err(|e| DocumentError::Docx(format!("{BODY_PART}: {e}")))?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)?;
    Ok(xml)
}

fn extract_text(xml: &str) -> String {
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    for caps in BODY_RE.captures_iter(xml) {
        if let Some(text) = caps.name("text") {
            current.push_str(&unescape(text.as_str()));
        } else if caps.name("tab").is_some() {
            current.push('\t');
        } else if caps.name("br").is_some() {
            current.push('\n');
        } else if caps.name("para").is_some() {
            let paragraph = std::mem::take(&mut current);
            if !paragraph.trim().is_empty() {
                paragraphs.push(paragraph);
            }
        }
    }
    if !current.trim().is_empty() {
        paragraphs.push(current);
    }
    paragraphs.join("\n\n")
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
