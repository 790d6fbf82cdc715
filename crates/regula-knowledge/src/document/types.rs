use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Provenance carried from a loaded document into every chunk cut from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Path or URL the document was read from.
    pub source: String,
    /// Format tag: `txt`, `md`, `html`, `pdf`, `docx`.
    pub format: String,
    /// One-based page number for paged formats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Section heading (e.g. `Article 21`) when the splitter recognized one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl DocumentMetadata {
    #[must_use]
    pub fn new(source: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            format: format.into(),
            page: None,
            section: None,
            extra: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }
}

/// A loaded document record. Immutable once produced by a loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    #[must_use]
    pub fn new(content: impl Into<String>, metadata: DocumentMetadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }
}

/// A contiguous span of one document.
///
/// `start..end` are byte offsets into the owning [`Document::content`], so
/// `&document.content[chunk.start..chunk.end] == chunk.text` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub start: usize,
    pub end: usize,
    /// Position of the chunk within its document, starting at 0.
    pub sequence: usize,
    pub metadata: DocumentMetadata,
}

impl Chunk {
    /// Short human-readable provenance: `source (page N) [section]`.
    #[must_use]
    pub fn provenance(&self) -> String {
        let mut out = self.metadata.source.clone();
        if let Some(page) = self.metadata.page {
            out.push_str(&format!(" (page {page})"));
        }
        if let Some(section) = &self.metadata.section {
            out.push_str(&format!(" [{section}]"));
        }
        out
    }

    /// BLAKE3 hex digest of the chunk text; the embedding cache key.
    #[must_use]
    pub fn content_hash(&self) -> String {
        content_hash(&self.text)
    }
}

#[must_use]
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// Stable chunk identifier derived from source, page and sequence index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    #[must_use]
    pub fn new(metadata: &DocumentMetadata, sequence: usize) -> Self {
        match metadata.page {
            Some(page) => Self(format!("{}#p{page}#{sequence}", metadata.source)),
            None => Self(format!("{}#{sequence}", metadata.source)),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(meta: DocumentMetadata) -> Chunk {
        Chunk {
            id: ChunkId::new(&meta, 3),
            text: "text".into(),
            start: 0,
            end: 4,
            sequence: 3,
            metadata: meta,
        }
    }

    #[test]
    fn provenance_includes_page_and_section() {
        let mut meta = DocumentMetadata::new("nis2.pdf", "pdf").with_page(4);
        meta.section = Some("Article 21".into());
        assert_eq!(chunk(meta).provenance(), "nis2.pdf (page 4) [Article 21]");
    }

    #[test]
    fn provenance_plain_source() {
        let meta = DocumentMetadata::new("notes.txt", "txt");
        assert_eq!(chunk(meta).provenance(), "notes.txt");
    }

    #[test]
    fn chunk_ids_distinguish_pages() {
        let a = DocumentMetadata::new("a.pdf", "pdf").with_page(1);
        let b = DocumentMetadata::new("a.pdf", "pdf").with_page(2);
        assert_ne!(ChunkId::new(&a, 0), ChunkId::new(&b, 0));
        assert_eq!(ChunkId::new(&a, 0).as_str(), "a.pdf#p1#0");
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("abc").len(), 64);
    }

    #[test]
    fn metadata_serde_skips_empty_fields() {
        let json = serde_json::to_string(&DocumentMetadata::new("a.txt", "txt")).unwrap();
        assert_eq!(json, r#"{"source":"a.txt","format":"txt"}"#);
    }
}
