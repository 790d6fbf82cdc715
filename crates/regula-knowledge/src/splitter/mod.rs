//! Document chunking.
//!
//! Both splitters measure sizes in characters and record byte offsets, so every
//! chunk is an exact slice of its document. Splitting is pure: the same input
//! and configuration always yield the same chunk boundaries.

mod article;
mod recursive;

pub use article::ArticleAwareSplitter;
pub use recursive::RecursiveSplitter;

use serde::{Deserialize, Serialize};

use crate::document::{Chunk, ChunkId, Document};

/// Paragraph break, line break, sentence break, whitespace. Raw character
/// cutting is the implicit last level.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SplitterError {
    #[error("chunk_size must be greater than 0")]
    ZeroChunkSize,

    #[error("chunk_overlap ({overlap}) must be less than chunk_size ({chunk_size})")]
    OverlapTooLarge { overlap: usize, chunk_size: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Separators tried in order, coarsest first.
    pub separators: Vec<String>,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            separators: DEFAULT_SEPARATORS.iter().map(|s| (*s).to_owned()).collect(),
        }
    }
}

impl SplitterConfig {
    #[must_use]
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            ..Self::default()
        }
    }

    /// # Errors
    ///
    /// Returns an error unless `0 <= chunk_overlap < chunk_size`.
    pub fn validate(&self) -> Result<(), SplitterError> {
        if self.chunk_size == 0 {
            return Err(SplitterError::ZeroChunkSize);
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(SplitterError::OverlapTooLarge {
                overlap: self.chunk_overlap,
                chunk_size: self.chunk_size,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitterKind {
    #[default]
    Recursive,
    ArticleAware,
}

/// The configured splitting algorithm.
#[derive(Debug, Clone)]
pub enum Splitter {
    Recursive(RecursiveSplitter),
    ArticleAware(ArticleAwareSplitter),
}

impl Splitter {
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(kind: SplitterKind, config: SplitterConfig) -> Result<Self, SplitterError> {
        config.validate()?;
        let recursive = RecursiveSplitter::new(config);
        Ok(match kind {
            SplitterKind::Recursive => Self::Recursive(recursive),
            SplitterKind::ArticleAware => Self::ArticleAware(ArticleAwareSplitter::new(recursive)),
        })
    }

    #[must_use]
    pub fn config(&self) -> &SplitterConfig {
        match self {
            Self::Recursive(s) => s.config(),
            Self::ArticleAware(s) => s.config(),
        }
    }

    /// Split one document into chunks in reading order.
    #[must_use]
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        match self {
            Self::Recursive(s) => s.split(document),
            Self::ArticleAware(s) => s.split(document),
        }
    }

    /// Split many documents; sequence indices restart at 0 for each document.
    #[must_use]
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|d| self.split(d)).collect()
    }
}

/// A chunk boundary before materialization: byte span plus optional heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Span {
    pub start: usize,
    pub end: usize,
    pub section: Option<String>,
}

/// Turn spans into chunks, skipping whitespace-only spans and numbering the
/// rest from 0.
pub(crate) fn materialize(document: &Document, spans: Vec<Span>) -> Vec<Chunk> {
    spans
        .into_iter()
        .filter(|s| !document.content[s.start..s.end].trim().is_empty())
        .enumerate()
        .map(|(sequence, span)| {
            let mut metadata = document.metadata.clone();
            if span.section.is_some() {
                metadata.section = span.section;
            }
            Chunk {
                id: ChunkId::new(&metadata, sequence),
                text: document.content[span.start..span.end].to_owned(),
                start: span.start,
                end: span.end,
                sequence,
                metadata,
            }
        })
        .collect()
}
