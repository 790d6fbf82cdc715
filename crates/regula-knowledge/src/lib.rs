//! Regulatory document knowledge base: loading, chunking, cached embedding,
//! vector indexes and retrieval.

pub mod cache;
pub mod document;
pub mod embedder;
pub mod error;
pub mod index;
pub mod retriever;
pub mod splitter;

pub use cache::EmbeddingCache;
pub use document::{Chunk, ChunkId, Document, DocumentError, DocumentMetadata};
pub use embedder::{EmbedStats, Embedder, EmbedderConfig, EmbeddingVector, VectorOwner};
pub use error::{EmbedError, IndexError, VectorSpec};
pub use index::{IndexBackend, IndexEntry, IndexManager, SearchHit, VectorIndex};
pub use retriever::Retriever;
pub use splitter::{Splitter, SplitterConfig, SplitterError, SplitterKind};
