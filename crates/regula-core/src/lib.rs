//! Configuration, answer chains and the ingestion pipeline.

pub mod bootstrap;
pub mod chain;
pub mod config;
pub mod conversation;
pub mod pipeline;

pub use bootstrap::{App, BootstrapError};
pub use chain::{
    Answer, ChainError, ChainType, ComplianceAssessment, ComplianceCheckChain,
    ConversationalChain, QaChain, RetrievalContext, SummaryChain, Verdict, with_cancellation,
};
pub use config::{Config, ConfigError};
pub use conversation::{ConversationState, Turn};
pub use pipeline::{IngestReport, IngestionPipeline, PipelineError};
