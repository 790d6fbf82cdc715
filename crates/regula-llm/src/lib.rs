//! Embedding and completion provider abstraction.
//!
//! Providers are resolved once at construction into the closed [`any::AnyProvider`]
//! variant set; callers never dispatch on provider names at runtime.

pub mod any;
pub mod error;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod retry;

pub use error::LlmError;
pub use provider::{CompletionParams, CompletionProvider, EmbeddingProvider};
pub use retry::RetryPolicy;
