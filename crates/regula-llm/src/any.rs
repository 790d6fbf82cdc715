#[cfg(feature = "mock")]
use crate::mock::MockProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;

use crate::error::LlmError;
use crate::provider::{CompletionParams, CompletionProvider, EmbeddingProvider};
use crate::retry::RetryPolicy;

/// Generates a match over all `AnyProvider` variants, binding the inner provider
/// and evaluating the given expression for each arm.
macro_rules! delegate_provider {
    ($self:expr, |$p:ident| $expr:expr) => {
        match $self {
            AnyProvider::OpenAi($p) => $expr,
            AnyProvider::Ollama($p) => $expr,
            #[cfg(feature = "mock")]
            AnyProvider::Mock($p) => $expr,
        }
    };
}

#[derive(Debug, Clone)]
pub enum AnyProvider {
    OpenAi(OpenAiProvider),
    Ollama(OllamaProvider),
    #[cfg(feature = "mock")]
    Mock(MockProvider),
}

impl AnyProvider {
    /// Replace the timeout and retry budget of the wrapped provider.
    #[must_use]
    pub fn with_retry_policy(self, retry: RetryPolicy) -> Self {
        match self {
            Self::OpenAi(p) => Self::OpenAi(p.with_retry_policy(retry)),
            Self::Ollama(p) => Self::Ollama(p.with_retry_policy(retry)),
            #[cfg(feature = "mock")]
            Self::Mock(p) => Self::Mock(p),
        }
    }
}

impl CompletionProvider for AnyProvider {
    async fn complete(&self, prompt: &str, params: CompletionParams) -> Result<String, LlmError> {
        delegate_provider!(self, |p| p.complete(prompt, params).await)
    }

    fn name(&self) -> &'static str {
        delegate_provider!(self, |p| CompletionProvider::name(p))
    }
}

impl EmbeddingProvider for AnyProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        delegate_provider!(self, |p| p.embed(texts).await)
    }

    fn model_id(&self) -> &str {
        delegate_provider!(self, |p| p.model_id())
    }

    fn name(&self) -> &'static str {
        delegate_provider!(self, |p| EmbeddingProvider::name(p))
    }
}

impl From<OpenAiProvider> for AnyProvider {
    fn from(p: OpenAiProvider) -> Self {
        Self::OpenAi(p)
    }
}

impl From<OllamaProvider> for AnyProvider {
    fn from(p: OllamaProvider) -> Self {
        Self::Ollama(p)
    }
}

#[cfg(feature = "mock")]
impl From<MockProvider> for AnyProvider {
    fn from(p: MockProvider) -> Self {
        Self::Mock(p)
    }
}
