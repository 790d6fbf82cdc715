use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Sampling parameters passed with every completion call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompletionParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 500,
        }
    }
}

pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, returning one vector per input in input order.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call fails or returns a different
    /// number of vectors than inputs.
    fn embed(&self, texts: &[String]) -> impl Future<Output = Result<Vec<Vec<f32>>, LlmError>> + Send;

    /// Identifier of the model producing the vectors. Stored alongside every
    /// vector so indexes built with another model can be rejected.
    fn model_id(&self) -> &str;

    fn name(&self) -> &'static str;
}

pub trait CompletionProvider: Send + Sync {
    /// Complete a single prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to communicate or the response is invalid.
    fn complete(
        &self,
        prompt: &str,
        params: CompletionParams,
    ) -> impl Future<Output = Result<String, LlmError>> + Send;

    fn name(&self) -> &'static str;
}

/// Check the vector count returned by a provider against the request size.
pub(crate) fn check_count(
    provider: &'static str,
    expected: usize,
    vectors: Vec<Vec<f32>>,
) -> Result<Vec<Vec<f32>>, LlmError> {
    if vectors.len() == expected {
        Ok(vectors)
    } else {
        Err(LlmError::EmbeddingCount {
            provider,
            expected,
            got: vectors.len(),
        })
    }
}
