//! Scripted provider for tests.
//!
//! Completions pop queued errors first, then queued responses, then fall back
//! to `default_response`. Embeddings are deterministic bag-of-words vectors, so
//! texts sharing words score higher under cosine similarity.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::LlmError;
use crate::provider::{CompletionParams, CompletionProvider, EmbeddingProvider};

#[derive(Debug, Default)]
struct Script {
    responses: VecDeque<String>,
    errors: VecDeque<LlmError>,
    prompts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MockProvider {
    script: Arc<Mutex<Script>>,
    complete_calls: Arc<AtomicUsize>,
    embed_calls: Arc<AtomicUsize>,
    embedded_texts: Arc<AtomicUsize>,
    pub default_response: String,
    pub model_id: String,
    pub dimension: usize,
    pub delay: Duration,
    /// Embedding batches containing a text with this marker fail.
    pub fail_embed_marker: Option<String>,
    /// Embedding batches larger than this fail.
    pub max_embed_batch: Option<usize>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            complete_calls: Arc::new(AtomicUsize::new(0)),
            embed_calls: Arc::new(AtomicUsize::new(0)),
            embedded_texts: Arc::new(AtomicUsize::new(0)),
            default_response: "mock response".into(),
            model_id: "mock-embed".into(),
            dimension: 64,
            delay: Duration::ZERO,
            fail_embed_marker: None,
            max_embed_batch: None,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        let provider = Self::default();
        provider.script.lock().unwrap().responses = responses.into();
        provider
    }

    #[must_use]
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    #[must_use]
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn failing_embeddings_on(mut self, marker: impl Into<String>) -> Self {
        self.fail_embed_marker = Some(marker.into());
        self
    }

    #[must_use]
    pub fn with_max_embed_batch(mut self, max: usize) -> Self {
        self.max_embed_batch = Some(max);
        self
    }

    /// Queue an error returned by the next completion call.
    pub fn push_error(&self, err: LlmError) {
        self.script.lock().unwrap().errors.push_back(err);
    }

    pub fn push_response(&self, response: impl Into<String>) {
        self.script
            .lock()
            .unwrap()
            .responses
            .push_back(response.into());
    }

    #[must_use]
    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// Total number of texts sent to `embed`, across all calls.
    #[must_use]
    pub fn embedded_texts(&self) -> usize {
        self.embedded_texts.load(Ordering::SeqCst)
    }

    /// Prompts received by `complete`, oldest first.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.script.lock().unwrap().prompts.clone()
    }

    /// Deterministic unit-length bag-of-words vector for `text`.
    #[must_use]
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0_f32; self.dimension.max(1)];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let idx = fnv1a(&word.to_lowercase()) % v.len();
            v[idx] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        } else {
            v[0] = 1.0;
        }
        v
    }
}

fn fnv1a(s: &str) -> usize {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in s.bytes() {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    #[allow(clippy::cast_possible_truncation)]
    {
        hash as usize
    }
}

impl CompletionProvider for MockProvider {
    async fn complete(&self, prompt: &str, _params: CompletionParams) -> Result<String, LlmError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut script = self.script.lock().unwrap();
        script.prompts.push(prompt.to_owned());
        if let Some(err) = script.errors.pop_front() {
            return Err(err);
        }
        Ok(script
            .responses
            .pop_front()
            .unwrap_or_else(|| self.default_response.clone()))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

impl EmbeddingProvider for MockProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.max_embed_batch.is_some_and(|max| texts.len() > max) {
            return Err(LlmError::Unavailable {
                provider: "mock",
                status: 413,
            });
        }
        if let Some(marker) = &self.fail_embed_marker
            && texts.iter().any(|t| t.contains(marker.as_str()))
        {
            return Err(LlmError::Unavailable {
                provider: "mock",
                status: 500,
            });
        }
        self.embedded_texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_responses_then_default() {
        let mock = MockProvider::with_responses(vec!["first".into()]);
        let p = CompletionParams::default();
        assert_eq!(mock.complete("a", p).await.unwrap(), "first");
        assert_eq!(mock.complete("b", p).await.unwrap(), "mock response");
        assert_eq!(mock.complete_calls(), 2);
        assert_eq!(mock.prompts(), vec!["a".to_owned(), "b".to_owned()]);
    }

    #[tokio::test]
    async fn queued_error_is_returned_once() {
        let mock = MockProvider::default();
        mock.push_error(LlmError::RateLimited { provider: "mock" });
        let p = CompletionParams::default();
        assert!(mock.complete("a", p).await.is_err());
        assert!(mock.complete("a", p).await.is_ok());
    }

    #[tokio::test]
    async fn embeddings_are_deterministic_and_normalized() {
        let mock = MockProvider::default();
        let texts = vec!["incident reporting".to_owned(), "incident reporting".to_owned()];
        let v = mock.embed(&texts).await.unwrap();
        assert_eq!(v[0], v[1]);
        let norm: f32 = v[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(mock.embedded_texts(), 2);
    }

    #[tokio::test]
    async fn marker_fails_batch() {
        let mock = MockProvider::default().failing_embeddings_on("BAD");
        let err = mock
            .embed(&["ok".into(), "BAD text".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Unavailable { .. }));
    }

    #[test]
    fn shared_words_score_higher() {
        let mock = MockProvider::default();
        let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
        let q = mock.vector_for("incident reporting deadline");
        let near = mock.vector_for("the incident reporting deadline is 24 hours");
        let far = mock.vector_for("supply chain security measures");
        assert!(dot(&q, &near) > dot(&q, &far));
    }
}
