use ollama_rs::Ollama;
use ollama_rs::generation::chat::ChatMessage;
use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::models::ModelOptions;

use crate::error::LlmError;
use crate::provider::{CompletionParams, CompletionProvider, EmbeddingProvider, check_count};
use crate::retry::{RetryPolicy, with_retry};

const PROVIDER: &str = "ollama";
const DEFAULT_PORT: u16 = 11434;

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Ollama,
    model: String,
    retry: RetryPolicy,
}

impl OllamaProvider {
    #[must_use]
    pub fn new(base_url: &str, model: String) -> Self {
        let (host, port) = parse_host_port(base_url);
        Self {
            client: Ollama::new(host, port),
            model,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check if Ollama is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection to Ollama fails.
    pub async fn health_check(&self) -> Result<(), LlmError> {
        self.client.list_local_models().await.map_err(|e| {
            LlmError::Other(format!("failed to connect to Ollama, is it running? {e}"))
        })?;
        Ok(())
    }

    async fn send_chat(&self, prompt: &str, params: CompletionParams) -> Result<String, LlmError> {
        let options = ModelOptions::default()
            .temperature(params.temperature)
            .num_predict(i32::try_from(params.max_tokens).unwrap_or(i32::MAX));
        let request =
            ChatMessageRequest::new(self.model.clone(), vec![ChatMessage::user(prompt.to_owned())])
                .options(options);

        let response = self
            .client
            .send_chat_messages(request)
            .await
            .map_err(|e| LlmError::Other(format!("Ollama chat request failed: {e}")))?;

        let content = response.message.content;
        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse { provider: PROVIDER });
        }
        Ok(content)
    }

    async fn send_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let request = GenerateEmbeddingsRequest::new(
            self.model.clone(),
            EmbeddingsInput::Multiple(texts.to_vec()),
        );

        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|e| LlmError::Other(format!("Ollama embedding request failed: {e}")))?;

        check_count(PROVIDER, texts.len(), response.embeddings)
    }
}

impl CompletionProvider for OllamaProvider {
    async fn complete(&self, prompt: &str, params: CompletionParams) -> Result<String, LlmError> {
        with_retry(PROVIDER, &self.retry, || self.send_chat(prompt, params)).await
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}

impl EmbeddingProvider for OllamaProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        with_retry(PROVIDER, &self.retry, || self.send_embeddings(texts)).await
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }
}

fn parse_host_port(url: &str) -> (String, u16) {
    let url = url.trim_end_matches('/');
    if let Some(colon_pos) = url.rfind(':') {
        let port_str = &url[colon_pos + 1..];
        if let Ok(port) = port_str.parse::<u16>() {
            return (url[..colon_pos].to_string(), port);
        }
    }
    (url.to_string(), DEFAULT_PORT)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn host_and_port_split() {
        assert_eq!(
            parse_host_port("http://localhost:11434/"),
            ("http://localhost".to_owned(), 11434)
        );
        assert_eq!(
            parse_host_port("http://10.0.0.5:8080"),
            ("http://10.0.0.5".to_owned(), 8080)
        );
    }

    #[test]
    fn missing_or_invalid_port_uses_default() {
        assert_eq!(
            parse_host_port("http://localhost"),
            ("http://localhost".to_owned(), DEFAULT_PORT)
        );
        assert_eq!(
            parse_host_port("http://localhost:99999"),
            ("http://localhost:99999".to_owned(), DEFAULT_PORT)
        );
    }

    #[test]
    fn model_id_is_configured_model() {
        let p = OllamaProvider::new("http://localhost:11434", "nomic-embed-text".into());
        assert_eq!(p.model_id(), "nomic-embed-text");
        assert_eq!(EmbeddingProvider::name(&p), "ollama");
    }

    #[tokio::test]
    async fn empty_batch_short_circuits() {
        let p = OllamaProvider::new("http://127.0.0.1:1", "m".into());
        assert!(p.embed(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_server_errors() {
        let p = OllamaProvider::new("http://127.0.0.1:1", "m".into()).with_retry_policy(
            RetryPolicy {
                max_retries: 0,
                base_delay: Duration::from_millis(1),
                timeout: Duration::from_secs(2),
            },
        );
        assert!(p.complete("hi", CompletionParams::default()).await.is_err());
    }
}
