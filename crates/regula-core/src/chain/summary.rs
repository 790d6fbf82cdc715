use std::sync::Arc;

use regula_knowledge::{Chunk, Document, Splitter, SplitterConfig, SplitterKind};
use regula_llm::{CompletionParams, CompletionProvider};

use super::{ChainError, prompt};

/// Reduce rounds allowed before summarization is declared divergent.
const MAX_ROUNDS: usize = 8;

/// Map-reduce summarization over documents or chunks. No retrieval.
pub struct SummaryChain<C> {
    llm: Arc<C>,
    params: CompletionParams,
    max_input_chars: usize,
}

impl<C> Clone for SummaryChain<C> {
    fn clone(&self) -> Self {
        Self {
            llm: Arc::clone(&self.llm),
            params: self.params,
            max_input_chars: self.max_input_chars,
        }
    }
}

impl<C: CompletionProvider> SummaryChain<C> {
    /// `max_input_chars` bounds the text placed in a single completion call.
    #[must_use]
    pub fn new(llm: Arc<C>, params: CompletionParams, max_input_chars: usize) -> Self {
        Self {
            llm,
            params,
            max_input_chars: max_input_chars.max(1),
        }
    }

    /// Summarize whole documents, cutting each to fit one call.
    ///
    /// # Errors
    ///
    /// Returns `EmptyInput` if the documents hold no text, `Splitter` if the
    /// input limit gives no valid split, or a completion error.
    pub async fn summarize(&self, documents: &[Document]) -> Result<String, ChainError> {
        let overlap = self.max_input_chars / 20;
        let splitter = Splitter::new(
            SplitterKind::Recursive,
            SplitterConfig::new(self.max_input_chars, overlap),
        )?;
        let texts: Vec<String> = splitter
            .split_documents(documents)
            .into_iter()
            .map(|c| c.text)
            .collect();
        self.summarize_texts(texts).await
    }

    /// Summarize chunks in the given order.
    ///
    /// # Errors
    ///
    /// See [`Self::summarize`].
    pub async fn summarize_chunks(&self, chunks: &[Chunk]) -> Result<String, ChainError> {
        self.summarize_texts(chunks.iter().map(|c| c.text.clone()).collect())
            .await
    }

    async fn summarize_texts(&self, mut texts: Vec<String>) -> Result<String, ChainError> {
        texts.retain(|t| !t.trim().is_empty());
        if texts.is_empty() {
            return Err(ChainError::EmptyInput);
        }

        let mut round = 0;
        loop {
            let batches = pack(&texts, self.max_input_chars);
            if batches.len() == 1 {
                let text = &batches[0];
                let prompt = if round == 0 {
                    prompt::summarize_part(text)
                } else {
                    prompt::combine_summaries(text)
                };
                let summary = self.llm.complete(&prompt, self.params).await?;
                tracing::info!(rounds = round + 1, "summary complete");
                return Ok(summary.trim().to_owned());
            }
            if round == MAX_ROUNDS {
                return Err(ChainError::SummaryDiverged { rounds: round });
            }

            let input_chars: usize = texts.iter().map(|t| t.chars().count()).sum();
            let mut partials = Vec::with_capacity(batches.len());
            for batch in &batches {
                let prompt = if round == 0 {
                    prompt::summarize_part(batch)
                } else {
                    prompt::combine_summaries(batch)
                };
                let partial = self.llm.complete(&prompt, self.params).await?;
                partials.push(partial.trim().to_owned());
            }
            let output_chars: usize = partials.iter().map(|t| t.chars().count()).sum();
            tracing::debug!(round, batches = batches.len(), input_chars, output_chars, "map round");
            if output_chars >= input_chars {
                return Err(ChainError::SummaryDiverged { rounds: round + 1 });
            }

            texts = partials;
            texts.retain(|t| !t.is_empty());
            if texts.is_empty() {
                return Err(ChainError::Completion(regula_llm::LlmError::EmptyResponse {
                    provider: self.llm.name(),
                }));
            }
            round += 1;
        }
    }
}

/// Greedily join texts with blank lines into batches of at most `max_chars`
/// characters. A text longer than `max_chars` is cut at character boundaries.
fn pack(texts: &[String], max_chars: usize) -> Vec<String> {
    const JOIN: &str = "\n\n";
    let mut batches = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for text in texts {
        for piece in cut(text, max_chars) {
            let len = piece.chars().count();
            let needed = if current.is_empty() { len } else { len + JOIN.len() };
            if current_chars + needed > max_chars && !current.is_empty() {
                batches.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            if !current.is_empty() {
                current.push_str(JOIN);
                current_chars += JOIN.len();
            }
            current.push_str(piece);
            current_chars += len;
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

fn cut(text: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let end = rest
            .char_indices()
            .nth(max_chars)
            .map_or(rest.len(), |(i, _)| i);
        pieces.push(&rest[..end]);
        rest = &rest[end..];
    }
    pieces
}

#[cfg(test)]
mod tests {
    use regula_knowledge::DocumentMetadata;
    use regula_llm::mock::MockProvider;

    use super::*;

    fn doc(text: &str) -> Document {
        Document::new(text, DocumentMetadata::new("reg.txt", "txt"))
    }

    #[test]
    fn pack_respects_limit_and_order() {
        let texts: Vec<String> = ["aaaa", "bbbb", "cccc"].iter().map(|s| (*s).to_owned()).collect();
        assert_eq!(pack(&texts, 10), ["aaaa\n\nbbbb", "cccc"]);
        assert_eq!(pack(&texts, 100), ["aaaa\n\nbbbb\n\ncccc"]);
    }

    #[test]
    fn pack_cuts_oversized_text() {
        let batches = pack(&["abcdefghij".to_owned()], 4);
        assert_eq!(batches, ["abcd", "efgh", "ij"]);
        assert!(batches.iter().all(|b| b.chars().count() <= 4));
    }

    #[tokio::test]
    async fn short_input_is_one_call() {
        let mock = MockProvider::with_responses(vec!["Short summary.".into()]);
        let chain = SummaryChain::new(Arc::new(mock.clone()), CompletionParams::default(), 1000);
        let summary = chain.summarize(&[doc("Article 1. Scope.")]).await.unwrap();
        assert_eq!(summary, "Short summary.");
        assert_eq!(mock.complete_calls(), 1);
        assert!(mock.prompts()[0].contains("Article 1. Scope."));
    }

    #[tokio::test]
    async fn zero_input_limit_is_clamped_not_empty() {
        let mock = MockProvider::with_responses(vec!["A.".into()]);
        let chain = SummaryChain::new(Arc::new(mock.clone()), CompletionParams::default(), 0);
        assert_eq!(chain.summarize(&[doc("a")]).await.unwrap(), "A.");
        assert_eq!(mock.complete_calls(), 1);
    }

    #[test]
    fn splitter_error_is_reported_as_itself() {
        let err = ChainError::from(regula_knowledge::SplitterError::ZeroChunkSize);
        assert!(matches!(err, ChainError::Splitter(_)));
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "invalid summary splitter: chunk_size must be greater than 0"
        );
    }

    #[tokio::test]
    async fn long_input_maps_then_reduces() {
        let mock = MockProvider::default();
        mock.push_response("s1");
        mock.push_response("s2");
        mock.push_response("s3");
        mock.push_response("final");
        let chain = SummaryChain::new(Arc::new(mock.clone()), CompletionParams::default(), 300);
        let paragraph = "Entities shall manage cybersecurity risks. ".repeat(6);
        let text = [paragraph.as_str(); 3].join("\n\n");

        let summary = chain.summarize(&[doc(&text)]).await.unwrap();
        assert_eq!(summary, "final");
        let prompts = mock.prompts();
        let last = prompts.last().unwrap();
        assert!(last.contains("Combine"));
        assert!(last.contains("s1"));
        assert_eq!(mock.complete_calls(), prompts.len());
        assert!(prompts.len() >= 3);
    }

    #[tokio::test]
    async fn non_shrinking_summaries_diverge() {
        let mock = MockProvider::default();
        let chain = SummaryChain::new(Arc::new(mock.clone()), CompletionParams::default(), 256);
        mock.push_response("x".repeat(256));
        mock.push_response("x".repeat(256));
        let texts = vec!["y".repeat(200), "z".repeat(200)];
        let err = chain.summarize_texts(texts).await.unwrap_err();
        assert!(matches!(err, ChainError::SummaryDiverged { rounds: 1 }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn empty_input_is_error() {
        let chain = SummaryChain::new(Arc::new(MockProvider::default()), CompletionParams::default(), 100);
        assert!(matches!(
            chain.summarize(&[doc("   \n ")]).await,
            Err(ChainError::EmptyInput)
        ));
    }
}
