use std::sync::Arc;

use regula_llm::{CompletionParams, CompletionProvider, EmbeddingProvider};

use super::{Answer, ChainError, RetrievalContext, prompt};

/// Stateless question answering over retrieved excerpts.
pub struct QaChain<C, E> {
    llm: Arc<C>,
    retrieval: RetrievalContext<E>,
    params: CompletionParams,
}

impl<C, E> Clone for QaChain<C, E> {
    fn clone(&self) -> Self {
        Self {
            llm: Arc::clone(&self.llm),
            retrieval: self.retrieval.clone(),
            params: self.params,
        }
    }
}

impl<C: CompletionProvider, E: EmbeddingProvider> QaChain<C, E> {
    #[must_use]
    pub fn new(llm: Arc<C>, retrieval: RetrievalContext<E>, params: CompletionParams) -> Self {
        Self {
            llm,
            retrieval,
            params,
        }
    }

    /// Answer `question` from the top-k excerpts.
    ///
    /// Finding no excerpts is not an error: the model is told so and the answer
    /// carries no sources.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding, retrieval or completion fails.
    pub async fn run(&self, question: &str) -> Result<Answer, ChainError> {
        let sources = self.retrieval.retrieve(question).await?;
        let prompt = prompt::qa(question, &sources);
        let answer = self.llm.complete(&prompt, self.params).await?;
        tracing::info!(sources = sources.len(), "question answered");
        Ok(Answer {
            answer: answer.trim().to_owned(),
            sources,
        })
    }
}
