use std::sync::Arc;

use regula_llm::{CompletionParams, CompletionProvider, EmbeddingProvider};

use super::{Answer, ChainError, RetrievalContext, prompt};
use crate::conversation::ConversationState;

/// Question answering that folds earlier turns into retrieval and the prompt.
///
/// The chain holds no history itself: callers pass their [`ConversationState`]
/// in and receive the extended state back only when the answer succeeds.
pub struct ConversationalChain<C, E> {
    llm: Arc<C>,
    retrieval: RetrievalContext<E>,
    params: CompletionParams,
}

impl<C, E> Clone for ConversationalChain<C, E> {
    fn clone(&self) -> Self {
        Self {
            llm: Arc::clone(&self.llm),
            retrieval: self.retrieval.clone(),
            params: self.params,
        }
    }
}

impl<C: CompletionProvider, E: EmbeddingProvider> ConversationalChain<C, E> {
    #[must_use]
    pub fn new(llm: Arc<C>, retrieval: RetrievalContext<E>, params: CompletionParams) -> Self {
        Self {
            llm,
            retrieval,
            params,
        }
    }

    /// Answer a follow-up question in the context of `state`.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding, retrieval or completion fails; `state`
    /// is then still the caller's latest state.
    pub async fn ask(
        &self,
        state: &ConversationState,
        question: &str,
    ) -> Result<(Answer, ConversationState), ChainError> {
        let query = prompt::follow_up_query(state, question);
        let sources = self.retrieval.retrieve(&query).await?;
        let prompt = prompt::conversational(state, question, &sources);
        let answer = self.llm.complete(&prompt, self.params).await?;
        let answer = answer.trim().to_owned();

        let next = state.with_turn(question, answer.clone());
        tracing::info!(sources = sources.len(), turns = next.len(), "follow-up answered");
        Ok((Answer { answer, sources }, next))
    }
}
