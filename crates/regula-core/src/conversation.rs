//! Bounded conversation history owned by one session.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

/// Question/answer turns in chronological order, capped at `max_turns`.
///
/// The state is a value: [`ConversationState::with_turn`] returns the extended
/// state and leaves `self` untouched, so a failed call has nothing to roll back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    turns: VecDeque<Turn>,
    max_turns: usize,
}

impl ConversationState {
    /// A cap of 0 is treated as 1.
    #[must_use]
    pub fn new(max_turns: usize) -> Self {
        let max_turns = max_turns.max(1);
        Self {
            turns: VecDeque::with_capacity(max_turns),
            max_turns,
        }
    }

    #[must_use]
    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Oldest turn first.
    pub fn turns(&self) -> impl DoubleEndedIterator<Item = &Turn> + ExactSizeIterator {
        self.turns.iter()
    }

    /// Most recent turn first.
    pub fn recent_first(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter().rev()
    }

    /// State with one more turn appended, evicting the oldest turns beyond the cap.
    #[must_use]
    pub fn with_turn(&self, question: impl Into<String>, answer: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.turns.push_back(Turn {
            question: question.into(),
            answer: answer.into(),
        });
        while next.turns.len() > next.max_turns {
            next.turns.pop_front();
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn appends_in_order() {
        let state = ConversationState::new(3)
            .with_turn("q1", "a1")
            .with_turn("q2", "a2");
        let questions: Vec<&str> = state.turns().map(|t| t.question.as_str()).collect();
        assert_eq!(questions, ["q1", "q2"]);
        let recent: Vec<&str> = state.recent_first().map(|t| t.answer.as_str()).collect();
        assert_eq!(recent, ["a2", "a1"]);
    }

    #[test]
    fn evicts_oldest_beyond_cap() {
        let state = ConversationState::new(2)
            .with_turn("q1", "a1")
            .with_turn("q2", "a2")
            .with_turn("q3", "a3");
        let questions: Vec<&str> = state.turns().map(|t| t.question.as_str()).collect();
        assert_eq!(questions, ["q2", "q3"]);
    }

    #[test]
    fn with_turn_leaves_original_untouched() {
        let before = ConversationState::new(2).with_turn("q1", "a1");
        let after = before.with_turn("q2", "a2");
        assert_eq!(before.len(), 1);
        assert_eq!(after.len(), 2);
    }

    #[test]
    fn zero_cap_keeps_one_turn() {
        let state = ConversationState::new(0)
            .with_turn("q1", "a1")
            .with_turn("q2", "a2");
        assert_eq!(state.max_turns(), 1);
        assert_eq!(state.turns().next().unwrap().question, "q2");
    }

    proptest! {
        #[test]
        fn keeps_the_newest_turns_in_order(cap in 1usize..8, n in 0usize..30) {
            let mut state = ConversationState::new(cap);
            for i in 0..n {
                state = state.with_turn(format!("q{i}"), format!("a{i}"));
            }
            prop_assert_eq!(state.len(), n.min(cap));
            let expected: Vec<String> = (n.saturating_sub(cap)..n).map(|i| format!("q{i}")).collect();
            let actual: Vec<String> = state.turns().map(|t| t.question.clone()).collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
