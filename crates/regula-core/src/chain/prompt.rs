use std::fmt::Write;

use regula_knowledge::Chunk;

use crate::conversation::ConversationState;

/// Numbered excerpts with provenance, as cited in answers.
pub(crate) fn format_context(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let _ = writeln!(out, "[{}] {}", i + 1, chunk.provenance());
        out.push_str(chunk.text.trim());
        out.push_str("\n\n");
    }
    out
}

pub(crate) fn qa(question: &str, chunks: &[Chunk]) -> String {
    let context = if chunks.is_empty() {
        "(no relevant excerpts were found)\n\n".to_owned()
    } else {
        format_context(chunks)
    };
    format!(
        "You are a regulatory compliance assistant. Answer the question using only the \
         excerpts below and cite them by number, e.g. [1]. If the excerpts do not contain \
         the answer, say that you do not know.\n\n\
         Excerpts:\n{context}Question: {question}\nAnswer:"
    )
}

pub(crate) fn conversational(history: &ConversationState, question: &str, chunks: &[Chunk]) -> String {
    let mut turns = String::new();
    for turn in history.recent_first() {
        let _ = write!(turns, "User: {}\nAssistant: {}\n\n", turn.question, turn.answer);
    }
    let context = if chunks.is_empty() {
        "(no relevant excerpts were found)\n\n".to_owned()
    } else {
        format_context(chunks)
    };
    format!(
        "You are a regulatory compliance assistant in an ongoing conversation. Use the \
         earlier turns (most recent first) to resolve references in the new question, answer \
         only from the excerpts and cite them by number. If the excerpts do not contain the \
         answer, say that you do not know.\n\n\
         Earlier turns:\n{turns}Excerpts:\n{context}Question: {question}\nAnswer:"
    )
}

/// Retrieval query for a follow-up: the new question, then earlier questions
/// most recent first.
pub(crate) fn follow_up_query(history: &ConversationState, question: &str) -> String {
    let mut query = question.to_owned();
    for turn in history.recent_first() {
        query.push('\n');
        query.push_str(&turn.question);
    }
    query
}

pub(crate) fn compliance(topic: &str, practices: &str, chunks: &[Chunk]) -> String {
    let evidence = format_context(chunks);
    format!(
        "You are a regulatory compliance auditor. Compare the organization's practices \
         against the requirement excerpts for the topic \"{topic}\".\n\n\
         Requirements:\n{evidence}\
         Organization practices:\n{practices}\n\n\
         Reply with a first line of the form `VERDICT: <compliant|partial|gap|insufficient_evidence>`, \
         then explain which requirements are met and which are missing, citing excerpts by number."
    )
}

pub(crate) fn summarize_part(text: &str) -> String {
    format!(
        "Summarize the following regulatory text. Keep obligations, deadlines, scope and \
         defined terms; drop boilerplate.\n\n{text}\n\nSummary:"
    )
}

pub(crate) fn combine_summaries(text: &str) -> String {
    format!(
        "The following are summaries of consecutive parts of regulatory documents. Combine \
         them into one coherent summary without repeating points.\n\n{text}\n\nCombined summary:"
    )
}

#[cfg(test)]
mod tests {
    use regula_knowledge::{ChunkId, DocumentMetadata};

    use super::*;

    fn chunk(text: &str, page: Option<u32>, section: Option<&str>) -> Chunk {
        let mut metadata = DocumentMetadata::new("nis2.pdf", "pdf");
        metadata.page = page;
        metadata.section = section.map(str::to_owned);
        Chunk {
            id: ChunkId::new(&metadata, 0),
            text: text.into(),
            start: 0,
            end: text.len(),
            sequence: 0,
            metadata,
        }
    }

    #[test]
    fn context_numbers_excerpts_with_provenance() {
        let ctx = format_context(&[
            chunk("Scope text. ", Some(1), Some("Article 2")),
            chunk("Reporting text.", None, None),
        ]);
        assert!(ctx.starts_with("[1] nis2.pdf (page 1) [Article 2]\nScope text.\n\n"));
        assert!(ctx.contains("[2] nis2.pdf\nReporting text."));
    }

    #[test]
    fn qa_prompt_marks_missing_context() {
        let p = qa("What is in scope?", &[]);
        assert!(p.contains("no relevant excerpts"));
        assert!(p.ends_with("Question: What is in scope?\nAnswer:"));
    }

    #[test]
    fn follow_up_query_puts_new_question_first() {
        let history = ConversationState::new(5)
            .with_turn("What is NIS2?", "A directive.")
            .with_turn("Who does it apply to?", "Essential entities.");
        assert_eq!(
            follow_up_query(&history, "What are the fines?"),
            "What are the fines?\nWho does it apply to?\nWhat is NIS2?"
        );
    }

    #[test]
    fn conversational_prompt_lists_recent_turn_first() {
        let history = ConversationState::new(5)
            .with_turn("first", "one")
            .with_turn("second", "two");
        let p = conversational(&history, "third", &[]);
        assert!(p.find("User: second").unwrap() < p.find("User: first").unwrap());
    }

    #[test]
    fn compliance_prompt_requests_verdict_line() {
        let p = compliance("incident reporting", "We report within 72h.", &[chunk("24h early warning", None, None)]);
        assert!(p.contains("VERDICT:"));
        assert!(p.contains("We report within 72h."));
        assert!(p.contains("[1] nis2.pdf"));
    }
}
