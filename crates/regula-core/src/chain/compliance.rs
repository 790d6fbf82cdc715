use std::fmt;
use std::sync::Arc;

use regula_knowledge::Chunk;
use regula_llm::{CompletionParams, CompletionProvider, EmbeddingProvider};
use serde::{Deserialize, Serialize};

use super::{ChainError, RetrievalContext, prompt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Compliant,
    Partial,
    Gap,
    InsufficientEvidence,
}

impl Verdict {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compliant => "compliant",
            Self::Partial => "partial",
            Self::Gap => "gap",
            Self::InsufficientEvidence => "insufficient_evidence",
        }
    }

    /// Read the verdict from a model response.
    ///
    /// A `VERDICT: <name>` line wins; otherwise the first keyword found, with
    /// the more specific terms checked before `compliant`.
    #[must_use]
    pub fn parse_response(response: &str) -> Option<Self> {
        for line in response.lines() {
            let line = line.trim().trim_start_matches(['*', '#', ' ']);
            let Some(rest) = strip_prefix_ignore_case(line, "verdict:") else {
                continue;
            };
            let token = rest
                .trim()
                .trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
                .to_ascii_lowercase()
                .replace([' ', '-'], "_");
            if let Some(v) = Self::from_name(&token) {
                return Some(v);
            }
        }

        let lower = response.to_ascii_lowercase();
        if lower.contains("insufficient evidence") || lower.contains("insufficient_evidence") {
            Some(Self::InsufficientEvidence)
        } else if lower.contains("partially compliant") || lower.contains("partial") {
            Some(Self::Partial)
        } else if lower.contains("non-compliant")
            || lower.contains("not compliant")
            || lower.contains("gap")
        {
            Some(Self::Gap)
        } else if lower.contains("compliant") {
            Some(Self::Compliant)
        } else {
            None
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "compliant" => Some(Self::Compliant),
            "partial" | "partially_compliant" => Some(Self::Partial),
            "gap" | "non_compliant" | "not_compliant" => Some(Self::Gap),
            "insufficient_evidence" | "insufficient" => Some(Self::InsufficientEvidence),
            _ => None,
        }
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of comparing stated practices against retrieved requirements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceAssessment {
    pub topic: String,
    pub practices: String,
    pub evidence: Vec<Chunk>,
    pub verdict: Verdict,
    /// The model's explanation; empty when evidence was insufficient.
    pub rationale: String,
}

/// Compares practices against requirement excerpts retrieved for a topic.
pub struct ComplianceCheckChain<C, E> {
    llm: Arc<C>,
    retrieval: RetrievalContext<E>,
    params: CompletionParams,
}

impl<C, E> Clone for ComplianceCheckChain<C, E> {
    fn clone(&self) -> Self {
        Self {
            llm: Arc::clone(&self.llm),
            retrieval: self.retrieval.clone(),
            params: self.params,
        }
    }
}

impl<C: CompletionProvider, E: EmbeddingProvider> ComplianceCheckChain<C, E> {
    #[must_use]
    pub fn new(llm: Arc<C>, retrieval: RetrievalContext<E>, params: CompletionParams) -> Self {
        Self {
            llm,
            retrieval,
            params,
        }
    }

    /// Assess `practices` against the requirements retrieved for `topic`.
    ///
    /// With no evidence above the score threshold the verdict is
    /// `insufficient_evidence` and the completion provider is not called.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval or completion fails, or `UnparsableVerdict`
    /// if the response names no verdict.
    pub async fn check(&self, topic: &str, practices: &str) -> Result<ComplianceAssessment, ChainError> {
        let evidence = self.retrieval.retrieve(topic).await?;
        if evidence.is_empty() {
            tracing::info!(topic, "no requirement evidence retrieved");
            return Ok(ComplianceAssessment {
                topic: topic.to_owned(),
                practices: practices.to_owned(),
                evidence,
                verdict: Verdict::InsufficientEvidence,
                rationale: String::new(),
            });
        }

        let prompt = prompt::compliance(topic, practices, &evidence);
        let response = self.llm.complete(&prompt, self.params).await?;
        let verdict = Verdict::parse_response(&response).ok_or_else(|| {
            tracing::warn!(topic, "model response carried no verdict");
            ChainError::UnparsableVerdict
        })?;
        tracing::info!(topic, %verdict, evidence = evidence.len(), "compliance checked");

        Ok(ComplianceAssessment {
            topic: topic.to_owned(),
            practices: practices.to_owned(),
            evidence,
            verdict,
            rationale: response.trim().to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use regula_llm::mock::MockProvider;

    use super::*;
    use crate::chain::test_support::context;

    const DOCS: [&str; 2] = [
        "Entities shall notify significant incidents to the CSIRT without undue delay.",
        "Entities shall implement multi-factor authentication where appropriate.",
    ];

    #[test]
    fn parses_verdict_line() {
        assert_eq!(Verdict::parse_response("VERDICT: gap\nMissing MFA."), Some(Verdict::Gap));
        assert_eq!(
            Verdict::parse_response("Assessment\n**Verdict:** Partially compliant"),
            Some(Verdict::Partial)
        );
        assert_eq!(
            Verdict::parse_response("verdict: insufficient_evidence"),
            Some(Verdict::InsufficientEvidence)
        );
        assert_eq!(Verdict::parse_response("VERDICT: compliant."), Some(Verdict::Compliant));
    }

    #[test]
    fn falls_back_to_keywords() {
        assert_eq!(
            Verdict::parse_response("The organization is not compliant with Article 21."),
            Some(Verdict::Gap)
        );
        assert_eq!(
            Verdict::parse_response("Practices are fully compliant."),
            Some(Verdict::Compliant)
        );
        assert_eq!(Verdict::parse_response("I cannot say."), None);
    }

    #[tokio::test]
    async fn zero_evidence_short_circuits_without_completion() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockProvider::default();
        let chain = ComplianceCheckChain::new(
            Arc::new(mock.clone()),
            context(dir.path(), mock.clone(), &DOCS, Some(0.99)).await,
            CompletionParams::default(),
        );

        let assessment = chain
            .check("quantum key distribution", "We use QKD for backups.")
            .await
            .unwrap();
        assert_eq!(assessment.verdict, Verdict::InsufficientEvidence);
        assert!(assessment.evidence.is_empty());
        assert_eq!(mock.complete_calls(), 0);
    }

    #[tokio::test]
    async fn assessment_carries_evidence_and_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockProvider::with_responses(vec![
            "VERDICT: partial\nIncidents are reported, but MFA is missing [2].".into(),
        ]);
        let chain = ComplianceCheckChain::new(
            Arc::new(mock.clone()),
            context(dir.path(), mock.clone(), &DOCS, None).await,
            CompletionParams::default(),
        );

        let assessment = chain
            .check("incident notification", "We notify the CSIRT within 24 hours.")
            .await
            .unwrap();
        assert_eq!(assessment.verdict, Verdict::Partial);
        assert_eq!(assessment.topic, "incident notification");
        assert_eq!(assessment.evidence.len(), 2);
        assert!(assessment.rationale.contains("MFA is missing"));
        assert!(mock.prompts()[0].contains("We notify the CSIRT within 24 hours."));
    }

    #[tokio::test]
    async fn response_without_verdict_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockProvider::with_responses(vec!["I cannot say.".into()]);
        let chain = ComplianceCheckChain::new(
            Arc::new(mock.clone()),
            context(dir.path(), mock.clone(), &DOCS, None).await,
            CompletionParams::default(),
        );
        let err = chain.check("incident notification", "none").await.unwrap_err();
        assert!(matches!(err, ChainError::UnparsableVerdict));
    }
}
