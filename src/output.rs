//! Plain-text rendering of command results.

use std::fmt::Write as _;

use regula_core::{Answer, ChainError, ComplianceAssessment, IngestReport};
use regula_knowledge::Chunk;

pub fn answer(answer: &Answer) -> String {
    let mut out = answer.answer.clone();
    out.push_str("\n\n");
    out.push_str(&sources(&answer.sources));
    out
}

pub fn sources(chunks: &[Chunk]) -> String {
    if chunks.is_empty() {
        return "(no sources found)".to_owned();
    }
    let mut out = String::from("Sources:");
    for (i, chunk) in chunks.iter().enumerate() {
        let _ = write!(out, "\n  [{}] {}", i + 1, chunk.provenance());
    }
    out
}

pub fn failure(err: &ChainError) -> String {
    if err.is_retryable() {
        format!("could not answer: {err} (temporary, try again)")
    } else {
        format!("could not answer: {err}")
    }
}

pub fn ingest_report(report: &IngestReport) -> String {
    if report.reused {
        return format!(
            "Reusing existing index with {} chunks (pass --rebuild to re-ingest).",
            report.entries
        );
    }
    let mut out = format!(
        "Indexed {} chunks from {} documents ({} embedded, {} from cache).",
        report.entries, report.documents, report.embedded, report.cache_hits
    );
    if !report.skipped.is_empty() {
        let _ = write!(out, "\nSkipped {} documents:", report.skipped.len());
        for skipped in &report.skipped {
            let _ = write!(out, "\n  {}: {}", skipped.path.display(), skipped.error);
        }
    }
    out
}

pub fn assessment(assessment: &ComplianceAssessment) -> String {
    let mut out = format!(
        "Topic: {}\nVerdict: {}",
        assessment.topic, assessment.verdict
    );
    if !assessment.rationale.is_empty() {
        out.push_str("\n\n");
        out.push_str(&assessment.rationale);
    }
    out.push_str("\n\n");
    out.push_str(&sources(&assessment.evidence));
    out
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use regula_core::Verdict;
    use regula_knowledge::document::SkippedDocument;
    use regula_knowledge::{ChunkId, DocumentError, DocumentMetadata};

    use super::*;

    fn chunk(source: &str, page: Option<u32>, section: Option<&str>) -> Chunk {
        let mut metadata = DocumentMetadata::new(source, "pdf");
        metadata.page = page;
        metadata.section = section.map(str::to_owned);
        Chunk {
            id: ChunkId::new(&metadata, 0),
            text: "text".into(),
            start: 0,
            end: 4,
            sequence: 0,
            metadata,
        }
    }

    #[test]
    fn answer_lists_numbered_sources() {
        let rendered = answer(&Answer {
            answer: "Within 24 hours [1].".into(),
            sources: vec![
                chunk("nis2.pdf", Some(12), Some("Article 23")),
                chunk("dora.pdf", None, None),
            ],
        });
        assert_eq!(
            rendered,
            "Within 24 hours [1].\n\nSources:\n  [1] nis2.pdf (page 12) [Article 23]\n  [2] dora.pdf"
        );
    }

    #[test]
    fn answer_without_sources_says_so() {
        let rendered = answer(&Answer {
            answer: "The excerpts do not cover this.".into(),
            sources: vec![],
        });
        assert!(rendered.ends_with("(no sources found)"));
        assert!(!rendered.contains("could not answer"));
    }

    #[test]
    fn failure_marks_retryable_errors() {
        let timeout = ChainError::Timeout {
            provider: "openai",
            seconds: 120,
        };
        assert!(failure(&timeout).starts_with("could not answer: "));
        assert!(failure(&timeout).ends_with("(temporary, try again)"));
        assert!(!failure(&ChainError::UnparsableVerdict).contains("temporary"));
    }

    #[test]
    fn report_lists_skipped_documents() {
        let report = IngestReport {
            documents: 2,
            skipped: vec![SkippedDocument {
                path: PathBuf::from("docs/legacy.docx"),
                error: DocumentError::Docx("invalid Zip archive".into()),
            }],
            chunks: 3,
            embedded: 3,
            entries: 3,
            ..IngestReport::default()
        };
        let rendered = ingest_report(&report);
        assert!(rendered.starts_with("Indexed 3 chunks from 2 documents (3 embedded, 0 from cache)."));
        assert!(rendered.contains("Skipped 1 documents:\n  docs/legacy.docx: DOCX error: invalid Zip archive"));
    }

    #[test]
    fn reused_report_hints_rebuild() {
        let report = IngestReport {
            entries: 7,
            reused: true,
            ..IngestReport::default()
        };
        assert!(ingest_report(&report).contains("--rebuild"));
    }

    #[test]
    fn insufficient_evidence_has_no_rationale_block() {
        let rendered = assessment(&ComplianceAssessment {
            topic: "quantum key distribution".into(),
            practices: "none".into(),
            evidence: vec![],
            verdict: Verdict::InsufficientEvidence,
            rationale: String::new(),
        });
        assert_eq!(
            rendered,
            "Topic: quantum key distribution\nVerdict: insufficient_evidence\n\n(no sources found)"
        );
    }
}
