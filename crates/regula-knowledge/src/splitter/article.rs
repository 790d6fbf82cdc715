use std::sync::LazyLock;

use regex::Regex;

use super::{RecursiveSplitter, Span, SplitterConfig, materialize};
use crate::document::{Chunk, Document};

/// A structural marker opening a line or following a sentence end, e.g.
/// `Article 21:` or `CHAPTER IV.`; the boundary is the start of `heading`.
static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)(?:^[ \t]*|[.!?;]\s+)(?P<heading>(?:Article|ARTICLE|Section|SECTION|Chapter|CHAPTER|Annex|ANNEX)\s+(?:\d+[a-z]?|[IVXLC]+))\s*(?:[:.\-–]|$)",
    )
    .unwrap()
});

/// Partitions text at article/section markers and chunks each section on its
/// own.
///
/// A section that fits `chunk_size` becomes exactly one chunk. Larger sections
/// go through the recursive algorithm with the section as its whole input, so
/// no chunk straddles a boundary and overlap never carries text across one.
/// Text before the first marker forms a preamble section with no heading.
#[derive(Debug, Clone)]
pub struct ArticleAwareSplitter {
    inner: RecursiveSplitter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Section {
    pub start: usize,
    pub end: usize,
    pub heading: Option<String>,
}

impl ArticleAwareSplitter {
    #[must_use]
    pub fn new(inner: RecursiveSplitter) -> Self {
        Self { inner }
    }

    #[must_use]
    pub fn config(&self) -> &SplitterConfig {
        self.inner.config()
    }

    #[must_use]
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        let text = &document.content;
        let chunk_size = self.config().chunk_size;
        let mut spans = Vec::new();

        for section in sections(text) {
            let heading = section.heading.as_deref();
            if text[section.start..section.end].chars().count() <= chunk_size {
                spans.push(Span {
                    start: section.start,
                    end: section.end,
                    section: section.heading.clone(),
                });
            } else {
                spans.extend(
                    self.inner
                        .split_range(text, section.start, section.end, heading),
                );
            }
        }

        materialize(document, spans)
    }
}

/// Section spans in reading order, trailing whitespace trimmed, blank ones dropped.
pub(crate) fn sections(text: &str) -> Vec<Section> {
    let mut starts: Vec<(usize, Option<String>)> = vec![(0, None)];
    for caps in MARKER_RE.captures_iter(text) {
        let Some(m) = caps.name("heading") else {
            continue;
        };
        let heading = m.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
        if m.start() == 0 {
            starts[0] = (0, Some(heading));
        } else {
            starts.push((m.start(), Some(heading)));
        }
    }

    let mut out = Vec::with_capacity(starts.len());
    for (i, (start, heading)) in starts.iter().enumerate() {
        let raw_end = starts.get(i + 1).map_or(text.len(), |(s, _)| *s);
        let end = start + text[*start..raw_end].trim_end().len();
        if text[*start..end].trim().is_empty() {
            continue;
        }
        out.push(Section {
            start: *start,
            end,
            heading: heading.clone(),
        });
    }
    out
}
