use super::{Span, SplitterConfig, materialize};
use crate::document::{Chunk, Document};

/// Unit produced by separator descent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Piece {
    /// At most `chunk_size` characters; packed with its neighbours.
    Packable { start: usize, end: usize, chars: usize },
    /// A hard cut of an oversized token, emitted as a chunk of its own with no
    /// overlap into or out of it.
    Atomic { start: usize, end: usize },
}

/// Splits at decreasing separator granularity, then greedily packs the pieces
/// into chunks of at most `chunk_size` characters, each chunk after the first
/// in a run starting with the last `chunk_overlap` characters of its
/// predecessor. The overlap prefix shrinks when it and the next piece would not
/// fit together in `chunk_size`.
///
/// Text with no separator left that still exceeds `chunk_size` is hard-cut into
/// `chunk_size`-character pieces.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    config: SplitterConfig,
}

impl RecursiveSplitter {
    /// Callers must validate `config` first; see [`SplitterConfig::validate`].
    #[must_use]
    pub fn new(config: SplitterConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    #[must_use]
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        let spans = self.split_range(&document.content, 0, document.content.len(), None);
        materialize(document, spans)
    }

    /// Chunk spans covering `text[start..end]`, in absolute byte offsets.
    pub(crate) fn split_range(
        &self,
        text: &str,
        start: usize,
        end: usize,
        section: Option<&str>,
    ) -> Vec<Span> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap.min(size.saturating_sub(1));
        let mut pieces = Vec::new();
        descend(text, start, end, &self.config.separators, size, &mut pieces);
        pack(text, &pieces, size, overlap)
            .into_iter()
            .map(|(start, end)| Span {
                start,
                end,
                section: section.map(str::to_owned),
            })
            .collect()
    }
}

fn descend(
    text: &str,
    start: usize,
    end: usize,
    separators: &[String],
    chunk_size: usize,
    out: &mut Vec<Piece>,
) {
    let span = &text[start..end];
    let chars = span.chars().count();
    if chars <= chunk_size {
        out.push(Piece::Packable { start, end, chars });
        return;
    }

    let Some((idx, sep)) = separators
        .iter()
        .enumerate()
        .find(|(_, s)| !s.is_empty() && span.contains(s.as_str()))
    else {
        hard_cut(span, start, chunk_size, out);
        return;
    };

    // Separators stay attached to the piece they terminate.
    let finer = &separators[idx + 1..];
    let mut piece_start = start;
    for (pos, _) in span.match_indices(sep.as_str()) {
        let piece_end = start + pos + sep.len();
        descend(text, piece_start, piece_end, finer, chunk_size, out);
        piece_start = piece_end;
    }
    if piece_start < end {
        descend(text, piece_start, end, finer, chunk_size, out);
    }
}

fn hard_cut(span: &str, base: usize, chunk_size: usize, out: &mut Vec<Piece>) {
    let mut cut_start = 0;
    let mut count = 0;
    for (i, _) in span.char_indices() {
        if count == chunk_size {
            out.push(Piece::Atomic {
                start: base + cut_start,
                end: base + i,
            });
            cut_start = i;
            count = 0;
        }
        count += 1;
    }
    if cut_start < span.len() {
        out.push(Piece::Atomic {
            start: base + cut_start,
            end: base + span.len(),
        });
    }
}

fn pack(text: &str, pieces: &[Piece], chunk_size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    // (start, end, chars) of the chunk being assembled.
    let mut run: Option<(usize, usize, usize)> = None;

    for piece in pieces {
        match *piece {
            Piece::Atomic { start, end } => {
                if let Some((s, e, _)) = run.take() {
                    spans.push((s, e));
                }
                spans.push((start, end));
            }
            Piece::Packable { start, end, chars } => {
                run = Some(match run {
                    None => (start, end, chars),
                    Some((s, _, n)) if n + chars <= chunk_size => (s, end, n + chars),
                    Some((s, e, n)) => {
                        spans.push((s, e));
                        let carried = overlap.min(n).min(chunk_size - chars);
                        (tail_start(text, s, e, carried), end, carried + chars)
                    }
                });
            }
        }
    }
    if let Some((s, e, _)) = run {
        spans.push((s, e));
    }
    spans
}

/// Byte offset where the last `overlap` characters of `text[start..end]` begin.
fn tail_start(text: &str, start: usize, end: usize, overlap: usize) -> usize {
    if overlap == 0 {
        return end;
    }
    text[start..end]
        .char_indices()
        .rev()
        .nth(overlap - 1)
        .map_or(start, |(i, _)| start + i)
}
