//! Heading-aware, token-bounded chunking

use std::ops::Range;
use std::sync::Arc;
use unicode_segmentation::UnicodeSegmentation;

use crate::types::{ConvertedDocument, ItemLabel};

use super::tokenizer::TokenCounter;

/// Separator placed between merged peer chunks that have no common source text
const PEER_SEPARATOR: &str = "\n\n";

/// Part of one document item covered by a chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSpan {
    /// Index into `ConvertedDocument::items`
    pub index: usize,
    /// Character range inside the item text
    pub chars: (usize, usize),
}

/// A chunk before provenance is attached
#[derive(Debug, Clone, PartialEq)]
pub struct DocChunk {
    pub text: String,
    /// Enclosing headings, outermost first
    pub headings: Vec<String>,
    pub spans: Vec<ItemSpan>,
    /// Byte range in the document source, when items are slices of it
    pub source: Option<Range<usize>>,
}

impl DocChunk {
    /// Chunk text prefixed by its headings, one per line
    pub fn contextualize(&self) -> String {
        if self.headings.is_empty() {
            return self.text.clone();
        }
        format!("{}\n{}", self.headings.join("\n"), self.text)
    }
}

/// Segmentation levels tried in order when text exceeds the bound
#[derive(Debug, Clone, Copy)]
enum Granularity {
    Lines,
    Sentences,
    Words,
    Graphemes,
}

impl Granularity {
    fn finer(self) -> Option<Self> {
        match self {
            Self::Lines => Some(Self::Sentences),
            Self::Sentences => Some(Self::Words),
            Self::Words => Some(Self::Graphemes),
            Self::Graphemes => None,
        }
    }

    /// Byte offset and text of each segment
    fn segments(self, text: &str) -> Vec<(usize, &str)> {
        match self {
            Self::Lines => {
                let mut offset = 0;
                text.split_inclusive('\n')
                    .map(|line| {
                        let segment = (offset, line);
                        offset += line.len();
                        segment
                    })
                    .collect()
            }
            Self::Sentences => text.split_sentence_bound_indices().collect(),
            Self::Words => text.split_word_bound_indices().collect(),
            Self::Graphemes => text.grapheme_indices(true).collect(),
        }
    }
}

/// Hierarchical chunker: items are grouped under their heading path, split to
/// the token bound, and undersized neighbours with the same headings merged.
pub struct HybridChunker {
    tokenizer: Arc<dyn TokenCounter>,
    max_tokens: usize,
    merge_peers: bool,
}

impl HybridChunker {
    pub fn new(tokenizer: Arc<dyn TokenCounter>, max_tokens: usize, merge_peers: bool) -> Self {
        Self {
            tokenizer,
            max_tokens: max_tokens.max(1),
            merge_peers,
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Chunk a converted document in reading order
    pub fn chunk(&self, doc: &ConvertedDocument) -> Vec<DocChunk> {
        let mut headings: Vec<(u8, String)> = Vec::new();
        let mut chunks = Vec::new();

        for (index, item) in doc.items.iter().enumerate() {
            if item.label.is_heading() {
                let level = if item.label == ItemLabel::Title { 0 } else { item.level };
                while headings.last().map(|(l, _)| *l >= level).unwrap_or(false) {
                    headings.pop();
                }
                headings.push((level, item.text.trim().to_string()));
                continue;
            }

            let trimmed = item.text.trim();
            if trimmed.is_empty() {
                continue;
            }
            let lead = item.text.len() - item.text.trim_start().len();
            let heading_path: Vec<String> = headings.iter().map(|(_, h)| h.clone()).collect();
            let budget = self.budget(&heading_path);
            let granularity = if item.label == ItemLabel::Table {
                Granularity::Lines
            } else {
                Granularity::Sentences
            };

            let mut ranges = Vec::new();
            self.split_into(trimmed, 0, budget, granularity, &mut ranges);

            for range in ranges {
                let raw = &trimmed[range.clone()];
                let piece = raw.trim();
                if piece.is_empty() {
                    continue;
                }
                let start = lead + range.start + (raw.len() - raw.trim_start().len());
                let end = start + piece.len();
                let chars = (
                    item.text[..start].chars().count(),
                    item.text[..end].chars().count(),
                );

                let source = match (item.source_offset, &doc.source_text) {
                    (Some(offset), Some(_)) => Some(offset + start..offset + end),
                    _ => None,
                };

                chunks.push(DocChunk {
                    text: piece.to_string(),
                    headings: heading_path.clone(),
                    spans: vec![ItemSpan { index, chars }],
                    source,
                });
            }
        }

        if self.merge_peers {
            chunks = self.merge(chunks, doc.source_text.as_deref());
        }

        tracing::debug!(
            "Chunked {} into {} chunks (max_tokens={})",
            doc.filename,
            chunks.len(),
            self.max_tokens
        );
        chunks
    }

    /// Tokens left for chunk text once its headings are accounted for
    fn budget(&self, headings: &[String]) -> usize {
        if headings.is_empty() {
            return self.max_tokens;
        }
        let heading_tokens = self.tokenizer.count_tokens(&headings.join("\n"));
        self.max_tokens
            .saturating_sub(heading_tokens)
            .max(self.max_tokens / 2)
            .max(1)
    }

    /// Greedily pack segments into byte ranges that fit the budget, descending
    /// to finer segments when a single one is too large
    fn split_into(
        &self,
        text: &str,
        base: usize,
        budget: usize,
        granularity: Granularity,
        out: &mut Vec<Range<usize>>,
    ) {
        if self.tokenizer.count_tokens(text) <= budget {
            out.push(base..base + text.len());
            return;
        }

        let mut start = 0;
        let mut end = 0;
        for (offset, segment) in granularity.segments(text) {
            let segment_end = offset + segment.len();
            if self.tokenizer.count_tokens(&text[start..segment_end]) <= budget {
                end = segment_end;
                continue;
            }

            if end > start {
                out.push(base + start..base + end);
            }

            if self.tokenizer.count_tokens(segment) > budget {
                match granularity.finer() {
                    Some(finer) => self.split_into(segment, base + offset, budget, finer, out),
                    None => out.push(base + offset..base + segment_end),
                }
                start = segment_end;
                end = segment_end;
            } else {
                start = offset;
                end = segment_end;
            }
        }

        if end > start {
            out.push(base + start..base + end);
        }
    }

    /// Join consecutive chunks under identical headings while they fit.
    ///
    /// Chunks that both map into `source` are joined by re-slicing it, so the
    /// original separator between them is kept.
    fn merge(&self, chunks: Vec<DocChunk>, source: Option<&str>) -> Vec<DocChunk> {
        let mut merged: Vec<DocChunk> = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            if let Some(last) = merged.last_mut() {
                if last.headings == chunk.headings {
                    let span = match (&last.source, &chunk.source) {
                        (Some(a), Some(b)) if a.end <= b.start => Some(a.start..b.end),
                        _ => None,
                    };
                    let sliced = match (source, &span) {
                        (Some(source), Some(span)) => source.get(span.clone()),
                        _ => None,
                    };
                    let candidate = match sliced {
                        Some(text) => text.to_string(),
                        None => format!("{}{}{}", last.text, PEER_SEPARATOR, chunk.text),
                    };

                    if self.tokenizer.count_tokens(&candidate) <= self.budget(&last.headings) {
                        last.source = sliced.and(span);
                        last.text = candidate;
                        last.spans.extend(chunk.spans);
                        continue;
                    }
                }
            }
            merged.push(chunk);
        }

        merged
    }
}
