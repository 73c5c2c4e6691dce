//! Conversion engine: file -> structured document -> enriched chunk records

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::types::{
    BboxInfo, ChunkRecord, ChunkingOptions, ConvertedDocument, ItemLocation, SheetRef,
    SourceLayout,
};

use super::chunker::{DocChunk, HybridChunker};
use super::parser::FileParser;
use super::tokenizer::{HuggingFaceTokenCounter, TokenCounter, WordTokenCounter};

/// Synchronous conversion and chunking capability.
///
/// Implementations know nothing about jobs; both the request handlers and the
/// background worker call them, so the same input yields the same output.
pub trait ConversionEngine: Send + Sync {
    /// Convert the file at `path`; its final path component decides the format
    fn convert(&self, path: &Path) -> Result<ConvertedDocument>;

    /// Split a converted document into ordered chunk records
    fn chunk(&self, doc: &ConvertedDocument, options: &ChunkingOptions) -> Result<Vec<ChunkRecord>>;

    /// Tokenizer identifier reported to clients
    fn tokenizer_name(&self) -> &str;

    /// Token bound used when a request does not set one
    fn default_max_tokens(&self) -> usize;

    /// Whether adjacent chunks under the same headings are merged
    fn merge_peers(&self) -> bool;
}

/// Default engine backed by [`FileParser`] and [`HybridChunker`]
pub struct DocumentEngine {
    tokenizer: Arc<dyn TokenCounter>,
    max_tokens: usize,
    merge_peers: bool,
}

impl DocumentEngine {
    pub fn new(tokenizer: Arc<dyn TokenCounter>, max_tokens: usize, merge_peers: bool) -> Self {
        Self {
            tokenizer,
            max_tokens,
            merge_peers,
        }
    }

    /// Build from configuration, loading a Hugging Face tokenizer when a path is set
    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        let tokenizer: Arc<dyn TokenCounter> = match &config.tokenizer_path {
            Some(path) => {
                tracing::info!("Loading tokenizer {} from {}", config.tokenizer_model, path.display());
                Arc::new(HuggingFaceTokenCounter::from_file(path, &config.tokenizer_model)?)
            }
            None => {
                tracing::info!(
                    "No tokenizer_path configured, counting word boundaries for {}",
                    config.tokenizer_model
                );
                Arc::new(WordTokenCounter::new(&config.tokenizer_model))
            }
        };

        Ok(Self::new(tokenizer, config.max_tokens, config.merge_peers))
    }

    fn build_record(
        &self,
        doc: &ConvertedDocument,
        ordinal: usize,
        chunk: DocChunk,
        contextualize: bool,
        mimetype: &str,
    ) -> ChunkRecord {
        let contextualized = contextualize.then(|| chunk.contextualize());

        let mut metadata = serde_json::Map::new();
        if !chunk.headings.is_empty() {
            metadata.insert("headings".into(), serde_json::json!(chunk.headings));
        }
        let doc_items: Vec<serde_json::Value> = chunk
            .spans
            .iter()
            .map(|span| {
                serde_json::json!({
                    "self_ref": format!("#/items/{}", span.index),
                    "label": doc.items[span.index].label.as_str(),
                })
            })
            .collect();
        metadata.insert("doc_items".into(), serde_json::Value::Array(doc_items));
        metadata.insert(
            "origin".into(),
            serde_json::json!({ "filename": doc.filename, "mimetype": mimetype }),
        );

        let mut record = ChunkRecord {
            chunk_id: ordinal + 1,
            text_length: chunk.text.chars().count(),
            token_count: self.tokenizer.count_tokens(&chunk.text),
            contextualized_length: contextualized.as_ref().map(|c| c.chars().count()),
            contextualized_text: contextualized,
            text: String::new(),
            metadata: serde_json::Value::Object(metadata),
            page_info: Vec::new(),
            pages: Vec::new(),
            sheet_names: None,
            sheet: None,
            sheet_index: None,
            section_index: None,
            bbox_info: Vec::new(),
        };

        match &doc.layout {
            SourceLayout::Paged => {
                let mut pages = BTreeSet::new();
                for span in &chunk.spans {
                    let item = &doc.items[span.index];
                    if let Some(ItemLocation::Page { page_no, bbox, .. }) = &item.location {
                        pages.insert(*page_no);
                        record.bbox_info.push(BboxInfo {
                            page: *page_no,
                            label: item.label.as_str().to_string(),
                            bbox: *bbox,
                            charspan: [span.chars.0, span.chars.1],
                        });
                    }
                }
                if pages.is_empty() {
                    record.section_index = Some(ordinal + 1);
                } else {
                    record.pages = pages.into_iter().collect();
                    record.page_info = record.pages.clone();
                }
            }
            SourceLayout::Spreadsheet { sheets } => {
                // Keyed by workbook position so names and indices stay paired
                let mut matched: BTreeMap<u32, String> = BTreeMap::new();
                for span in &chunk.spans {
                    if let Some(ItemLocation::Sheet { index, name }) = &doc.items[span.index].location {
                        // Only names that exist in the workbook are reported
                        if sheets.contains(name) {
                            matched.insert(*index, name.clone());
                        }
                    }
                }
                if !matched.is_empty() {
                    let (indices, names): (Vec<u32>, Vec<String>) = matched.into_iter().unzip();
                    record.sheet = SheetRef::from_names(&names);
                    record.sheet_names = Some(names);
                    record.sheet_index = Some(indices);
                }
            }
            SourceLayout::Sectioned => record.section_index = Some(ordinal + 1),
        }

        record.text = chunk.text;
        record
    }
}

impl ConversionEngine for DocumentEngine {
    fn convert(&self, path: &Path) -> Result<ConvertedDocument> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::conversion(format!("Invalid file path: {}", path.display())))?;

        FileParser::parse(path, filename).map_err(|e| match e {
            Error::Conversion(_) | Error::UnsupportedFormat(_) => e,
            other => Error::conversion(other.to_string()),
        })
    }

    fn chunk(&self, doc: &ConvertedDocument, options: &ChunkingOptions) -> Result<Vec<ChunkRecord>> {
        let max_tokens = options.max_tokens.unwrap_or(self.max_tokens);
        if max_tokens == 0 {
            return Err(Error::chunking("max_tokens must be greater than zero"));
        }

        let chunker = HybridChunker::new(self.tokenizer.clone(), max_tokens, self.merge_peers);
        let mimetype = mime_guess::from_path(&doc.filename)
            .first_or_octet_stream()
            .to_string();

        Ok(chunker
            .chunk(doc)
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| self.build_record(doc, i, chunk, options.contextualize, &mimetype))
            .collect())
    }

    fn tokenizer_name(&self) -> &str {
        self.tokenizer.name()
    }

    fn default_max_tokens(&self) -> usize {
        self.max_tokens
    }

    fn merge_peers(&self) -> bool {
        self.merge_peers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::fixtures;
    use crate::types::{BoundingBox, CoordOrigin, DocItem, FileType, ItemLabel};

    fn engine(max_tokens: usize) -> DocumentEngine {
        DocumentEngine::new(Arc::new(WordTokenCounter::new("words")), max_tokens, true)
    }

    #[test]
    fn test_paged_provenance() {
        let bbox = BoundingBox {
            l: 0.0,
            t: 792.0,
            r: 612.0,
            b: 0.0,
            coord_origin: CoordOrigin::BottomLeft,
        };
        let mut doc = ConvertedDocument::new("deck.pdf", FileType::Pdf, SourceLayout::Paged);
        doc.push(DocItem::new(ItemLabel::Paragraph, "Page two text.").on_page(2, Some(bbox)));
        doc.push(DocItem::new(ItemLabel::Paragraph, "Page one text.").on_page(1, Some(bbox)));

        let chunks = engine(100).chunk(&doc, &ChunkingOptions::default()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].pages, vec![1, 2]);
        assert_eq!(chunks[0].page_info, vec![1, 2]);
        assert_eq!(chunks[0].bbox_info.len(), 2);
        assert_eq!(chunks[0].bbox_info[0].page, 2);
        assert_eq!(chunks[0].bbox_info[0].charspan, [0, 14]);
        assert!(chunks[0].section_index.is_none());
        assert!(chunks[0].sheet_names.is_none());
    }

    #[test]
    fn test_spreadsheet_provenance() {
        let mut doc = ConvertedDocument::new(
            "book.xlsx",
            FileType::Xlsx,
            SourceLayout::Spreadsheet {
                sheets: vec!["Zeta".to_string(), "Alpha".to_string()],
            },
        );
        doc.push(DocItem::new(ItemLabel::Table, "| a |\n| --- |\n| 1 |").on_sheet(1, "Zeta"));
        doc.push(DocItem::new(ItemLabel::Table, "| b |\n| --- |\n| 2 |").on_sheet(2, "Alpha"));

        let chunks = engine(100).chunk(&doc, &ChunkingOptions::default()).unwrap();
        assert_eq!(chunks.len(), 1);
        let chunk = &chunks[0];
        assert!(chunk.pages.is_empty());
        // sheet_names[k] names the sheet at sheet_index[k]
        assert_eq!(
            chunk.sheet_names,
            Some(vec!["Zeta".to_string(), "Alpha".to_string()])
        );
        assert_eq!(chunk.sheet_index, Some(vec![1, 2]));
        assert_eq!(
            chunk.sheet,
            Some(SheetRef::Many(vec!["Zeta".to_string(), "Alpha".to_string()]))
        );
        assert!(chunk.section_index.is_none());
    }

    #[test]
    fn test_sheet_outside_workbook_ignored() {
        let mut doc = ConvertedDocument::new(
            "book.xlsx",
            FileType::Xlsx,
            SourceLayout::Spreadsheet {
                sheets: vec!["Data".to_string()],
            },
        );
        doc.push(DocItem::new(ItemLabel::Table, "| a |\n| --- |\n| 1 |").on_sheet(1, "Data"));
        doc.push(DocItem::new(ItemLabel::Table, "| b |\n| --- |\n| 2 |").on_sheet(2, "Ghost"));

        let chunks = engine(100).chunk(&doc, &ChunkingOptions::default()).unwrap();
        assert_eq!(chunks[0].sheet_names, Some(vec!["Data".to_string()]));
        assert_eq!(chunks[0].sheet_index, Some(vec![1]));
        assert_eq!(chunks[0].sheet, Some(SheetRef::One("Data".to_string())));
    }

    #[test]
    fn test_workbook_chunks_carry_paired_sheets() {
        let dir = tempfile::tempdir().unwrap();
        let zeta: &[&[&str]] = &[&["name", "qty"], &["apple", "3"]];
        let alpha: &[&[&str]] = &[&["key", "value"], &["x", "1"]];
        let path = fixtures::write_file(
            dir.path(),
            "book.xlsx",
            &fixtures::workbook(&[("Zeta", zeta), ("Alpha", alpha)]),
        );

        let engine = engine(512);
        let doc = engine.convert(&path).unwrap();
        let workbook_sheets = doc.sheet_names().unwrap().to_vec();
        assert_eq!(workbook_sheets, vec!["Zeta".to_string(), "Alpha".to_string()]);

        let merged = engine.chunk(&doc, &ChunkingOptions::default()).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].sheet_names, Some(workbook_sheets.clone()));
        assert_eq!(merged[0].sheet_index, Some(vec![1, 2]));
        assert!(merged[0].pages.is_empty());

        let options = ChunkingOptions {
            max_tokens: Some(25),
            ..Default::default()
        };
        let split = engine.chunk(&doc, &options).unwrap();
        assert_eq!(split.len(), 2);
        for chunk in &split {
            assert!(chunk.pages.is_empty());
            assert!(chunk.page_info.is_empty());
            let names = chunk.sheet_names.as_ref().unwrap();
            assert!(names.iter().all(|n| workbook_sheets.contains(n)));
        }
        assert_eq!(split[0].sheet, Some(SheetRef::One("Zeta".to_string())));
        assert_eq!(split[0].sheet_index, Some(vec![1]));
        assert!(split[0].text.contains("apple"));
        assert_eq!(split[1].sheet, Some(SheetRef::One("Alpha".to_string())));
        assert_eq!(split[1].sheet_index, Some(vec![2]));
    }

    #[test]
    fn test_text_chunks_are_source_substrings() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(512);

        for source in [
            "First paragraph.\n\n\nSecond paragraph.",
            "First paragraph.\r\n\r\nSecond paragraph.\r\n",
            "First paragraph.\n  \t\nSecond paragraph.",
        ] {
            let path = fixtures::write_file(dir.path(), "notes.txt", source.as_bytes());
            let doc = engine.convert(&path).unwrap();
            let chunks = engine.chunk(&doc, &ChunkingOptions::default()).unwrap();

            assert_eq!(chunks.len(), 1);
            assert!(source.contains(&chunks[0].text), "{:?}", chunks[0].text);
            assert!(chunks[0].text.starts_with("First paragraph."));
            assert!(chunks[0].text.ends_with("Second paragraph."));
        }
    }

    #[test]
    fn test_sectioned_records() {
        let mut doc = ConvertedDocument::new("a.md", FileType::Markdown, SourceLayout::Sectioned);
        doc.push(DocItem::heading(1, "Intro"));
        doc.push(DocItem::new(ItemLabel::Paragraph, "Hello there."));
        doc.push(DocItem::heading(1, "Next"));
        doc.push(DocItem::new(ItemLabel::Paragraph, "More text."));

        let options = ChunkingOptions::default();
        let chunks = engine(100).chunk(&doc, &options).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_id, 1);
        assert_eq!(chunks[1].section_index, Some(2));
        assert_eq!(chunks[0].contextualized_text.as_deref(), Some("Intro\nHello there."));
        assert_eq!(chunks[0].contextualized_length, Some(18));
        assert_eq!(chunks[0].token_count, 3);
        assert_eq!(chunks[0].metadata["headings"], serde_json::json!(["Intro"]));
        assert_eq!(chunks[0].metadata["origin"]["filename"], "a.md");

        let plain = ChunkingOptions {
            contextualize: false,
            ..Default::default()
        };
        let chunks = engine(100).chunk(&doc, &plain).unwrap();
        assert!(chunks[0].contextualized_text.is_none());
    }

    #[test]
    fn test_zero_max_tokens_rejected() {
        let doc = ConvertedDocument::new("a.txt", FileType::Txt, SourceLayout::Sectioned);
        let options = ChunkingOptions {
            max_tokens: Some(0),
            ..Default::default()
        };
        assert!(matches!(engine(10).chunk(&doc, &options), Err(Error::Chunking(_))));
    }
}
