//! Shapes engine output into the response payload

use crate::types::document::describe_extension;
use crate::types::{
    ChunkRecord, ChunkingConfigInfo, ChunkingOptions, ChunkingResult, ConvertedDocument,
    FileMetadata,
};

use super::engine::ConversionEngine;

/// Everything about the upload the result needs besides the engine output
#[derive(Debug, Clone)]
pub struct UploadInfo<'a> {
    pub filename: &'a str,
    /// Dotted lowercase extension
    pub extension: &'a str,
    pub file_size: u64,
}

/// Build the chunking result shared by the synchronous endpoint and background jobs
pub fn assemble_result(
    engine: &dyn ConversionEngine,
    upload: &UploadInfo<'_>,
    doc: &ConvertedDocument,
    chunks: Vec<ChunkRecord>,
    options: &ChunkingOptions,
) -> ChunkingResult {
    let excel_sheets = match doc.sheet_names() {
        Some(sheets) if upload.extension == ".xlsx" && !sheets.is_empty() => Some(sheets.to_vec()),
        _ => None,
    };

    let file_metadata = options.include_metadata.then(|| FileMetadata {
        original_file_size: upload.file_size,
        mime_type: mime_guess::from_path(upload.filename)
            .first()
            .map(|m| m.to_string()),
        extension: upload.extension.to_string(),
        total_pages: doc.total_pages.filter(|&p| p > 0),
    });

    ChunkingResult {
        success: true,
        filename: upload.filename.to_string(),
        file_type: describe_extension(upload.extension).to_string(),
        total_chunks: chunks.len(),
        chunking_config: ChunkingConfigInfo {
            tokenizer: engine.tokenizer_name().to_string(),
            max_tokens: options.max_tokens.unwrap_or_else(|| engine.default_max_tokens()),
            merge_peers: engine.merge_peers(),
            contextualize: options.contextualize,
        },
        chunks,
        total_sheets: excel_sheets.as_ref().map(Vec::len),
        excel_sheets,
        file_metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::engine::DocumentEngine;
    use crate::ingestion::tokenizer::WordTokenCounter;
    use crate::types::{FileType, SourceLayout};
    use std::sync::Arc;

    fn engine() -> DocumentEngine {
        DocumentEngine::new(Arc::new(WordTokenCounter::new("test-model")), 256, true)
    }

    #[test]
    fn test_xlsx_sheets_and_metadata() {
        let doc = ConvertedDocument::new(
            "book.xlsx",
            FileType::Xlsx,
            SourceLayout::Spreadsheet {
                sheets: vec!["One".to_string(), "Two".to_string()],
            },
        );
        let upload = UploadInfo {
            filename: "book.xlsx",
            extension: ".xlsx",
            file_size: 42,
        };
        let options = ChunkingOptions {
            include_metadata: true,
            ..Default::default()
        };

        let result = assemble_result(&engine(), &upload, &doc, Vec::new(), &options);
        assert!(result.success);
        assert_eq!(result.file_type, "Excel spreadsheet");
        assert_eq!(result.total_sheets, Some(2));
        assert_eq!(result.chunking_config.max_tokens, 256);
        assert_eq!(result.chunking_config.tokenizer, "test-model");

        let metadata = result.file_metadata.unwrap();
        assert_eq!(metadata.original_file_size, 42);
        assert_eq!(metadata.extension, ".xlsx");
        assert!(metadata.total_pages.is_none());
    }

    #[test]
    fn test_plain_result_has_no_optional_fields() {
        let doc = ConvertedDocument::new("a.txt", FileType::Txt, SourceLayout::Sectioned);
        let upload = UploadInfo {
            filename: "a.txt",
            extension: ".txt",
            file_size: 1,
        };
        let options = ChunkingOptions {
            max_tokens: Some(64),
            ..Default::default()
        };

        let result = assemble_result(&engine(), &upload, &doc, Vec::new(), &options);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["chunking_config"]["max_tokens"], 64);
        assert!(json.get("excel_sheets").is_none());
        assert!(json.get("file_metadata").is_none());
    }
}
