//! Chunk records and the chunking result payload

use serde::{Deserialize, Serialize};

use super::document::BoundingBox;

/// Per-request chunking options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingOptions {
    /// Token bound override; the engine default applies when `None`
    pub max_tokens: Option<usize>,
    /// Attach heading-enriched text to every chunk
    pub contextualize: bool,
    /// Attach file-level metadata to the result
    pub include_metadata: bool,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            max_tokens: None,
            contextualize: true,
            include_metadata: false,
        }
    }
}

/// A single sheet name or several
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SheetRef {
    One(String),
    Many(Vec<String>),
}

impl SheetRef {
    pub fn from_names(names: &[String]) -> Option<Self> {
        match names {
            [] => None,
            [single] => Some(Self::One(single.clone())),
            many => Some(Self::Many(many.to_vec())),
        }
    }
}

/// Location of one item contributing to a chunk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BboxInfo {
    pub page: u32,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    pub charspan: [usize; 2],
}

/// A chunk as returned to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkRecord {
    /// 1-based position in the result
    pub chunk_id: usize,
    pub text: String,
    /// Length in characters
    pub text_length: usize,
    pub token_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contextualized_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contextualized_length: Option<usize>,
    /// Opaque chunk metadata (headings, contributing items, origin)
    pub metadata: serde_json::Value,
    pub page_info: Vec<u32>,
    pub pages: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_names: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<SheetRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_index: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_index: Option<usize>,
    pub bbox_info: Vec<BboxInfo>,
}

/// Chunker settings echoed back with every result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkingConfigInfo {
    pub tokenizer: String,
    pub max_tokens: usize,
    pub merge_peers: bool,
    pub contextualize: bool,
}

/// File-level metadata, included on request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileMetadata {
    pub original_file_size: u64,
    pub mime_type: Option<String>,
    pub extension: String,
    pub total_pages: Option<u32>,
}

/// Full output of conversion + chunking for one file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkingResult {
    pub success: bool,
    pub filename: String,
    pub file_type: String,
    pub total_chunks: usize,
    pub chunking_config: ChunkingConfigInfo,
    pub chunks: Vec<ChunkRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excel_sheets: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_sheets: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_metadata: Option<FileMetadata>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_ref_shape() {
        let one = SheetRef::from_names(&["Sales".to_string()]).unwrap();
        assert_eq!(serde_json::to_value(&one).unwrap(), serde_json::json!("Sales"));

        let many = SheetRef::from_names(&["A".to_string(), "B".to_string()]).unwrap();
        assert_eq!(serde_json::to_value(&many).unwrap(), serde_json::json!(["A", "B"]));

        assert!(SheetRef::from_names(&[]).is_none());
    }
}
