//! Supported formats and the structured document produced by conversion

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Accepted upload extensions with their descriptions, in display order
pub const SUPPORTED_EXTENSIONS: [(&str, &str); 16] = [
    (".pdf", "PDF document"),
    (".docx", "Word document"),
    (".xlsx", "Excel spreadsheet"),
    (".pptx", "PowerPoint presentation"),
    (".html", "HTML file"),
    (".htm", "HTML file"),
    (".md", "Markdown file"),
    (".txt", "Text file"),
    (".json", "JSON file"),
    (".xml", "XML file"),
    (".csv", "CSV file"),
    (".jpg", "JPEG image"),
    (".jpeg", "JPEG image"),
    (".png", "PNG image"),
    (".gif", "GIF image"),
    (".bmp", "BMP image"),
];

/// Supported file types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// PDF document
    Pdf,
    /// Microsoft Word document (.docx)
    Docx,
    /// Excel spreadsheet (.xlsx)
    Xlsx,
    /// PowerPoint presentation (.pptx)
    Pptx,
    /// HTML document (.html, .htm)
    Html,
    /// Markdown file
    Markdown,
    /// Plain text file
    Txt,
    /// JSON file
    Json,
    /// XML file
    Xml,
    /// CSV file
    Csv,
    /// Raster image (.jpg, .jpeg, .png, .gif, .bmp)
    Image,
}

impl FileType {
    /// Detect file type from a dotted, lowercase extension such as `.pdf`
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            ".pdf" => Some(Self::Pdf),
            ".docx" => Some(Self::Docx),
            ".xlsx" => Some(Self::Xlsx),
            ".pptx" => Some(Self::Pptx),
            ".html" | ".htm" => Some(Self::Html),
            ".md" => Some(Self::Markdown),
            ".txt" => Some(Self::Txt),
            ".json" => Some(Self::Json),
            ".xml" => Some(Self::Xml),
            ".csv" => Some(Self::Csv),
            ".jpg" | ".jpeg" | ".png" | ".gif" | ".bmp" => Some(Self::Image),
            _ => None,
        }
    }

    /// Resolve the file type of an uploaded filename, rejecting anything outside the supported set
    pub fn from_filename(filename: &str) -> Result<(Self, String)> {
        let ext = extension_of(filename);
        Self::from_extension(&ext)
            .map(|file_type| (file_type, ext.clone()))
            .ok_or_else(|| {
                let supported: Vec<&str> = SUPPORTED_EXTENSIONS.iter().map(|(e, _)| *e).collect();
                Error::UnsupportedFormat(format!(
                    "'{}' is not supported. Supported formats: {}",
                    if ext.is_empty() { filename } else { ext.as_str() },
                    supported.join(", ")
                ))
            })
    }
}

/// Dotted lowercase extension of a filename (`report.PDF` -> `.pdf`), empty when absent
pub fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

/// Human-readable description for a dotted extension
pub fn describe_extension(ext: &str) -> &'static str {
    SUPPORTED_EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, d)| *d)
        .unwrap_or("Unknown")
}

/// How a document's content is located, decided once per document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLayout {
    /// Page-based sources (PDF pages, presentation slides, images)
    Paged,
    /// Workbook with its sheet names in order
    Spreadsheet { sheets: Vec<String> },
    /// Flowing documents without a page concept
    Sectioned,
}

/// Semantic role of a document item
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemLabel {
    Title,
    SectionHeader,
    Paragraph,
    ListItem,
    Table,
    Code,
    Picture,
}

impl ItemLabel {
    pub fn is_heading(&self) -> bool {
        matches!(self, Self::Title | Self::SectionHeader)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::SectionHeader => "section_header",
            Self::Paragraph => "paragraph",
            Self::ListItem => "list_item",
            Self::Table => "table",
            Self::Code => "code",
            Self::Picture => "picture",
        }
    }
}

/// Origin of bounding-box coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CoordOrigin {
    #[serde(rename = "BOTTOMLEFT")]
    BottomLeft,
    #[serde(rename = "TOPLEFT")]
    TopLeft,
}

/// Rectangle on a page
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub l: f64,
    pub t: f64,
    pub r: f64,
    pub b: f64,
    pub coord_origin: CoordOrigin,
}

/// Where an item sits in its source
#[derive(Debug, Clone, PartialEq)]
pub enum ItemLocation {
    /// 1-indexed page, optional box, and character span inside the item text
    Page {
        page_no: u32,
        bbox: Option<BoundingBox>,
        charspan: (usize, usize),
    },
    /// 1-indexed sheet position and sheet name
    Sheet { index: u32, name: String },
}

/// A single structural element of a converted document
#[derive(Debug, Clone, PartialEq)]
pub struct DocItem {
    pub label: ItemLabel,
    pub text: String,
    /// Heading depth (1 = top level); 0 for non-headings
    pub level: u8,
    pub location: Option<ItemLocation>,
    /// Byte offset of `text` inside [`ConvertedDocument::source_text`]
    pub source_offset: Option<usize>,
}

impl DocItem {
    pub fn new(label: ItemLabel, text: impl Into<String>) -> Self {
        Self {
            label,
            text: text.into(),
            level: 0,
            location: None,
            source_offset: None,
        }
    }

    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        let label = if level == 0 { ItemLabel::Title } else { ItemLabel::SectionHeader };
        Self {
            label,
            text: text.into(),
            level: level.max(1),
            location: None,
            source_offset: None,
        }
    }

    /// Place the item on a page, covering its whole text
    pub fn on_page(mut self, page_no: u32, bbox: Option<BoundingBox>) -> Self {
        let len = self.text.chars().count();
        self.location = Some(ItemLocation::Page {
            page_no,
            bbox,
            charspan: (0, len),
        });
        self
    }

    /// Mark `text` as a verbatim slice of the document source starting at `offset`
    pub fn at_source(mut self, offset: usize) -> Self {
        self.source_offset = Some(offset);
        self
    }

    /// Place the item on a worksheet
    pub fn on_sheet(mut self, index: u32, name: impl Into<String>) -> Self {
        self.location = Some(ItemLocation::Sheet {
            index,
            name: name.into(),
        });
        self
    }
}

/// Structured representation of an uploaded file
#[derive(Debug, Clone)]
pub struct ConvertedDocument {
    /// Original upload name
    pub filename: String,
    pub file_type: FileType,
    pub layout: SourceLayout,
    pub items: Vec<DocItem>,
    /// Page count for paged sources
    pub total_pages: Option<u32>,
    /// Decoded source for plain-text formats whose items are verbatim slices of it
    pub source_text: Option<String>,
}

impl ConvertedDocument {
    pub fn new(filename: impl Into<String>, file_type: FileType, layout: SourceLayout) -> Self {
        Self {
            filename: filename.into(),
            file_type,
            layout,
            items: Vec::new(),
            total_pages: None,
            source_text: None,
        }
    }

    pub fn push(&mut self, item: DocItem) {
        self.items.push(item);
    }

    /// Sheet names when the source is a workbook
    pub fn sheet_names(&self) -> Option<&[String]> {
        match &self.layout {
            SourceLayout::Spreadsheet { sheets } => Some(sheets),
            _ => None,
        }
    }

    /// Filename without its extension
    pub fn stem(&self) -> String {
        Path::new(&self.filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string()
    }
}
