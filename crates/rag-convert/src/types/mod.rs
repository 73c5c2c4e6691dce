//! Core types for the conversion service

pub mod chunk;
pub mod document;

pub use chunk::{
    BboxInfo, ChunkRecord, ChunkingConfigInfo, ChunkingOptions, ChunkingResult, FileMetadata,
    SheetRef,
};
pub use document::{
    BoundingBox, ConvertedDocument, CoordOrigin, DocItem, FileType, ItemLabel, ItemLocation,
    SourceLayout, SUPPORTED_EXTENSIONS,
};
