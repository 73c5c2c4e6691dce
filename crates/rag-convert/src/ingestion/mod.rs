//! Document conversion and chunking pipeline

pub mod assemble;
pub mod chunker;
pub mod engine;
pub mod markdown;
#[cfg(test)]
pub(crate) mod fixtures;
mod parser;
pub mod tokenizer;

pub use assemble::{assemble_result, UploadInfo};
pub use chunker::{DocChunk, HybridChunker};
pub use engine::{ConversionEngine, DocumentEngine};
pub use markdown::{export_markdown, render_chunks};
pub use parser::FileParser;
pub use tokenizer::{HuggingFaceTokenCounter, TokenCounter, WordTokenCounter};
