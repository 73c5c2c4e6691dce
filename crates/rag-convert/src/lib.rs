//! rag-convert: document conversion and chunking service for RAG pipelines
//!
//! Uploaded documents (PDF, Office, web, text and image formats) are converted
//! into a structured document model, exported as Markdown, or split into
//! token-bounded chunks carrying page, bounding-box or sheet provenance.
//! Large files can be processed as background jobs that clients poll.

pub mod config;
pub mod error;
pub mod ingestion;
pub mod processing;
pub mod server;
pub mod types;

pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use ingestion::{ConversionEngine, DocumentEngine};
pub use processing::{JobId, JobRecord, JobStatus};
pub use server::{build_router, state::AppState, ConvertServer};
pub use types::{ChunkRecord, ChunkingOptions, ChunkingResult, ConvertedDocument, FileType};
