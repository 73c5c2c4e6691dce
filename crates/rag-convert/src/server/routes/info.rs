//! Service introspection endpoints

use axum::{extract::State, Json};
use serde_json::{json, Map, Value};

use crate::server::state::AppState;
use crate::types::SUPPORTED_EXTENSIONS;

fn extension_map() -> Map<String, Value> {
    SUPPORTED_EXTENSIONS
        .iter()
        .map(|(ext, description)| (ext.to_string(), Value::String(description.to_string())))
        .collect()
}

fn tokenizer_type(state: &AppState) -> &'static str {
    if state.config().chunking.tokenizer_path.is_some() {
        "HuggingFaceTokenizer"
    } else {
        "WordBoundary"
    }
}

/// GET / - Service overview
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let engine = state.engine();
    Json(json!({
        "message": "rag-convert document conversion API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "supported_formats": extension_map(),
        "chunking": {
            "engine": "HybridChunker",
            "tokenizer": engine.tokenizer_name(),
            "max_tokens": engine.default_max_tokens(),
            "contextualize": true
        },
        "endpoints": {
            "convert": "POST /convert - Convert a file to Markdown",
            "convert-chunked": "POST /convert-chunked - Convert a file into chunks (sync)",
            "convert-chunked-async": "POST /convert-chunked-async - Convert a file into chunks (async, for large files)",
            "convert-multiple": "POST /convert-multiple - Convert up to 10 files at once",
            "job-status": "GET /job/{job_id} - Poll an async job",
            "jobs": "GET /jobs - List all jobs",
            "delete-job": "DELETE /job/{job_id} - Delete a job and its files",
            "health": "GET /health - Service health"
        },
        "async_workflow": {
            "description": "Avoid client timeouts on large files by polling a background job",
            "steps": [
                "1. POST /convert-chunked-async - upload the file and receive a job_id",
                "2. GET /job/{job_id} - poll until status is completed or failed",
                "3. On completed, read the chunks from result",
                "4. DELETE /job/{job_id} - clean up (optional)"
            ]
        }
    }))
}

/// GET /health - Liveness and job counts; `active_jobs` covers queued and processing
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let engine = state.engine();
    let counts = state.store().counts().await;
    Json(json!({
        "status": "healthy",
        "library": "rag-convert",
        "version": env!("CARGO_PKG_VERSION"),
        "supported_files": SUPPORTED_EXTENSIONS.len(),
        "tokenizer": engine.tokenizer_name(),
        "max_tokens": engine.default_max_tokens(),
        "active_jobs": counts.queued + counts.processing,
        "total_jobs": state.store().len().await,
        "ready": state.is_ready(),
    }))
}

/// GET /supported-formats - Extensions by category
pub async fn supported_formats(State(state): State<AppState>) -> Json<Value> {
    let engine = state.engine();
    Json(json!({
        "supported_extensions": extension_map(),
        "total_formats": SUPPORTED_EXTENSIONS.len(),
        "categories": {
            "documents": [".pdf", ".docx", ".pptx", ".xlsx"],
            "web": [".html", ".htm", ".md", ".csv", ".json", ".xml"],
            "images": [".jpg", ".jpeg", ".png", ".gif", ".bmp"],
            "text": [".txt"]
        },
        "chunking_info": {
            "engine": "HybridChunker",
            "tokenizer": engine.tokenizer_name(),
            "default_max_tokens": engine.default_max_tokens(),
            "features": ["contextualize", "merge_peers", "hierarchical_chunking"]
        }
    }))
}

/// GET /chunking-info - Chunker configuration
pub async fn chunking_info(State(state): State<AppState>) -> Json<Value> {
    let engine = state.engine();
    Json(json!({
        "chunker_type": "HybridChunker",
        "tokenizer": {
            "model": engine.tokenizer_name(),
            "max_tokens": engine.default_max_tokens(),
            "type": tokenizer_type(&state)
        },
        "merge_peers": engine.merge_peers(),
        "features": {
            "contextualize": "Prefix each chunk with its heading path",
            "merge_peers": "Merge adjacent undersized chunks under the same headings",
            "hierarchical_chunking": "Split along document structure before token bounds"
        },
        "supported_operations": [
            "chunk(document): split a converted document into chunks",
            "contextualize(chunk): heading-enriched chunk text"
        ]
    }))
}
