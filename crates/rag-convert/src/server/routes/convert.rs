//! Synchronous conversion endpoints

use axum::{
    extract::{Multipart, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::ingestion::{assemble_result, export_markdown, render_chunks, ConversionEngine, UploadInfo};
use crate::server::state::AppState;
use crate::server::upload::{read_files, read_single, UploadedFile};
use crate::types::{ChunkingOptions, FileType};

/// Most files accepted by one `/convert-multiple` request
pub const MAX_BATCH_FILES: usize = 10;

/// Archive name returned by `/convert-multiple`
const BATCH_ARCHIVE_NAME: &str = "converted_files.zip";

fn default_true() -> bool {
    true
}

/// Query parameters of `/convert`
#[derive(Debug, Deserialize)]
pub struct ConvertParams {
    /// Output name without extension; the upload stem when absent
    pub output_filename: Option<String>,
    #[serde(default)]
    pub include_metadata: bool,
    #[serde(default)]
    pub use_chunking: bool,
    #[serde(default = "default_true")]
    pub contextualize: bool,
}

/// Query parameters of `/convert-chunked` and `/convert-chunked-async`
#[derive(Debug, Deserialize)]
pub struct ChunkedParams {
    #[serde(default)]
    pub include_metadata: bool,
    #[serde(default = "default_true")]
    pub contextualize: bool,
    pub max_tokens: Option<usize>,
}

impl ChunkedParams {
    pub fn options(&self) -> Result<ChunkingOptions> {
        if self.max_tokens == Some(0) {
            return Err(Error::InvalidRequest("max_tokens must be greater than zero".to_string()));
        }
        Ok(ChunkingOptions {
            max_tokens: self.max_tokens,
            contextualize: self.contextualize,
            include_metadata: self.include_metadata,
        })
    }
}

/// Batch output shape
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Zip,
    Json,
}

/// Query parameters of `/convert-multiple`
#[derive(Debug, Deserialize)]
pub struct MultipleParams {
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub use_chunking: bool,
    #[serde(default = "default_true")]
    pub contextualize: bool,
}

/// Per-file outcome of a batch conversion
#[derive(Debug, Serialize)]
pub struct FileOutcome {
    pub filename: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileOutcome {
    fn failed(filename: &str, error: impl Into<String>) -> Self {
        Self {
            filename: filename.to_string(),
            success: false,
            output_filename: None,
            content_length: None,
            chunks_count: None,
            error: Some(error.into()),
        }
    }
}

/// JSON body of `/convert-multiple?output_format=json`
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub total_files: usize,
    pub successful_conversions: usize,
    pub chunking_applied: bool,
    pub contextualize_applied: bool,
    pub results: Vec<FileOutcome>,
    pub converted_content: serde_json::Map<String, serde_json::Value>,
}

/// Persist an upload into a fresh workspace, run `job` on the stored file off
/// the async runtime, and release the workspace on every path
pub(crate) async fn run_in_workspace<T, F>(state: &AppState, upload: &UploadedFile, job: F) -> Result<T>
where
    F: FnOnce(Arc<dyn ConversionEngine>, PathBuf) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let workspace = state.workspaces().allocate().await?;

    let outcome = async {
        let path = state
            .workspaces()
            .store(&workspace, &upload.filename, &upload.data)
            .await?;
        let engine = state.engine();
        tokio::task::spawn_blocking(move || job(engine, path))
            .await
            .map_err(|e| Error::internal(format!("Conversion task aborted: {}", e)))?
    }
    .await;

    workspace.release().await;
    outcome
}

/// Markdown for one file: whole-document export, or `## Chunk N` sections
fn markdown_for(
    engine: &dyn ConversionEngine,
    path: &std::path::Path,
    use_chunking: bool,
    options: &ChunkingOptions,
) -> Result<(String, usize)> {
    let doc = engine.convert(path)?;
    if use_chunking {
        let chunks = engine.chunk(&doc, options)?;
        Ok((render_chunks(&chunks), chunks.len()))
    } else {
        Ok((export_markdown(&doc), 1))
    }
}

/// `Content-Disposition` value for a download
fn attachment(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .filter(|c| !c.is_control() && *c != '"')
        .collect();
    format!("attachment; filename=\"{}\"", cleaned)
}

/// Convert one file to Markdown
pub async fn convert_file(
    State(state): State<AppState>,
    Query(params): Query<ConvertParams>,
    mut multipart: Multipart,
) -> Result<Response> {
    let upload = read_single(&mut multipart, "file").await?;
    FileType::from_filename(&upload.filename)?;
    tracing::info!("POST /convert - {} ({} bytes)", upload.filename, upload.size());

    let options = ChunkingOptions {
        max_tokens: None,
        contextualize: params.contextualize,
        include_metadata: params.include_metadata,
    };
    let use_chunking = params.use_chunking;

    let (content, _) = run_in_workspace(&state, &upload, move |engine, path| {
        markdown_for(engine.as_ref(), &path, use_chunking, &options)
    })
    .await
    .map_err(|e| {
        tracing::error!("Conversion of {} failed: {}", upload.filename, e);
        e
    })?;

    let output_name = params
        .output_filename
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| upload.stem());

    Ok((
        [
            (header::CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, attachment(&format!("{}.md", output_name))),
        ],
        content,
    )
        .into_response())
}

/// Convert one file into chunk JSON.
///
/// Conversion failures are reported as `200` with `success: false`.
pub async fn convert_chunked(
    State(state): State<AppState>,
    Query(params): Query<ChunkedParams>,
    mut multipart: Multipart,
) -> Result<Response> {
    let upload = read_single(&mut multipart, "file").await?;
    let (_, extension) = FileType::from_filename(&upload.filename)?;
    let options = params.options()?;
    tracing::info!("POST /convert-chunked - {} ({} bytes)", upload.filename, upload.size());

    let chunk_options = options.clone();
    let outcome = run_in_workspace(&state, &upload, move |engine, path| {
        let doc = engine.convert(&path)?;
        let chunks = engine.chunk(&doc, &chunk_options)?;
        Ok((doc, chunks))
    })
    .await;

    match outcome {
        Ok((doc, chunks)) => {
            let engine = state.engine();
            let info = UploadInfo {
                filename: &upload.filename,
                extension: &extension,
                file_size: upload.size(),
            };
            let result = assemble_result(engine.as_ref(), &info, &doc, chunks, &options);
            tracing::info!("Chunked {} into {} chunks", upload.filename, result.total_chunks);
            Ok(Json(result).into_response())
        }
        Err(e) => {
            tracing::error!("Chunking of {} failed: {}", upload.filename, e);
            Ok(Json(serde_json::json!({
                "success": false,
                "error": e.to_string(),
                "filename": upload.filename,
            }))
            .into_response())
        }
    }
}

/// Convert up to [`MAX_BATCH_FILES`] files, returned as a ZIP archive or JSON
pub async fn convert_multiple(
    State(state): State<AppState>,
    Query(params): Query<MultipleParams>,
    mut multipart: Multipart,
) -> Result<Response> {
    let files = read_files(&mut multipart, "files").await?;
    if files.is_empty() {
        return Err(Error::InvalidRequest("No files uploaded".to_string()));
    }
    if files.len() > MAX_BATCH_FILES {
        return Err(Error::InvalidRequest(format!(
            "At most {} files can be converted at once, got {}",
            MAX_BATCH_FILES,
            files.len()
        )));
    }
    tracing::info!("POST /convert-multiple - {} files", files.len());

    let options = ChunkingOptions {
        max_tokens: None,
        contextualize: params.contextualize,
        include_metadata: false,
    };

    let mut results = Vec::with_capacity(files.len());
    // Output name -> Markdown; a later file with the same stem replaces an earlier one
    let mut converted: Vec<(String, String)> = Vec::new();

    for file in &files {
        if FileType::from_filename(&file.filename).is_err() {
            results.push(FileOutcome::failed(&file.filename, "Unsupported file format"));
            continue;
        }

        let use_chunking = params.use_chunking;
        let file_options = options.clone();
        let outcome = run_in_workspace(&state, file, move |engine, path| {
            markdown_for(engine.as_ref(), &path, use_chunking, &file_options)
        })
        .await;

        match outcome {
            Ok((content, chunks_count)) => {
                let output_filename = format!("{}.md", file.stem());
                results.push(FileOutcome {
                    filename: file.filename.clone(),
                    success: true,
                    output_filename: Some(output_filename.clone()),
                    content_length: Some(content.chars().count()),
                    chunks_count: Some(chunks_count),
                    error: None,
                });
                converted.retain(|(name, _)| *name != output_filename);
                converted.push((output_filename, content));
                tracing::info!("Converted {}", file.filename);
            }
            Err(e) => {
                tracing::error!("Conversion of {} failed: {}", file.filename, e);
                results.push(FileOutcome::failed(&file.filename, e.to_string()));
            }
        }
    }

    if params.output_format == OutputFormat::Json {
        let response = BatchResponse {
            total_files: files.len(),
            successful_conversions: converted.len(),
            chunking_applied: params.use_chunking,
            contextualize_applied: params.contextualize,
            results,
            converted_content: converted
                .into_iter()
                .map(|(name, content)| (name, serde_json::Value::String(content)))
                .collect(),
        };
        return Ok(Json(response).into_response());
    }

    if converted.is_empty() {
        return Err(Error::InvalidRequest("None of the uploaded files could be converted".to_string()));
    }

    let archive = build_archive(&converted)?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, attachment(BATCH_ARCHIVE_NAME)),
        ],
        archive,
    )
        .into_response())
}

/// Deflate-compressed ZIP with one Markdown entry per converted file
fn build_archive(entries: &[(String, String)]) -> Result<Vec<u8>> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for (name, content) in entries {
        zip.start_file(name.as_str(), options)
            .map_err(|e| Error::internal(format!("Failed to add {} to archive: {}", name, e)))?;
        zip.write_all(content.as_bytes())?;
    }

    let cursor = zip
        .finish()
        .map_err(|e| Error::internal(format!("Failed to finish archive: {}", e)))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_build_archive() {
        let entries = vec![
            ("a.md".to_string(), "# A\n".to_string()),
            ("b.md".to_string(), "# B\n".to_string()),
        ];
        let bytes = build_archive(&entries).unwrap();

        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut content = String::new();
        archive.by_name("b.md").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "# B\n");
    }

    #[test]
    fn test_attachment_header() {
        assert_eq!(attachment("report.md"), "attachment; filename=\"report.md\"");
        assert_eq!(attachment("a\"b\n.md"), "attachment; filename=\"ab.md\"");
    }

    #[test]
    fn test_zero_max_tokens_rejected() {
        let params = ChunkedParams {
            include_metadata: false,
            contextualize: true,
            max_tokens: Some(0),
        };
        assert!(matches!(params.options(), Err(Error::InvalidRequest(_))));
    }
}
