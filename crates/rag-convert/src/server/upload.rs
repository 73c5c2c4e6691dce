//! Multipart upload extraction

use axum::extract::Multipart;
use bytes::Bytes;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::document::extension_of;

/// A file received in a multipart body
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Name as sent by the client
    pub filename: String,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Dotted lowercase extension
    pub fn extension(&self) -> String {
        extension_of(&self.filename)
    }

    /// Filename without directory and extension
    pub fn stem(&self) -> String {
        Path::new(&self.filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("converted")
            .to_string()
    }
}

/// Read every file sent under `field_name`, in order
pub async fn read_files(multipart: &mut Multipart, field_name: &str) -> Result<Vec<UploadedFile>> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidRequest(format!("Failed to read multipart field: {}", e)))?
    {
        if field.name() != Some(field_name) {
            continue;
        }

        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                Error::InvalidRequest(format!("Field '{}' must carry a filename", field_name))
            })?;

        let data = field.bytes().await.map_err(|e| {
            Error::InvalidRequest(format!("Failed to read upload '{}': {}", filename, e))
        })?;

        tracing::debug!("Received upload {} ({} bytes)", filename, data.len());
        files.push(UploadedFile { filename, data });
    }

    Ok(files)
}

/// Read the single file sent under `field_name`
pub async fn read_single(multipart: &mut Multipart, field_name: &str) -> Result<UploadedFile> {
    read_files(multipart, field_name)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::InvalidRequest(format!("Missing multipart field '{}'", field_name)))
}
