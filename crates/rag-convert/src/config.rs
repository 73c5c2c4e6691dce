//! Configuration for the conversion service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable pointing at a TOML config file
pub const CONFIG_PATH_ENV: &str = "RAG_CONVERT_CONFIG";

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Background processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
}

impl ServiceConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Load from `RAG_CONVERT_CONFIG` if set, then apply host/port overrides
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(host) = std::env::var("RAG_CONVERT_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("RAG_CONVERT_PORT") {
            config.server.port = port
                .parse()
                .map_err(|e| Error::Config(format!("Invalid RAG_CONVERT_PORT '{}': {}", port, e)))?;
        }

        Ok(config)
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Maximum upload size in bytes (default: 100MB)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 10002,
            max_upload_size: 100 * 1024 * 1024, // 100MB
        }
    }
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Tokenizer model id reported to clients
    pub tokenizer_model: String,
    /// Path to a Hugging Face `tokenizer.json`; word-boundary counting is used when unset
    pub tokenizer_path: Option<PathBuf>,
    /// Default maximum tokens per chunk
    pub max_tokens: usize,
    /// Merge adjacent undersized chunks that share headings
    pub merge_peers: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            tokenizer_model: "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2"
                .to_string(),
            tokenizer_path: None,
            max_tokens: 512,
            merge_peers: true,
        }
    }
}

/// Background processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Root directory for per-job workspaces
    pub workspace_dir: PathBuf,
    /// Number of jobs executed concurrently (default: CPU count, max 4)
    pub max_concurrent_jobs: Option<usize>,
    /// Capacity of the pending job channel
    pub queue_capacity: usize,
    /// Finished jobs older than this are evicted; `None` keeps them forever
    pub job_retention_secs: Option<u64>,
    /// How often the retention sweeper runs
    pub sweep_interval_secs: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            workspace_dir: std::env::temp_dir().join("rag-convert"),
            max_concurrent_jobs: None, // Auto-detect from CPU count
            queue_capacity: 1000,
            job_retention_secs: Some(3600), // 1 hour
            sweep_interval_secs: 60,
        }
    }
}

impl ProcessingConfig {
    /// Effective worker count
    pub fn worker_count(&self) -> usize {
        self.max_concurrent_jobs
            .unwrap_or_else(|| num_cpus::get().min(4))
            .max(1)
    }
}
