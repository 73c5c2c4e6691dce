//! Per-job transient directories for uploaded files

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Prefix of every workspace directory name
const WORKSPACE_PREFIX: &str = "rag-convert-";

#[derive(Debug)]
struct WorkspaceInner {
    path: PathBuf,
    released: AtomicBool,
}

/// Handle to an allocated workspace directory.
///
/// Clones share one released flag, so however many holders call
/// [`Workspace::release`] the directory is removed at most once.
#[derive(Debug, Clone)]
pub struct Workspace {
    inner: Arc<WorkspaceInner>,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// Remove the directory and its contents. Safe to call repeatedly and
    /// concurrently; a directory that is already gone is not an error.
    /// Failures are logged, never returned.
    pub async fn release(&self) {
        if self.inner.released.swap(true, Ordering::SeqCst) {
            return;
        }

        match tokio::fs::remove_dir_all(&self.inner.path).await {
            Ok(()) => tracing::debug!("Released workspace {}", self.inner.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Workspace {} already removed", self.inner.path.display())
            }
            Err(e) => tracing::warn!(
                "Failed to remove workspace {}: {}",
                self.inner.path.display(),
                e
            ),
        }
    }
}

/// Allocates workspaces under a root directory
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, uniquely named directory
    pub async fn allocate(&self) -> Result<Workspace> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            Error::workspace(format!("Failed to create {}: {}", self.root.display(), e))
        })?;

        let path = self.root.join(format!("{}{}", WORKSPACE_PREFIX, Uuid::new_v4()));
        tokio::fs::create_dir(&path).await.map_err(|e| {
            Error::workspace(format!("Failed to create {}: {}", path.display(), e))
        })?;

        tracing::debug!("Allocated workspace {}", path.display());
        Ok(Workspace {
            inner: Arc::new(WorkspaceInner {
                path,
                released: AtomicBool::new(false),
            }),
        })
    }

    /// Write an upload into the workspace, returning its path
    pub async fn store(&self, workspace: &Workspace, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        if workspace.is_released() {
            return Err(Error::workspace(format!(
                "Workspace {} was already released",
                workspace.path().display()
            )));
        }

        let path = workspace.path().join(sanitize_filename(filename));
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            Error::workspace(format!("Failed to write {}: {}", path.display(), e))
        })?;

        tracing::debug!("Stored {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    pub async fn release(&self, workspace: &Workspace) {
        workspace.release().await;
    }

    /// Workspace directories currently present under the root
    pub fn live_dirs(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };
        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(WORKSPACE_PREFIX))
                    .unwrap_or(false)
            })
            .collect()
    }
}

/// Reduce an upload name to its final path component
pub fn sanitize_filename(filename: &str) -> String {
    let name = filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();

    match name {
        "" | "." | ".." => "upload".to_string(),
        name => name.to_string(),
    }
}
