//! Hand-off of accepted jobs to the background worker

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::types::ChunkingOptions;

use super::store::{JobId, JobStore, Transition};
use super::workspace::Workspace;

/// One unit of background work; exactly one is submitted per job
#[derive(Debug, Clone)]
pub struct ConversionTask {
    pub job_id: JobId,
    /// Stored upload inside the workspace
    pub path: PathBuf,
    /// Original upload name
    pub filename: String,
    /// Dotted lowercase extension
    pub extension: String,
    pub file_size: u64,
    pub options: ChunkingOptions,
    pub workspace: Workspace,
}

/// Sending side of the bounded task channel
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<ConversionTask>,
    store: Arc<dyn JobStore>,
}

impl JobQueue {
    /// Create a queue holding at most `capacity` pending tasks
    pub fn new(capacity: usize, store: Arc<dyn JobStore>) -> (Self, mpsc::Receiver<ConversionTask>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender, store }, receiver)
    }

    /// Submit a task without waiting.
    ///
    /// When the queue is full or the worker is gone the job record is removed,
    /// which also releases its workspace, so no half-accepted job remains.
    pub async fn submit(&self, task: ConversionTask) -> Result<()> {
        let job_id = task.job_id;

        let error = match self.sender.try_send(task) {
            Ok(()) => {
                tracing::debug!("[Job {}] Submitted to worker", job_id);
                return Ok(());
            }
            Err(mpsc::error::TrySendError::Full(task)) => {
                tracing::warn!("[Job {}] Rejected: {} tasks already pending", job_id, self.pending());
                task.workspace.release().await;
                Error::QueueFull(format!(
                    "{} jobs are already waiting, retry later",
                    self.sender.max_capacity()
                ))
            }
            Err(mpsc::error::TrySendError::Closed(task)) => {
                tracing::error!("[Job {}] Failed to submit: worker is not running", job_id);
                task.workspace.release().await;
                Error::internal("Background worker unavailable")
            }
        };

        if let Err(e) = self.store.delete(job_id).await {
            tracing::debug!("[Job {}] Could not remove rejected job: {}", job_id, e);
        }
        Err(error)
    }

    /// Tasks waiting for a worker slot
    pub fn pending(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }
}
