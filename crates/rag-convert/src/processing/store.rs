//! Job records and the store that owns them

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::ChunkingResult;

use super::workspace::Workspace;

/// Job identifier
pub type JobId = Uuid;

/// Job status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// A state change applied atomically to one record
#[derive(Debug, Clone)]
pub enum Transition {
    /// Worker picked the job up
    Start,
    /// Progress step while processing; progress never goes backwards
    Checkpoint { progress: u8, message: String },
    /// Successful end with the assembled result
    Complete(Box<ChunkingResult>),
    /// Failed end; progress keeps its last value
    Fail(String),
}

impl Transition {
    pub fn checkpoint(progress: u8, message: impl Into<String>) -> Self {
        Self::Checkpoint {
            progress,
            message: message.into(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Checkpoint { .. } => "checkpoint",
            Self::Complete(_) => "complete",
            Self::Fail(_) => "fail",
        }
    }
}

/// One accepted asynchronous conversion
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    #[serde(rename = "job_id")]
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub filename: String,
    pub file_size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ChunkingResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub workspace: Option<Workspace>,
}

impl JobRecord {
    fn new(filename: String, file_size: u64, workspace: Workspace) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Queued,
            progress: 0,
            message: "Waiting in queue...".to_string(),
            filename,
            file_size,
            created_at: now,
            updated_at: now,
            completed_at: None,
            result: None,
            failed_at: None,
            error: None,
            workspace: Some(workspace),
        }
    }

    /// Apply a transition, leaving the record untouched when it is not allowed
    pub fn apply(&mut self, transition: Transition) -> Result<()> {
        let invalid = |record: &Self, transition: &Transition| {
            Error::InvalidTransition(format!(
                "cannot {} job {} while {}",
                transition.name(),
                record.id,
                record.status.as_str()
            ))
        };
        let now = Utc::now();

        match (self.status, transition) {
            (JobStatus::Queued, Transition::Start) => {
                self.status = JobStatus::Processing;
            }
            (JobStatus::Processing, Transition::Checkpoint { progress, message }) => {
                if progress < self.progress || progress > 100 {
                    return Err(Error::InvalidTransition(format!(
                        "progress of job {} cannot move from {} to {}",
                        self.id, self.progress, progress
                    )));
                }
                self.progress = progress;
                self.message = message;
            }
            (JobStatus::Processing, Transition::Complete(result)) => {
                self.status = JobStatus::Completed;
                self.progress = 100;
                self.message = "Processing complete".to_string();
                self.result = Some(*result);
                self.completed_at = Some(now);
            }
            (JobStatus::Queued | JobStatus::Processing, Transition::Fail(error)) => {
                self.status = JobStatus::Failed;
                self.message = "Processing failed".to_string();
                self.error = Some(error);
                self.failed_at = Some(now);
            }
            (_, transition) => return Err(invalid(self, &transition)),
        }

        self.updated_at = now;
        Ok(())
    }

    /// When the record reached its terminal state
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at.or(self.failed_at)
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            job_id: self.id,
            status: self.status,
            progress: self.progress,
            filename: self.filename.clone(),
            created_at: self.created_at,
        }
    }
}

/// Listing entry without the result payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSummary {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub filename: String,
    pub created_at: DateTime<Utc>,
}

/// Number of jobs per status
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobCounts {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Storage for job records.
///
/// Every operation on a single record is atomic: readers never observe a
/// partially applied transition.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new `queued` record owning `workspace`
    async fn create(&self, filename: String, file_size: u64, workspace: Workspace) -> Result<JobRecord>;

    async fn get(&self, id: JobId) -> Result<JobRecord>;

    /// Summaries of all records in creation order
    async fn list(&self) -> Result<Vec<JobSummary>>;

    /// Apply a transition and return the updated record
    async fn update(&self, id: JobId, transition: Transition) -> Result<JobRecord>;

    /// Remove the record and release its workspace
    async fn delete(&self, id: JobId) -> Result<JobRecord>;

    /// Remove terminal records that finished before `cutoff`, returning how many
    async fn evict_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    async fn counts(&self) -> JobCounts;

    async fn len(&self) -> usize;

    /// Release every workspace still held by a record
    async fn release_all(&self);
}

/// Volatile store backed by a sharded concurrent map
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<JobId, JobRecord>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, filename: String, file_size: u64, workspace: Workspace) -> Result<JobRecord> {
        let record = JobRecord::new(filename, file_size, workspace);
        self.jobs.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: JobId) -> Result<JobRecord> {
        self.jobs
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or_else(|| Error::JobNotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<JobSummary>> {
        let mut summaries: Vec<JobSummary> = self.jobs.iter().map(|r| r.summary()).collect();
        summaries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        Ok(summaries)
    }

    async fn update(&self, id: JobId, transition: Transition) -> Result<JobRecord> {
        let mut entry = self
            .jobs
            .get_mut(&id)
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;
        entry.apply(transition)?;
        Ok(entry.value().clone())
    }

    async fn delete(&self, id: JobId) -> Result<JobRecord> {
        let (_, record) = self
            .jobs
            .remove(&id)
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;

        if let Some(workspace) = &record.workspace {
            workspace.release().await;
        }
        Ok(record)
    }

    async fn evict_finished_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let expired: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|r| r.finished_at().map(|t| t < cutoff).unwrap_or(false))
            .map(|r| r.id)
            .collect();

        let mut evicted = 0;
        for id in expired {
            let removed = self
                .jobs
                .remove_if(&id, |_, r| r.finished_at().map(|t| t < cutoff).unwrap_or(false));
            if let Some((_, record)) = removed {
                if let Some(workspace) = &record.workspace {
                    workspace.release().await;
                }
                evicted += 1;
            }
        }
        Ok(evicted)
    }

    async fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for record in self.jobs.iter() {
            match record.status {
                JobStatus::Queued => counts.queued += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    async fn len(&self) -> usize {
        self.jobs.len()
    }

    async fn release_all(&self) {
        let workspaces: Vec<Workspace> = self
            .jobs
            .iter()
            .filter_map(|r| r.workspace.clone())
            .collect();
        for workspace in workspaces {
            workspace.release().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::workspace::WorkspaceManager;
    use crate::types::ChunkingConfigInfo;

    fn result() -> ChunkingResult {
        ChunkingResult {
            success: true,
            filename: "a.txt".to_string(),
            file_type: "Text file".to_string(),
            total_chunks: 0,
            chunking_config: ChunkingConfigInfo {
                tokenizer: "words".to_string(),
                max_tokens: 512,
                merge_peers: true,
                contextualize: true,
            },
            chunks: Vec::new(),
            excel_sheets: None,
            total_sheets: None,
            file_metadata: None,
        }
    }

    async fn setup() -> (tempfile::TempDir, WorkspaceManager, InMemoryJobStore) {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path());
        (root, manager, InMemoryJobStore::new())
    }

    #[tokio::test]
    async fn test_create_is_queued() {
        let (_root, manager, store) = setup().await;
        let record = store
            .create("a.txt".into(), 5, manager.allocate().await.unwrap())
            .await
            .unwrap();

        assert_eq!(record.status, JobStatus::Queued);
        assert_eq!(record.progress, 0);
        assert!(record.result.is_none() && record.error.is_none());
        assert_eq!(store.get(record.id).await.unwrap().filename, "a.txt");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let (_root, manager, store) = setup().await;
        let id = store
            .create("a.txt".into(), 5, manager.allocate().await.unwrap())
            .await
            .unwrap()
            .id;

        store.update(id, Transition::Start).await.unwrap();
        store.update(id, Transition::checkpoint(30, "Converting")).await.unwrap();
        let err = store.update(id, Transition::checkpoint(20, "Back")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));
        assert_eq!(store.get(id).await.unwrap().progress, 30);

        let done = store
            .update(id, Transition::Complete(Box::new(result())))
            .await
            .unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100);
        assert!(done.result.is_some() && done.error.is_none());
        assert!(done.completed_at.is_some() && done.failed_at.is_none());

        // Terminal states are final
        let err = store.update(id, Transition::Fail("late".into())).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));
        assert!(store.get(id).await.unwrap().error.is_none());
    }

    #[tokio::test]
    async fn test_fail_keeps_progress() {
        let (_root, manager, store) = setup().await;
        let id = store
            .create("a.pdf".into(), 5, manager.allocate().await.unwrap())
            .await
            .unwrap()
            .id;

        store.update(id, Transition::Start).await.unwrap();
        store.update(id, Transition::checkpoint(40, "Chunker")).await.unwrap();
        let failed = store.update(id, Transition::Fail("bad pdf".into())).await.unwrap();

        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.progress, 40);
        assert_eq!(failed.error.as_deref(), Some("bad pdf"));
        assert!(failed.result.is_none());

        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["job_id"], id.to_string());
        assert_eq!(json["status"], "failed");
        assert!(json.get("result").is_none());
        assert!(json.get("completed_at").is_none());
    }

    #[tokio::test]
    async fn test_checkpoint_requires_processing() {
        let (_root, manager, store) = setup().await;
        let id = store
            .create("a.txt".into(), 1, manager.allocate().await.unwrap())
            .await
            .unwrap()
            .id;

        let err = store.update(id, Transition::checkpoint(10, "x")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));
        let err = store
            .update(id, Transition::Complete(Box::new(result())))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let store = InMemoryJobStore::new();
        let id = Uuid::new_v4();

        assert!(matches!(store.get(id).await, Err(Error::JobNotFound(_))));
        assert!(matches!(store.delete(id).await, Err(Error::JobNotFound(_))));
        assert!(matches!(
            store.update(id, Transition::Start).await,
            Err(Error::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_releases_workspace() {
        let (_root, manager, store) = setup().await;
        let workspace = manager.allocate().await.unwrap();
        let path = workspace.path().to_path_buf();
        let id = store.create("a.txt".into(), 1, workspace.clone()).await.unwrap().id;

        store.delete(id).await.unwrap();
        assert!(!path.exists());
        assert!(workspace.is_released());

        // A worker finishing later sees the job gone
        assert!(matches!(
            store.update(id, Transition::Start).await,
            Err(Error::JobNotFound(_))
        ));
        assert!(matches!(store.delete(id).await, Err(Error::JobNotFound(_))));
    }

    #[tokio::test]
    async fn test_evict_finished_before() {
        let (_root, manager, store) = setup().await;
        let finished = store
            .create("done.txt".into(), 1, manager.allocate().await.unwrap())
            .await
            .unwrap()
            .id;
        let running = store
            .create("running.txt".into(), 1, manager.allocate().await.unwrap())
            .await
            .unwrap()
            .id;

        store.update(finished, Transition::Start).await.unwrap();
        store.update(finished, Transition::Fail("x".into())).await.unwrap();
        store.update(running, Transition::Start).await.unwrap();

        let cutoff_before = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(store.evict_finished_before(cutoff_before).await.unwrap(), 0);

        let cutoff_after = Utc::now() + chrono::Duration::seconds(1);
        assert_eq!(store.evict_finished_before(cutoff_after).await.unwrap(), 1);
        assert!(store.get(finished).await.is_err());
        assert!(store.get(running).await.is_ok());
        assert_eq!(manager.live_dirs().len(), 1);
    }

    #[tokio::test]
    async fn test_list_and_counts() {
        let (_root, manager, store) = setup().await;
        let first = store
            .create("first.txt".into(), 1, manager.allocate().await.unwrap())
            .await
            .unwrap();
        let second = store
            .create("second.txt".into(), 1, manager.allocate().await.unwrap())
            .await
            .unwrap();
        store.update(second.id, Transition::Start).await.unwrap();

        let list = store.list().await.unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.iter().any(|s| s.job_id == first.id && s.status == JobStatus::Queued));

        let counts = store.counts().await;
        assert_eq!(counts.queued, 1);
        assert_eq!(counts.processing, 1);
        assert_eq!(counts.completed + counts.failed, 0);

        store.release_all().await;
        assert!(manager.live_dirs().is_empty());
    }
}
