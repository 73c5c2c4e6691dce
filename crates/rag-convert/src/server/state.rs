//! Application state for the conversion server

use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::config::ServiceConfig;
use crate::error::Result;
use crate::ingestion::{ConversionEngine, DocumentEngine};
use crate::processing::{InMemoryJobStore, JobQueue, JobStore, ProcessingWorker, WorkspaceManager};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: ServiceConfig,
    /// Conversion and chunking engine
    engine: Arc<dyn ConversionEngine>,
    /// Job records
    store: Arc<dyn JobStore>,
    /// Job queue for async processing
    queue: JobQueue,
    /// Per-request upload directories
    workspaces: WorkspaceManager,
    /// Concurrent background jobs
    worker_count: usize,
    /// Ready state
    ready: RwLock<bool>,
}

impl AppState {
    /// Create application state with the default document engine
    pub async fn new(config: ServiceConfig) -> Result<Self> {
        tracing::info!("Initializing conversion service state...");
        let engine = Arc::new(DocumentEngine::from_config(&config.chunking)?);
        tracing::info!(
            "Engine ready (tokenizer: {}, max_tokens: {})",
            engine.tokenizer_name(),
            engine.default_max_tokens()
        );
        Ok(Self::with_engine(config, engine))
    }

    /// Create application state around a given engine.
    ///
    /// Spawns the background worker and the retention sweeper, so it must be
    /// called from within a Tokio runtime.
    pub fn with_engine(config: ServiceConfig, engine: Arc<dyn ConversionEngine>) -> Self {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let workspaces = WorkspaceManager::new(&config.processing.workspace_dir);
        let worker_count = config.processing.worker_count();

        let (queue, receiver) = JobQueue::new(config.processing.queue_capacity, store.clone());
        let worker = ProcessingWorker::new(engine.clone(), store.clone(), worker_count);
        tokio::spawn(worker.run(receiver));

        if let Some(retention_secs) = config.processing.job_retention_secs {
            let interval = Duration::from_secs(config.processing.sweep_interval_secs.max(1));
            tokio::spawn(sweep_finished_jobs(
                Arc::downgrade(&store),
                Duration::from_secs(retention_secs),
                interval,
            ));
            tracing::info!(
                "Finished jobs are kept for {}s (sweep every {}s)",
                retention_secs,
                interval.as_secs()
            );
        } else {
            tracing::info!("Job retention disabled; finished jobs are kept until deleted");
        }

        tracing::info!(
            "Workspaces under {}, {} concurrent jobs",
            workspaces.root().display(),
            worker_count
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                engine,
                store,
                queue,
                workspaces,
                worker_count,
                ready: RwLock::new(true),
            }),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    pub fn engine(&self) -> Arc<dyn ConversionEngine> {
        self.inner.engine.clone()
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.inner.store
    }

    pub fn queue(&self) -> &JobQueue {
        &self.inner.queue
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.inner.workspaces
    }

    pub fn worker_count(&self) -> usize {
        self.inner.worker_count
    }

    /// Check if ready
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.read()
    }

    /// Set ready state
    pub fn set_ready(&self, ready: bool) {
        *self.inner.ready.write() = ready;
    }

    /// Stop accepting traffic and release every workspace still held by a job
    pub async fn shutdown(&self) {
        self.set_ready(false);
        let live = self.inner.store.len().await;
        tracing::info!("Shutting down, releasing workspaces of {} jobs", live);
        self.inner.store.release_all().await;
    }
}

/// Periodically evict finished jobs older than `retention`; stops once the store is dropped
async fn sweep_finished_jobs(store: Weak<dyn JobStore>, retention: Duration, interval: Duration) {
    let retention = match chrono::Duration::from_std(retention) {
        Ok(retention) => retention,
        Err(e) => {
            tracing::warn!("Job retention out of range, sweeper disabled: {}", e);
            return;
        }
    };

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(store) = store.upgrade() else {
            break;
        };

        let cutoff = chrono::Utc::now() - retention;
        match store.evict_finished_before(cutoff).await {
            Ok(0) => {}
            Ok(evicted) => tracing::info!("Evicted {} finished jobs", evicted),
            Err(e) => tracing::warn!("Job eviction failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::{JobStatus, Transition};

    #[tokio::test]
    async fn test_sweeper_evicts_finished_jobs() {
        let root = tempfile::tempdir().unwrap();
        let mut config = ServiceConfig::default();
        config.processing.workspace_dir = root.path().to_path_buf();
        config.processing.job_retention_secs = Some(0);
        config.processing.sweep_interval_secs = 1;

        let state = AppState::new(config).await.unwrap();
        let workspace = state.workspaces().allocate().await.unwrap();
        let record = state.store().create("a.txt".into(), 1, workspace).await.unwrap();
        state.store().update(record.id, Transition::Start).await.unwrap();
        let failed = state
            .store()
            .update(record.id, Transition::Fail("boom".into()))
            .await
            .unwrap();
        assert_eq!(failed.status, JobStatus::Failed);

        for _ in 0..50 {
            if state.store().len().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(state.store().len().await, 0);
        assert!(state.workspaces().live_dirs().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_releases_workspaces() {
        let root = tempfile::tempdir().unwrap();
        let mut config = ServiceConfig::default();
        config.processing.workspace_dir = root.path().to_path_buf();

        let state = AppState::new(config).await.unwrap();
        let workspace = state.workspaces().allocate().await.unwrap();
        state.store().create("a.txt".into(), 1, workspace).await.unwrap();
        assert_eq!(state.workspaces().live_dirs().len(), 1);

        state.shutdown().await;
        assert!(!state.is_ready());
        assert!(state.workspaces().live_dirs().is_empty());
    }
}
