//! Background worker executing conversion jobs

use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

use crate::error::{Error, Result};
use crate::ingestion::{assemble_result, ConversionEngine, UploadInfo};

use super::queue::ConversionTask;
use super::store::{JobId, JobStore, Transition};

/// Runs queued tasks with bounded concurrency
pub struct ProcessingWorker {
    engine: Arc<dyn ConversionEngine>,
    store: Arc<dyn JobStore>,
    semaphore: Arc<Semaphore>,
    worker_count: usize,
}

impl ProcessingWorker {
    pub fn new(engine: Arc<dyn ConversionEngine>, store: Arc<dyn JobStore>, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        Self {
            engine,
            store,
            semaphore: Arc::new(Semaphore::new(worker_count)),
            worker_count,
        }
    }

    /// Receive tasks until every sender is dropped
    pub async fn run(self, mut receiver: mpsc::Receiver<ConversionTask>) {
        tracing::info!("Processing worker started: {} concurrent jobs", self.worker_count);
        let worker = Arc::new(self);

        while let Some(task) = receiver.recv().await {
            // Wait for a free slot so pending tasks stay in submission order
            let permit = match worker.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    task.workspace.release().await;
                    break;
                }
            };

            let worker = worker.clone();
            tokio::spawn(async move {
                let _permit = permit;
                worker.process(task).await;
            });
        }

        tracing::info!("Processing worker stopped");
    }

    /// Execute one job; the workspace is released whatever the outcome
    async fn process(&self, task: ConversionTask) {
        let job_id = task.job_id;
        tracing::info!("[Job {}] Processing {} ({} bytes)", job_id, task.filename, task.file_size);

        match self.execute(&task).await {
            Ok(()) => tracing::info!("[Job {}] Completed", job_id),
            Err(Error::JobNotFound(_)) => {
                tracing::info!("[Job {}] Deleted while processing, abandoning", job_id)
            }
            Err(e) => {
                tracing::error!("[Job {}] Failed: {}", job_id, e);
                if let Err(update_err) = self.store.update(job_id, Transition::Fail(e.to_string())).await {
                    tracing::debug!("[Job {}] Could not record failure: {}", job_id, update_err);
                }
            }
        }

        task.workspace.release().await;
    }

    async fn checkpoint(&self, job_id: JobId, progress: u8, message: &str) -> Result<()> {
        self.store
            .update(job_id, Transition::checkpoint(progress, message))
            .await?;
        tracing::debug!("[Job {}] {}% {}", job_id, progress, message);
        Ok(())
    }

    async fn execute(&self, task: &ConversionTask) -> Result<()> {
        let job_id = task.job_id;

        self.store.update(job_id, Transition::Start).await?;
        self.checkpoint(job_id, 10, "Job accepted").await?;

        self.checkpoint(job_id, 30, "Converting document...").await?;
        let engine = self.engine.clone();
        let path = task.path.clone();
        let doc = tokio::task::spawn_blocking(move || engine.convert(&path))
            .await
            .map_err(|e| Error::internal(format!("Conversion task aborted: {}", e)))??;

        self.checkpoint(job_id, 40, "Configuring chunker...").await?;
        let max_tokens = task
            .options
            .max_tokens
            .unwrap_or_else(|| self.engine.default_max_tokens());
        tracing::debug!("[Job {}] Chunking with max_tokens={}", job_id, max_tokens);

        self.checkpoint(job_id, 60, "Chunking document...").await?;
        let engine = self.engine.clone();
        let options = task.options.clone();
        let (doc, chunks) = tokio::task::spawn_blocking(move || {
            let chunks = engine.chunk(&doc, &options)?;
            Ok::<_, Error>((doc, chunks))
        })
        .await
        .map_err(|e| Error::internal(format!("Chunking task aborted: {}", e)))??;

        self.checkpoint(job_id, 80, "Assembling metadata...").await?;
        let upload = UploadInfo {
            filename: &task.filename,
            extension: &task.extension,
            file_size: task.file_size,
        };
        let result = assemble_result(self.engine.as_ref(), &upload, &doc, chunks, &task.options);
        tracing::info!("[Job {}] Produced {} chunks", job_id, result.total_chunks);

        self.store
            .update(job_id, Transition::Complete(Box::new(result)))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::{DocumentEngine, WordTokenCounter};
    use crate::processing::queue::JobQueue;
    use crate::processing::store::{InMemoryJobStore, JobRecord, JobStatus};
    use crate::processing::workspace::WorkspaceManager;
    use crate::types::{ChunkRecord, ChunkingOptions, ConvertedDocument};
    use std::path::Path;
    use std::time::Duration;

    /// Engine whose conversion always fails
    struct BrokenEngine;

    impl ConversionEngine for BrokenEngine {
        fn convert(&self, _path: &Path) -> Result<ConvertedDocument> {
            Err(Error::conversion("corrupt file"))
        }

        fn chunk(&self, _doc: &ConvertedDocument, _options: &ChunkingOptions) -> Result<Vec<ChunkRecord>> {
            Ok(Vec::new())
        }

        fn tokenizer_name(&self) -> &str {
            "none"
        }

        fn default_max_tokens(&self) -> usize {
            512
        }

        fn merge_peers(&self) -> bool {
            true
        }
    }

    /// Engine that blocks in `convert` until released by the test
    struct GatedEngine {
        inner: DocumentEngine,
        gate: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl ConversionEngine for GatedEngine {
        fn convert(&self, path: &Path) -> Result<ConvertedDocument> {
            if let Ok(gate) = self.gate.lock() {
                let _ = gate.recv();
            }
            self.inner.convert(path)
        }

        fn chunk(&self, doc: &ConvertedDocument, options: &ChunkingOptions) -> Result<Vec<ChunkRecord>> {
            self.inner.chunk(doc, options)
        }

        fn tokenizer_name(&self) -> &str {
            self.inner.tokenizer_name()
        }

        fn default_max_tokens(&self) -> usize {
            self.inner.default_max_tokens()
        }

        fn merge_peers(&self) -> bool {
            self.inner.merge_peers()
        }
    }

    fn document_engine() -> DocumentEngine {
        DocumentEngine::new(Arc::new(WordTokenCounter::new("words")), 64, true)
    }

    struct Harness {
        _root: tempfile::TempDir,
        manager: WorkspaceManager,
        store: Arc<dyn JobStore>,
        queue: JobQueue,
    }

    impl Harness {
        fn start(engine: Arc<dyn ConversionEngine>) -> Self {
            let root = tempfile::tempdir().unwrap();
            let manager = WorkspaceManager::new(root.path());
            let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
            let (queue, receiver) = JobQueue::new(16, store.clone());
            tokio::spawn(ProcessingWorker::new(engine, store.clone(), 2).run(receiver));
            Self {
                _root: root,
                manager,
                store,
                queue,
            }
        }

        async fn submit(&self, filename: &str, content: &[u8]) -> JobRecord {
            let workspace = self.manager.allocate().await.unwrap();
            let path = self.manager.store(&workspace, filename, content).await.unwrap();
            let record = self
                .store
                .create(filename.to_string(), content.len() as u64, workspace.clone())
                .await
                .unwrap();
            self.queue
                .submit(ConversionTask {
                    job_id: record.id,
                    path,
                    filename: filename.to_string(),
                    extension: ".txt".to_string(),
                    file_size: content.len() as u64,
                    options: ChunkingOptions::default(),
                    workspace,
                })
                .await
                .unwrap();
            record
        }

        async fn wait_until<F: Fn(&JobRecord) -> bool>(&self, id: JobId, done: F) -> JobRecord {
            for _ in 0..500 {
                if let Ok(record) = self.store.get(id).await {
                    if done(&record) {
                        return record;
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("job {} did not reach the expected state", id);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_job_completes_and_releases_workspace() {
        let harness = Harness::start(Arc::new(document_engine()));
        let record = harness.submit("notes.txt", b"Hello from a background job.").await;

        let done = harness.wait_until(record.id, |r| r.status.is_terminal()).await;
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 100);
        let result = done.result.unwrap();
        assert_eq!(result.total_chunks, 1);
        assert_eq!(result.chunks[0].text, "Hello from a background job.");
        assert!(done.error.is_none());

        for _ in 0..100 {
            if harness.manager.live_dirs().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(harness.manager.live_dirs().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_conversion_failure_is_recorded() {
        let harness = Harness::start(Arc::new(BrokenEngine));
        let record = harness.submit("bad.txt", b"x").await;

        let failed = harness.wait_until(record.id, |r| r.status.is_terminal()).await;
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("corrupt file"));
        assert_eq!(failed.progress, 30);
        assert!(failed.result.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_delete_while_processing() {
        let (release, gate) = std::sync::mpsc::channel();
        let engine = GatedEngine {
            inner: document_engine(),
            gate: std::sync::Mutex::new(gate),
        };
        let harness = Harness::start(Arc::new(engine));
        let record = harness.submit("slow.txt", b"Some slow text.").await;

        harness.wait_until(record.id, |r| r.progress == 30).await;
        harness.store.delete(record.id).await.unwrap();
        release.send(()).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(harness.store.get(record.id).await.is_err());
        assert_eq!(harness.store.len().await, 0);
        assert!(harness.manager.live_dirs().is_empty());
    }
}
