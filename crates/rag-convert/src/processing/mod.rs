//! Background job lifecycle: workspaces, job store, queue and worker

pub mod queue;
pub mod store;
pub mod worker;
pub mod workspace;

pub use queue::{ConversionTask, JobQueue};
pub use store::{
    InMemoryJobStore, JobCounts, JobId, JobRecord, JobStatus, JobStore, JobSummary, Transition,
};
pub use worker::ProcessingWorker;
pub use workspace::{sanitize_filename, Workspace, WorkspaceManager};
