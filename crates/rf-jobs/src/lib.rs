//! # rf-jobs
//!
//! Export job lifecycle: the [`Job`] record and its state machine, the
//! in-memory [`JobStore`], the bounded FIFO scheduler ([`JobManager`]) and
//! the background TTL pruner.

pub mod job;
pub mod manager;
pub mod pruner;
pub mod store;

pub use job::{DebugEntry, DebugLog, Job, JobError, JobStatus};
pub use manager::{Admission, JobManager, ManagerConfig, QueueStats};
pub use pruner::run_pruner;
pub use store::JobStore;
