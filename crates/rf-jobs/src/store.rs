//! In-memory job registry.
//!
//! [`JobStore`] is plain data; the [`JobManager`](crate::JobManager) owns
//! the only instance and guards it with its state lock.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rf_core::JobId;

use crate::job::{Job, JobStatus};

#[derive(Debug, Default)]
pub struct JobStore {
    jobs: HashMap<JobId, Job>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, job: Job) {
        self.jobs.insert(job.id, job);
    }

    pub fn get(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn get_mut(&mut self, id: &JobId) -> Option<&mut Job> {
        self.jobs.get_mut(id)
    }

    pub fn remove(&mut self, id: &JobId) -> Option<Job> {
        self.jobs.remove(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs, oldest first, optionally filtered by status.
    pub fn list(&self, status: Option<JobStatus>) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .values()
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.values().filter(|j| j.status == status).count()
    }

    /// Terminal jobs whose terminal age has reached `ttl`. Queued and
    /// rendering jobs are never returned.
    pub fn expired(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<&Job> {
        self.jobs
            .values()
            .filter(|j| j.terminal_age(now).is_some_and(|age| age >= ttl))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_core::Container;
    use std::path::PathBuf;

    fn job() -> Job {
        Job::new(Container::Mp4, None, 10)
    }

    #[test]
    fn insert_get_remove() {
        let mut store = JobStore::new();
        let j = job();
        let id = j.id;
        store.insert(j);
        assert_eq!(store.len(), 1);
        assert!(store.get(&id).is_some());
        assert!(store.remove(&id).is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn list_filters_by_status() {
        let mut store = JobStore::new();
        let queued = job();
        let mut rendering = job();
        rendering.start();
        store.insert(queued);
        store.insert(rendering);

        assert_eq!(store.list(None).len(), 2);
        assert_eq!(store.list(Some(JobStatus::Rendering)).len(), 1);
        assert_eq!(store.count(JobStatus::Queued), 1);
    }

    #[test]
    fn expired_skips_active_jobs_regardless_of_age() {
        let mut store = JobStore::new();

        let mut old_queued = job();
        old_queued.created_at = Utc::now() - chrono::Duration::days(2);
        let mut old_rendering = job();
        old_rendering.created_at = Utc::now() - chrono::Duration::days(2);
        old_rendering.start();
        let mut done = job();
        done.start();
        done.complete(PathBuf::from("/tmp/out.mp4"));
        let done_id = done.id;

        store.insert(old_queued);
        store.insert(old_rendering);
        store.insert(done);

        let ttl = Duration::from_secs(3600);
        assert!(store.expired(Utc::now(), ttl).is_empty());

        let later = Utc::now() + chrono::Duration::hours(2);
        let ids: Vec<JobId> = store.expired(later, ttl).iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![done_id]);
    }
}
