//! Job record and its state machine.
//!
//! Status only moves forward:
//!
//! ```text
//! queued -> rendering -> complete
//!    |          |-----> failed
//!    |          `-----> cancelled
//!    |-> failed (admission) / cancelled
//! ```
//!
//! Terminal states are never left. `download_path` is set exactly when the
//! status is `complete`.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rf_core::{Container, Error, ErrorCode, JobId, RenderParams};
use serde::{Deserialize, Serialize};

/// Progress ceiling while the encoder gives no percentage.
const LIVENESS_CAP: f64 = 99.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Rendering,
    Complete,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed | JobStatus::Cancelled)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            JobStatus::Queued => matches!(
                next,
                JobStatus::Rendering | JobStatus::Failed | JobStatus::Cancelled
            ),
            JobStatus::Rendering => next.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Rendering => "rendering",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "rendering" => Ok(JobStatus::Rendering),
            "complete" => Ok(JobStatus::Complete),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(Error::Validation(format!("unknown job status '{other}'"))),
        }
    }
}

/// Failure recorded on a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct JobError {
    pub code: ErrorCode,
    /// Human-readable detail; encoder output is kept verbatim.
    pub message: String,
}

impl From<&Error> for JobError {
    fn from(err: &Error) -> Self {
        let message = match err {
            Error::Tool { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self {
            code: err.code(),
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DebugEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Bounded diagnostic trail, oldest entries evicted first.
#[derive(Debug, Clone)]
pub struct DebugLog {
    entries: VecDeque<DebugEntry>,
    capacity: usize,
}

impl DebugLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(DebugEntry {
            at: Utc::now(),
            message: message.into(),
        });
    }

    pub fn entries(&self) -> impl Iterator<Item = &DebugEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One export request and its lifecycle state.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// 0..=100, non-decreasing.
    pub progress: f64,
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub container: Container,
    pub download_path: Option<PathBuf>,
    pub client_version: Option<String>,
    /// Parameters the encoder was given, once derived.
    pub params: Option<RenderParams>,
    pub debug: DebugLog,
}

impl Job {
    pub fn new(container: Container, client_version: Option<String>, debug_capacity: usize) -> Self {
        Self {
            id: JobId::new(),
            status: JobStatus::Queued,
            progress: 0.0,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            container,
            download_path: None,
            client_version,
            params: None,
            debug: DebugLog::new(debug_capacity),
        }
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.debug.push(message);
    }

    fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::debug!(
                job_id = %self.id,
                "Ignoring transition {} -> {}",
                self.status.as_str(),
                next.as_str()
            );
            return false;
        }
        self.status = next;
        if next == JobStatus::Rendering {
            self.started_at = Some(Utc::now());
        }
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        true
    }

    pub fn start(&mut self) -> bool {
        let ok = self.transition(JobStatus::Rendering);
        if ok {
            self.log("rendering started");
        }
        ok
    }

    pub fn complete(&mut self, output: PathBuf) -> bool {
        let ok = self.transition(JobStatus::Complete);
        if ok {
            self.progress = 100.0;
            self.log(format!("complete: {}", output.display()));
            self.download_path = Some(output);
        }
        ok
    }

    pub fn fail(&mut self, error: JobError) -> bool {
        let ok = self.transition(JobStatus::Failed);
        if ok {
            self.log(format!("failed [{}]: {}", error.code, error.message));
            self.error = Some(error);
        }
        ok
    }

    pub fn cancel(&mut self) -> bool {
        let ok = self.transition(JobStatus::Cancelled);
        if ok {
            self.log("cancelled");
            self.error = Some(JobError {
                code: ErrorCode::Cancelled,
                message: "job was cancelled".into(),
            });
        }
        ok
    }

    /// Apply an encoder progress report.
    ///
    /// A percentage is clamped to 0..=100 and ignored if it is below the
    /// current value. Without a percentage, progress creeps up by one
    /// point, never past 99.
    pub fn record_progress(&mut self, percent: Option<f64>) -> f64 {
        if self.status != JobStatus::Rendering {
            return self.progress;
        }
        let candidate = match percent {
            Some(p) if p.is_finite() => p.clamp(0.0, 100.0),
            _ => (self.progress + 1.0).min(LIVENESS_CAP),
        };
        if candidate > self.progress {
            self.progress = candidate;
        }
        self.progress
    }

    /// How long the job has been in its terminal state.
    pub fn terminal_age(&self, now: DateTime<Utc>) -> Option<Duration> {
        if !self.status.is_terminal() {
            return None;
        }
        let finished = self.finished_at.unwrap_or(self.created_at);
        Some((now - finished).to_std().unwrap_or(Duration::ZERO))
    }

    /// Progress as reported to clients: absent while queued.
    pub fn visible_progress(&self) -> Option<f64> {
        match self.status {
            JobStatus::Queued => None,
            _ => Some(self.progress),
        }
    }
}
