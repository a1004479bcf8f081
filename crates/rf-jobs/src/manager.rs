//! Bounded-concurrency export scheduler.
//!
//! [`JobManager`] owns every job record, the FIFO wait queue and the set of
//! in-flight renders. Admission on submit:
//!
//! - fewer than `max_concurrent` renders in flight: start now;
//! - else fewer than `max_queued` waiting: enqueue;
//! - else: record the job as already `failed` with `over_capacity`.
//!
//! A started job runs its pipeline on a background task: timeline shape
//! check, input resolution, hard-ceiling check, parameter derivation, then
//! the encoder. Any step may fail the job without reaching the encoder.
//! Whenever a render slot frees up the queue is drained in order.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rf_av::{spawn_encode, EncodeInput, EncodeRequest, Encoder, EncoderEvent};
use rf_core::config::Config;
use rf_core::params::{self, RenderLimits};
use rf_core::{Container, Error, ExportRequest, JobId, ResolutionMode, Result};
use rf_media::{check_timeline_shape, resolve_primary_source, MediaResolver};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::job::{Job, JobError, JobStatus};
use crate::store::JobStore;

/// Scheduler settings, flattened from [`Config`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub max_concurrent: usize,
    pub max_queued: usize,
    pub job_ttl: Duration,
    pub job_timeout: Duration,
    pub debug_capacity: usize,
    pub limits: RenderLimits,
    pub placeholder_fallback: bool,
    pub placeholder_color: String,
    pub media_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl ManagerConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_concurrent: cfg.queue.max_concurrent,
            max_queued: cfg.queue.max_queued,
            job_ttl: cfg.queue.job_ttl(),
            job_timeout: cfg.queue.job_timeout(),
            debug_capacity: cfg.queue.debug_log_capacity,
            limits: cfg.render.limits(),
            placeholder_fallback: cfg.render.placeholder_fallback,
            placeholder_color: cfg.render.placeholder_color.clone(),
            media_dir: cfg.storage.media_dir.clone(),
            output_dir: cfg.storage.output_dir.clone(),
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// What happened to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Started,
    /// Waiting; `position` is 1-based.
    Queued { position: usize },
    /// Queue full; the job exists but is already failed.
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub rendering: usize,
    pub queued: usize,
    pub max_concurrent: usize,
    pub max_queued: usize,
    pub total: usize,
}

#[derive(Default)]
struct State {
    store: JobStore,
    queue: VecDeque<JobId>,
    /// Requests of queued jobs, dropped once they start or are cancelled.
    pending: HashMap<JobId, Arc<ExportRequest>>,
    /// In-flight pipelines. A slot is held until the pipeline task ends,
    /// even if the record was cancelled or removed meanwhile.
    active: HashMap<JobId, CancellationToken>,
}

struct Inner {
    config: ManagerConfig,
    encoder: Arc<dyn Encoder>,
    resolver: MediaResolver,
    state: Mutex<State>,
    shutdown: CancellationToken,
}

/// How a pipeline ended, before it is written to the record.
enum Finish {
    Completed(PathBuf),
    Failed(Error),
    Abandoned,
}

/// Handle to the scheduler. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

impl JobManager {
    pub fn new(config: ManagerConfig, encoder: Arc<dyn Encoder>) -> Self {
        let resolver = MediaResolver::new(&config.media_dir);
        Self {
            inner: Arc::new(Inner {
                config,
                encoder,
                resolver,
                state: Mutex::new(State::default()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn encoder_name(&self) -> &str {
        self.inner.encoder.name()
    }

    /// Output file for a job.
    pub fn output_path(&self, id: JobId, container: Container) -> PathBuf {
        self.inner
            .config
            .output_dir
            .join(format!("{id}.{}", container.extension()))
    }

    // -----------------------------------------------------------------------
    // Submission and queries
    // -----------------------------------------------------------------------

    /// Create a job and admit it. Never blocks on queue state.
    ///
    /// Only malformed settings are an error; a full queue still yields a
    /// job id whose record is already failed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, request: ExportRequest) -> Result<(JobId, Admission)> {
        request.validate()?;

        let cfg = &self.inner.config;
        let request = Arc::new(request);
        let mut job = Job::new(
            request.settings.container,
            request.client_version.clone(),
            cfg.debug_capacity,
        );
        let id = job.id;
        job.log(format!(
            "submitted: {} {:?}/{:?}, selector {:?}",
            request.settings.container.extension(),
            request.settings.video_codec,
            request.settings.effective_audio_codec(),
            request.settings.source.kind,
        ));

        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        let admission = if state.active.len() < cfg.max_concurrent {
            Admission::Started
        } else if state.queue.len() < cfg.max_queued {
            Admission::Queued {
                position: state.queue.len() + 1,
            }
        } else {
            Admission::Rejected
        };

        match admission {
            Admission::Started => {
                state.store.insert(job);
                self.start_locked(state, id, request);
            }
            Admission::Queued { position } => {
                job.log(format!("queued at position {position}"));
                tracing::info!(job_id = %id, position, "Job queued");
                state.store.insert(job);
                state.queue.push_back(id);
                state.pending.insert(id, request);
            }
            Admission::Rejected => {
                let err = Error::OverCapacity {
                    queued: state.queue.len(),
                };
                tracing::warn!(job_id = %id, "Rejecting job: {err}");
                job.fail(JobError::from(&err));
                state.store.insert(job);
            }
        }

        Ok((id, admission))
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.inner.state.lock().store.get(id).cloned()
    }

    pub fn list(&self, status: Option<JobStatus>) -> Vec<Job> {
        self.inner.state.lock().store.list(status)
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.inner.state.lock();
        QueueStats {
            rendering: state.store.count(JobStatus::Rendering),
            queued: state.queue.len(),
            max_concurrent: self.inner.config.max_concurrent,
            max_queued: self.inner.config.max_queued,
            total: state.store.len(),
        }
    }

    /// The finished output of a job.
    ///
    /// `NotFound` for unknown jobs, unfinished jobs, and outputs that have
    /// vanished from disk.
    pub fn download(&self, id: &JobId) -> Result<(PathBuf, Container)> {
        let job = self.get(id).ok_or_else(|| Error::not_found("job", id))?;
        let path = match (job.status, job.download_path) {
            (JobStatus::Complete, Some(path)) => path,
            _ => return Err(Error::not_found("export", format!("{id} (not complete)"))),
        };
        if !path.is_file() {
            return Err(Error::not_found("export file", id));
        }
        Ok((path, job.container))
    }

    // -----------------------------------------------------------------------
    // Cancellation, removal, pruning
    // -----------------------------------------------------------------------

    /// Cancel a queued or rendering job. Terminal jobs are returned as is.
    pub fn cancel(&self, id: &JobId) -> Result<Job> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        let job = state
            .store
            .get_mut(id)
            .ok_or_else(|| Error::not_found("job", id))?;

        match job.status {
            JobStatus::Queued => {
                job.cancel();
                state.queue.retain(|q| q != id);
                state.pending.remove(id);
                tracing::info!(job_id = %id, "Queued job cancelled");
            }
            JobStatus::Rendering => {
                job.cancel();
                if let Some(token) = state.active.get(id) {
                    token.cancel();
                }
                tracing::info!(job_id = %id, "Rendering job cancelled");
            }
            _ => {}
        }

        Ok(job.clone())
    }

    /// Delete a job record immediately, terminating its render if any.
    pub fn remove(&self, id: &JobId) -> Result<Job> {
        let job = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let job = state
                .store
                .remove(id)
                .ok_or_else(|| Error::not_found("job", id))?;
            state.queue.retain(|q| q != id);
            state.pending.remove(id);
            if let Some(token) = state.active.get(id) {
                token.cancel();
            }
            job
        };

        // A rendering job's pipeline cleans up its own output.
        if job.status.is_terminal() {
            remove_file_quietly(&self.output_path(job.id, job.container));
        }
        tracing::info!(job_id = %id, "Job removed");
        Ok(job)
    }

    /// Evict terminal jobs older than the TTL, output file first.
    ///
    /// Queued and rendering jobs are never touched.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<(JobId, PathBuf)> = {
            let state = self.inner.state.lock();
            state
                .store
                .expired(now, self.inner.config.job_ttl)
                .into_iter()
                .map(|job| {
                    let path = job
                        .download_path
                        .clone()
                        .unwrap_or_else(|| self.output_path(job.id, job.container));
                    (job.id, path)
                })
                .collect()
        };

        let mut removed = 0;
        for (id, path) in expired {
            remove_file_quietly(&path);
            if self.inner.state.lock().store.remove(&id).is_some() {
                tracing::debug!(job_id = %id, "Pruned job");
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!("Pruned {removed} finished job(s)");
        }
        removed
    }

    /// Terminate every in-flight render. Queued jobs stay queued; freed
    /// slots are no longer refilled.
    pub fn shutdown(&self) {
        tracing::info!("Stopping all renders");
        self.inner.shutdown.cancel();
    }

    // -----------------------------------------------------------------------
    // Pipeline
    // -----------------------------------------------------------------------

    fn start_locked(&self, state: &mut State, id: JobId, request: Arc<ExportRequest>) {
        let Some(job) = state.store.get_mut(&id) else {
            return;
        };
        if !job.start() {
            return;
        }

        let cancel = self.inner.shutdown.child_token();
        state.active.insert(id, cancel.clone());
        tracing::info!(job_id = %id, "Render started");

        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_job(id, request, cancel).await;
        });
    }

    fn drain_locked(&self, state: &mut State) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        while state.active.len() < self.inner.config.max_concurrent {
            let Some(next) = state.queue.pop_front() else {
                break;
            };
            let Some(request) = state.pending.remove(&next) else {
                continue;
            };
            if state.store.get(&next).map(|j| j.status) != Some(JobStatus::Queued) {
                continue;
            }
            self.start_locked(state, next, request);
        }
    }

    async fn run_job(self, id: JobId, request: Arc<ExportRequest>, cancel: CancellationToken) {
        let output = self.output_path(id, request.settings.container);
        let finish = self.execute(id, &request, &output, &cancel).await;

        let finish = match finish {
            Finish::Completed(path) => match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() && meta.len() > 0 => Finish::Completed(path),
                _ => Finish::Failed(Error::tool(
                    self.inner.encoder.name(),
                    "encoder reported success but the output file is missing",
                )),
            },
            other => other,
        };

        let recorded_output = self.record_finish(id, finish);
        if !recorded_output {
            remove_file_quietly(&output);
        }
    }

    async fn execute(
        &self,
        id: JobId,
        request: &ExportRequest,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Finish {
        let cfg = &self.inner.config;
        let project = &request.project;
        let settings = &request.settings;

        if let Err(e) = check_timeline_shape(project, &settings.source) {
            return Finish::Failed(e);
        }

        let input = match self.resolve_input(id, request) {
            Ok(input) => input,
            Err(e) => return Finish::Failed(e),
        };

        let requested = params::requested_render_params(project, settings);
        if let Err(e) = cfg.limits.check_ceiling(&requested) {
            return Finish::Failed(e);
        }

        let derived = params::derive_render_params(project, settings, &cfg.limits);
        if derived != requested {
            tracing::warn!(
                job_id = %id,
                "Clamped {}x{} @ {} fps to {}x{} @ {} fps",
                requested.width,
                requested.height,
                requested.fps,
                derived.width,
                derived.height,
                derived.fps,
            );
            self.log(
                id,
                format!(
                    "soft limit: requested {}x{} @ {} fps, rendering {}x{} @ {} fps",
                    requested.width,
                    requested.height,
                    requested.fps,
                    derived.width,
                    derived.height,
                    derived.fps
                ),
            );
        }
        self.update(id, |job| job.params = Some(derived));

        if let Err(e) = tokio::fs::create_dir_all(&cfg.output_dir).await {
            return Finish::Failed(e.into());
        }

        let encode = EncodeRequest {
            input,
            params: derived,
            native_size: params::native_dimensions(project),
            custom_resolution: settings.resolution_mode == ResolutionMode::Custom,
            container: settings.container,
            video_codec: settings.video_codec,
            audio_codec: settings.effective_audio_codec(),
            pixel_format: settings.pixel_format().to_string(),
            rate_control: settings.rate_control,
            output: output.to_path_buf(),
        };
        self.log(
            id,
            format!(
                "encoder {}: {}x{} @ {} fps, {:.3}s, {:?} {}, {:?}, {:?}",
                self.inner.encoder.name(),
                derived.width,
                derived.height,
                derived.fps,
                derived.duration_seconds,
                encode.video_codec,
                encode.pixel_format,
                encode.rate_control,
                encode.audio_codec,
            ),
        );

        if cancel.is_cancelled() {
            return Finish::Abandoned;
        }

        let mut handle = spawn_encode(self.inner.encoder.clone(), encode, cancel.clone());
        let deadline = tokio::time::sleep(cfg.job_timeout);
        tokio::pin!(deadline);
        let mut timed_out = false;

        loop {
            tokio::select! {
                event = handle.next_event() => match event {
                    Some(EncoderEvent::Progress(percent)) => {
                        if !self.apply_progress(id, percent) {
                            handle.cancel();
                        }
                    }
                    Some(EncoderEvent::Diagnostic(line)) => self.log(id, format!("encoder: {line}")),
                    Some(terminal) => {
                        if timed_out {
                            return Finish::Failed(Error::Timeout { secs: cfg.job_timeout.as_secs() });
                        }
                        return match terminal {
                            EncoderEvent::Completed { output } => Finish::Completed(output),
                            EncoderEvent::Failed { message } => {
                                Finish::Failed(Error::tool(self.inner.encoder.name(), message))
                            }
                            _ => Finish::Abandoned,
                        };
                    }
                    None if timed_out => {
                        return Finish::Failed(Error::Timeout { secs: cfg.job_timeout.as_secs() });
                    }
                    None if cancel.is_cancelled() => return Finish::Abandoned,
                    None => {
                        return Finish::Failed(Error::Internal(format!(
                            "encoder '{}' stopped without reporting a result",
                            self.inner.encoder.name()
                        )));
                    }
                },
                _ = &mut deadline, if !timed_out => {
                    tracing::warn!(job_id = %id, "Render exceeded {:?}; terminating encoder", cfg.job_timeout);
                    timed_out = true;
                    handle.cancel();
                }
            }
        }
    }

    fn resolve_input(&self, id: JobId, request: &ExportRequest) -> Result<EncodeInput> {
        let cfg = &self.inner.config;
        let project = &request.project;
        let settings = &request.settings;

        match resolve_primary_source(project, &settings.source) {
            Some(source) => {
                match self
                    .inner
                    .resolver
                    .resolve_source(source, Some(settings.container))
                {
                    Some(path) => {
                        let start_secs = params::compute_start_frame(project, &settings.source)
                            / params::project_fps(project);
                        self.log(id, format!("source '{}' -> {}", source.id, path.display()));
                        Ok(EncodeInput::File { path, start_secs })
                    }
                    None => {
                        self.log(
                            id,
                            format!("source '{}' (hash {}) has no media file", source.id, source.hash),
                        );
                        Err(Error::MediaMissing(format!(
                            "no media file for source '{}'",
                            source.id
                        )))
                    }
                }
            }
            None if cfg.placeholder_fallback => {
                self.log(
                    id,
                    format!("no source selected; rendering {} placeholder", cfg.placeholder_color),
                );
                Ok(EncodeInput::Placeholder {
                    color: cfg.placeholder_color.clone(),
                })
            }
            None => Err(Error::MediaMissing(
                "selector does not resolve to a source".into(),
            )),
        }
    }

    /// Returns `false` when the job is gone or no longer rendering, in
    /// which case the encode should be terminated.
    fn apply_progress(&self, id: JobId, percent: Option<f64>) -> bool {
        let mut state = self.inner.state.lock();
        match state.store.get_mut(&id) {
            Some(job) if job.status == JobStatus::Rendering => {
                job.record_progress(percent);
                true
            }
            _ => false,
        }
    }

    /// Write the pipeline result, free the slot and start queued jobs.
    ///
    /// Returns whether the output file is now owned by a complete job.
    fn record_finish(&self, id: JobId, finish: Finish) -> bool {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        state.active.remove(&id);

        let mut owns_output = false;
        match state.store.get_mut(&id) {
            Some(job) => match finish {
                Finish::Completed(path) => {
                    owns_output = job.complete(path);
                    if owns_output {
                        tracing::info!(job_id = %id, "Render complete");
                    }
                }
                Finish::Failed(err) => {
                    tracing::warn!(job_id = %id, code = %err.code(), "Render failed: {err}");
                    job.fail(JobError::from(&err));
                }
                Finish::Abandoned => {
                    if job.cancel() {
                        tracing::info!(job_id = %id, "Render abandoned");
                    } else {
                        job.log("encoder terminated");
                    }
                }
            },
            None => tracing::debug!(job_id = %id, "Job removed while rendering"),
        }

        self.drain_locked(state);
        owns_output
    }

    fn log(&self, id: JobId, message: String) {
        tracing::debug!(job_id = %id, "{message}");
        if let Some(job) = self.inner.state.lock().store.get_mut(&id) {
            job.log(message);
        }
    }

    fn update(&self, id: JobId, f: impl FnOnce(&mut Job)) {
        if let Some(job) = self.inner.state.lock().store.get_mut(&id) {
            f(job);
        }
    }
}

fn remove_file_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {e}", path.display()),
    }
}
