//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for the server, storage roots, external tools, the render
//! queue and render limits. Every section defaults sensibly so a completely
//! empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::params::RenderLimits;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub tools: ToolsConfig,
    pub queue: QueueConfig,
    pub render: RenderConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Load configuration strictly: a missing or malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.queue.max_concurrent == 0 {
            warnings.push("queue.max_concurrent is 0; no job will ever start".into());
        }

        if self.queue.job_ttl_secs == 0 {
            warnings.push("queue.job_ttl_secs is 0; finished jobs are pruned on the next sweep".into());
        }

        let r = &self.render;
        if r.max_width > r.extreme_width || r.max_height > r.extreme_height {
            warnings.push(format!(
                "render soft limit {}x{} exceeds hard ceiling {}x{}",
                r.max_width, r.max_height, r.extreme_width, r.extreme_height
            ));
        }
        if r.max_fps <= 0.0 {
            warnings.push("render.max_fps is not positive; frame rates will not be clamped".into());
        }

        if self.storage.media_dir == self.storage.output_dir {
            warnings.push(
                "storage.media_dir and storage.output_dir are the same directory; pruning may delete uploads"
                    .into(),
            );
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Include each job's diagnostic trail in status responses.
    pub debug_responses: bool,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            debug_responses: false,
            max_upload_bytes: 2 * 1024 * 1024 * 1024,
        }
    }
}

/// Storage roots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Content-addressed input store, written by the upload endpoint.
    pub media_dir: PathBuf,
    /// Rendered outputs, one file per job.
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            media_dir: PathBuf::from("./data/media"),
            output_dir: PathBuf::from("./data/exports"),
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
}

/// Render queue sizing and housekeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of jobs rendering at once.
    pub max_concurrent: usize,
    /// Maximum number of jobs waiting behind the running ones.
    pub max_queued: usize,
    /// How long a finished job (and its output) is kept.
    pub job_ttl_secs: u64,
    pub prune_interval_secs: u64,
    /// Wall-clock ceiling for a single encode.
    pub job_timeout_secs: u64,
    pub debug_log_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            max_queued: 16,
            job_ttl_secs: 3600,
            prune_interval_secs: 300,
            job_timeout_secs: 3600,
            debug_log_capacity: 50,
        }
    }
}

impl QueueConfig {
    pub fn job_ttl(&self) -> Duration {
        Duration::from_secs(self.job_ttl_secs)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs.max(1))
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

/// Render limits and encoder defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Soft limits: larger requests are scaled down with a warning.
    pub max_width: u32,
    pub max_height: u32,
    pub max_fps: f64,
    /// Hard ceilings: larger requests fail with `job_too_large`.
    pub extreme_width: u32,
    pub extreme_height: u32,
    pub extreme_duration_secs: f64,
    /// Render a solid-color placeholder when no source can be resolved.
    pub placeholder_fallback: bool,
    pub placeholder_color: String,
    pub video_preset: String,
    pub audio_bitrate: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_width: 3840,
            max_height: 2160,
            max_fps: 60.0,
            extreme_width: 7680,
            extreme_height: 4320,
            extreme_duration_secs: 4.0 * 3600.0,
            placeholder_fallback: true,
            placeholder_color: "black".into(),
            video_preset: "veryfast".into(),
            audio_bitrate: "192k".into(),
        }
    }
}

impl RenderConfig {
    pub fn limits(&self) -> RenderLimits {
        RenderLimits {
            max_width: self.max_width,
            max_height: self.max_height,
            max_fps: self.max_fps,
            extreme_width: self.extreme_width,
            extreme_height: self.extreme_height,
            extreme_duration_secs: self.extreme_duration_secs,
        }
    }
}
