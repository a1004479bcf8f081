//! Unified error type and failure taxonomy.
//!
//! Every failure a job or request can hit funnels into [`Error`]. Each
//! variant maps onto a stable, client-visible [`ErrorCode`] via
//! [`Error::code`] and onto an HTTP status via [`Error::http_status`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable, machine-readable failure codes exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    HashMismatch,
    UnsupportedTimeline,
    MediaMissing,
    JobTooLarge,
    OverCapacity,
    NotFound,
    EncoderFailed,
    Timeout,
    Cancelled,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::HashMismatch => "hash_mismatch",
            ErrorCode::UnsupportedTimeline => "unsupported_timeline",
            ErrorCode::MediaMissing => "media_missing",
            ErrorCode::JobTooLarge => "job_too_large",
            ErrorCode::OverCapacity => "over_capacity",
            ErrorCode::NotFound => "not_found",
            ErrorCode::EncoderFailed => "encoder_failed",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type covering all failure modes in renderforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "job", "media").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Uploaded bytes do not hash to the claimed content hash.
    #[error("Hash mismatch: claimed {claimed}, computed {computed}")]
    HashMismatch { claimed: String, computed: String },

    /// A whole-timeline export spans more than one source.
    #[error("Unsupported timeline: {0}")]
    UnsupportedTimeline(String),

    /// No usable input file exists for a real-media job.
    #[error("Media missing: {0}")]
    MediaMissing(String),

    /// Derived geometry or duration exceeds the hard ceiling.
    #[error("Job too large: {0}")]
    JobTooLarge(String),

    /// Render queue is full.
    #[error("Render queue is full ({queued} queued)")]
    OverCapacity { queued: usize },

    /// The operation was abandoned on request.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// The wall-clock ceiling for an operation expired.
    #[error("Timed out after {secs}s")]
    Timeout { secs: u64 },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffmpeg) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error onto the client-visible taxonomy.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::NotFound { .. } => ErrorCode::NotFound,
            Error::Validation(_) => ErrorCode::InvalidRequest,
            Error::HashMismatch { .. } => ErrorCode::HashMismatch,
            Error::UnsupportedTimeline(_) => ErrorCode::UnsupportedTimeline,
            Error::MediaMissing(_) => ErrorCode::MediaMissing,
            Error::JobTooLarge(_) => ErrorCode::JobTooLarge,
            Error::OverCapacity { .. } => ErrorCode::OverCapacity,
            Error::Cancelled(_) => ErrorCode::Cancelled,
            Error::Timeout { .. } => ErrorCode::Timeout,
            Error::Tool { .. } => ErrorCode::EncoderFailed,
            Error::Io { .. } | Error::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Validation(_) => 400,
            Error::HashMismatch { .. } => 400,
            Error::UnsupportedTimeline(_) => 422,
            Error::MediaMissing(_) => 422,
            Error::JobTooLarge(_) => 413,
            Error::OverCapacity { .. } => 503,
            Error::Cancelled(_) => 409,
            Error::Timeout { .. } => 504,
            Error::Io { .. } => 500,
            Error::Tool { .. } => 502,
            Error::Internal(_) => 500,
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = Error::not_found("job", "abc-123");
        assert_eq!(err.to_string(), "job not found: abc-123");
        assert_eq!(err.http_status(), 404);
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn validation_is_invalid_request() {
        let err = Error::Validation("container is required".into());
        assert_eq!(err.to_string(), "Validation error: container is required");
        assert_eq!(err.http_status(), 400);
        assert_eq!(err.code().as_str(), "invalid_request");
    }

    #[test]
    fn hash_mismatch_display() {
        let err = Error::HashMismatch {
            claimed: "aa".into(),
            computed: "bb".into(),
        };
        assert!(err.to_string().contains("claimed aa"));
        assert_eq!(err.code(), ErrorCode::HashMismatch);
    }

    #[test]
    fn tool_maps_to_encoder_failed() {
        let err = Error::tool("ffmpeg", "exit code 1");
        assert_eq!(err.to_string(), "Tool error [ffmpeg]: exit code 1");
        assert_eq!(err.http_status(), 502);
        assert_eq!(err.code(), ErrorCode::EncoderFailed);
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.code(), ErrorCode::Internal);
    }

    #[test]
    fn over_capacity_code() {
        let err = Error::OverCapacity { queued: 4 };
        assert_eq!(err.code().to_string(), "over_capacity");
        assert_eq!(err.http_status(), 503);
    }

    #[test]
    fn error_code_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorCode::UnsupportedTimeline).unwrap();
        assert_eq!(json, "\"unsupported_timeline\"");
    }
}
