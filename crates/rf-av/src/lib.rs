//! # rf-av
//!
//! External tool management and the encoder boundary.
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache the ffmpeg path.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout,
//!   streaming stderr and kill-on-cancel.
//! - **Encoding** ([`Encoder`], [`FfmpegEncoder`], [`spawn_encode`]) -- run
//!   one export as a background task that reports progress and a single
//!   terminal event.

pub mod command;
pub mod encoder;
pub mod tools;

pub use command::{ToolCommand, ToolOutput};
pub use encoder::{
    build_ffmpeg_args, spawn_encode, EncodeHandle, EncodeInput, EncodeOutcome, EncodeRequest,
    Encoder, EncoderEvent, EncoderOptions, EventSender, FfmpegEncoder, ProgressParser,
};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
