//! Encoder boundary.
//!
//! An [`Encoder`] turns one [`EncodeRequest`] into a file. It reports
//! progress and diagnostics through an event channel and finishes with an
//! [`EncodeOutcome`]. [`spawn_encode`] runs an encoder as a background task
//! and hands the caller an [`EncodeHandle`]: a cancellation token plus a
//! receiver that yields exactly one terminal event.
//!
//! [`FfmpegEncoder`] is the production implementation. It always
//! transcodes; stream copy would need input probing that does not exist.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rf_core::{AudioCodec, Container, RateControl, RenderParams, VideoCodec};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Where the frames come from.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeInput {
    /// A real input file and the window to export from it.
    File {
        path: PathBuf,
        start_secs: f64,
    },
    /// Synthetic solid-color frames, used when no source could be resolved.
    Placeholder { color: String },
}

/// Everything the encoder needs for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeRequest {
    pub input: EncodeInput,
    pub params: RenderParams,
    /// Geometry the input already has; no scale filter when it matches.
    pub native_size: (u32, u32),
    /// An explicit custom resolution was asked for.
    pub custom_resolution: bool,
    pub container: Container,
    pub video_codec: VideoCodec,
    /// Effective audio codec; [`AudioCodec::None`] for a silent output.
    pub audio_codec: AudioCodec,
    pub pixel_format: String,
    pub rate_control: RateControl,
    pub output: PathBuf,
}

/// Encoder tuning that comes from configuration rather than the job.
#[derive(Debug, Clone)]
pub struct EncoderOptions {
    pub video_preset: String,
    pub audio_bitrate: String,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self::from(&rf_core::config::RenderConfig::default())
    }
}

impl From<&rf_core::config::RenderConfig> for EncoderOptions {
    fn from(cfg: &rf_core::config::RenderConfig) -> Self {
        Self {
            video_preset: cfg.video_preset.clone(),
            audio_bitrate: cfg.audio_bitrate.clone(),
        }
    }
}

/// Events an encode emits while it runs.
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderEvent {
    /// Percentage in 0..=100 when known. Not guaranteed monotonic.
    Progress(Option<f64>),
    /// A line of encoder output worth keeping for post-mortem.
    Diagnostic(String),
    Completed { output: PathBuf },
    Failed { message: String },
    /// Terminated on request; neither success nor failure.
    Abandoned,
}

impl EncoderEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EncoderEvent::Completed { .. } | EncoderEvent::Failed { .. } | EncoderEvent::Abandoned
        )
    }
}

/// How an encode ended.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeOutcome {
    Completed(PathBuf),
    Failed(String),
    Abandoned,
}

/// Sender side of an encode's event stream.
pub type EventSender = mpsc::UnboundedSender<EncoderEvent>;

#[async_trait]
pub trait Encoder: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Run one encode to completion.
    ///
    /// Implementations send only `Progress` and `Diagnostic` events; the
    /// terminal event is derived from the returned outcome. They must stop
    /// promptly once `cancel` fires.
    async fn encode(
        &self,
        request: EncodeRequest,
        events: EventSender,
        cancel: CancellationToken,
    ) -> EncodeOutcome;
}

/// A running encode.
#[derive(Debug)]
pub struct EncodeHandle {
    events: mpsc::UnboundedReceiver<EncoderEvent>,
    cancel: CancellationToken,
}

impl EncodeHandle {
    /// Next event. `None` after the terminal event, or when the encode
    /// task died without producing one.
    pub async fn next_event(&mut self) -> Option<EncoderEvent> {
        self.events.recv().await
    }

    /// Force-terminate the encode. The terminal event becomes `Abandoned`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Run `encoder` on a background task.
///
/// `cancel` is usually a child of a process-wide shutdown token.
pub fn spawn_encode(
    encoder: Arc<dyn Encoder>,
    request: EncodeRequest,
    cancel: CancellationToken,
) -> EncodeHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let token = cancel.clone();

    tokio::spawn(async move {
        let name = encoder.name().to_string();
        let encode = {
            let tx = tx.clone();
            let token = token.clone();
            tokio::spawn(async move { encoder.encode(request, tx, token).await })
        };
        let outcome = match encode.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(encoder = %name, "Encode task failed: {e}");
                return;
            }
        };
        let terminal = if token.is_cancelled() {
            EncoderEvent::Abandoned
        } else {
            match outcome {
                EncodeOutcome::Completed(output) => EncoderEvent::Completed { output },
                EncodeOutcome::Failed(message) => EncoderEvent::Failed { message },
                EncodeOutcome::Abandoned => EncoderEvent::Abandoned,
            }
        };
        let _ = tx.send(terminal);
    });

    EncodeHandle { events: rx, cancel }
}

// ---------------------------------------------------------------------------
// ffmpeg
// ---------------------------------------------------------------------------

/// Diagnostic lines kept for the failure message.
const STDERR_TAIL_LINES: usize = 20;

/// Upper bound for a single ffmpeg run; the job manager enforces its own,
/// usually tighter, wall-clock limit.
const FFMPEG_TIMEOUT: Duration = Duration::from_secs(86400);

/// Encodes with an ffmpeg binary.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg: PathBuf,
    options: EncoderOptions,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg: PathBuf, options: EncoderOptions) -> Self {
        Self { ffmpeg, options }
    }

    /// Build from a discovered registry. Fails if ffmpeg is unavailable.
    pub fn from_registry(tools: &ToolRegistry, options: EncoderOptions) -> rf_core::Result<Self> {
        let ffmpeg = tools.require("ffmpeg")?;
        Ok(Self::new(ffmpeg.path.clone(), options))
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn encode(
        &self,
        request: EncodeRequest,
        events: EventSender,
        cancel: CancellationToken,
    ) -> EncodeOutcome {
        let args = build_ffmpeg_args(&request, &self.options);
        tracing::info!(
            "ffmpeg encode: {:?} -> {:?} ({}x{} @ {} fps, {:.2}s)",
            request.input,
            request.output,
            request.params.width,
            request.params.height,
            request.params.fps,
            request.params.duration_seconds,
        );
        tracing::debug!("ffmpeg args: {}", args.join(" "));

        let mut cmd = ToolCommand::new(self.ffmpeg.clone());
        cmd.timeout(FFMPEG_TIMEOUT);
        cmd.args(args);

        let mut parser = ProgressParser::new(request.params.duration_seconds);
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

        let result = cmd
            .execute_with_stderr_callback(
                |line| match parser.feed(line) {
                    Some(ProgressLine::Progress(pct)) => {
                        let _ = events.send(EncoderEvent::Progress(pct));
                    }
                    Some(ProgressLine::Diagnostic(text)) => {
                        if tail.len() == STDERR_TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(text.clone());
                        let _ = events.send(EncoderEvent::Diagnostic(text));
                    }
                    None => {}
                },
                Some(cancel),
            )
            .await;

        match result {
            Ok(_) => match tokio::fs::metadata(&request.output).await {
                Ok(meta) if meta.len() > 0 => EncodeOutcome::Completed(request.output),
                _ => EncodeOutcome::Failed("ffmpeg exited cleanly but wrote no output".into()),
            },
            Err(rf_core::Error::Cancelled(_)) => EncodeOutcome::Abandoned,
            Err(rf_core::Error::Tool { message, .. }) => {
                let detail = Vec::from(tail).join("\n");
                if detail.is_empty() {
                    EncodeOutcome::Failed(message)
                } else {
                    EncodeOutcome::Failed(format!("{message}: {detail}"))
                }
            }
            Err(e) => EncodeOutcome::Failed(e.to_string()),
        }
    }
}

fn secs(value: f64) -> String {
    format!("{value:.3}")
}

fn even(value: u32) -> u32 {
    (value - value % 2).max(2)
}

/// Whether the output needs a scale filter.
pub fn needs_scaling(request: &EncodeRequest) -> bool {
    match request.input {
        EncodeInput::Placeholder { .. } => false,
        EncodeInput::File { .. } => {
            request.custom_resolution
                || (request.params.width, request.params.height) != request.native_size
        }
    }
}

/// Full ffmpeg argument list for a request, output path last.
pub fn build_ffmpeg_args(request: &EncodeRequest, options: &EncoderOptions) -> Vec<String> {
    let p = &request.params;
    let mut args: Vec<String> = Vec::new();
    let mut push = |items: &[&str]| args.extend(items.iter().map(|s| s.to_string()));

    push(&["-hide_banner", "-nostdin", "-y"]);
    push(&["-loglevel", "error", "-progress", "pipe:2", "-nostats"]);

    let has_audio = match &request.input {
        EncodeInput::File { path, start_secs } => {
            if *start_secs > 0.0 {
                push(&["-ss", &secs(*start_secs)]);
            }
            push(&["-t", &secs(p.duration_seconds)]);
            push(&["-i", &path.to_string_lossy()]);
            request.audio_codec != AudioCodec::None
        }
        EncodeInput::Placeholder { color } => {
            let source = format!(
                "color=c={color}:s={}x{}:r={}:d={}",
                even(p.width),
                even(p.height),
                p.fps,
                secs(p.duration_seconds)
            );
            push(&["-f", "lavfi", "-i", &source]);
            false
        }
    };

    push(&["-map", "0:v:0"]);
    if has_audio {
        push(&["-map", "0:a:0?"]);
    }

    push(&["-c:v", request.video_codec.encoder()]);
    if request.video_codec.takes_preset() {
        push(&["-preset", &options.video_preset]);
    }

    if request.video_codec != VideoCodec::Prores {
        match request.rate_control {
            RateControl::Crf { value } => {
                push(&["-crf", &value.to_string()]);
                if matches!(request.video_codec, VideoCodec::Vp9 | VideoCodec::Av1) {
                    push(&["-b:v", "0"]);
                }
            }
            RateControl::Bitrate { kbps } => push(&["-b:v", &format!("{kbps}k")]),
        }
    }

    push(&["-pix_fmt", &request.pixel_format]);
    push(&["-r", &p.fps.to_string()]);

    if needs_scaling(request) {
        push(&["-vf", &format!("scale={}:{}", even(p.width), even(p.height))]);
    }

    match request.audio_codec.encoder() {
        Some(encoder) if has_audio => {
            push(&["-c:a", encoder]);
            if request.audio_codec != AudioCodec::Pcm {
                push(&["-b:a", &options.audio_bitrate]);
            }
        }
        _ => push(&["-an"]),
    }

    if request.container.is_isobmff() {
        push(&["-movflags", "+faststart"]);
    }

    args.push(request.output.to_string_lossy().to_string());
    args
}

/// A parsed line of ffmpeg `-progress` output.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressLine {
    /// End of a progress block.
    Progress(Option<f64>),
    /// Anything that is not a `key=value` progress field.
    Diagnostic(String),
}

/// Incremental parser for ffmpeg `-progress pipe:2` output.
#[derive(Debug, Clone)]
pub struct ProgressParser {
    duration_secs: f64,
    out_time_us: Option<i64>,
}

impl ProgressParser {
    pub fn new(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            out_time_us: None,
        }
    }

    pub fn feed(&mut self, line: &str) -> Option<ProgressLine> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Some(ProgressLine::Diagnostic(line.to_string()));
        };
        if key.is_empty() || !key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            return Some(ProgressLine::Diagnostic(line.to_string()));
        }

        match key {
            "out_time_us" | "out_time_ms" => {
                // Both are microseconds in practice.
                self.out_time_us = value.trim().parse::<i64>().ok();
                None
            }
            "progress" => Some(ProgressLine::Progress(self.percent())),
            _ => None,
        }
    }

    fn percent(&self) -> Option<f64> {
        let out_us = self.out_time_us?;
        if !(self.duration_secs > 0.0) {
            return None;
        }
        let pct = out_us as f64 / 1_000_000.0 / self.duration_secs * 100.0;
        pct.is_finite().then(|| pct.clamp(0.0, 100.0))
    }
}
