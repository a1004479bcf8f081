//! Per-job export settings.
//!
//! [`RenderSettings`] is what a client asks for: container, codecs,
//! geometry and frame-rate modes, rate control, and which part of the
//! project to export ([`SourceSelector`]). [`RenderSettings::validate`]
//! rejects malformed combinations at submission time.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Output wrapper format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    Mp4,
    Mov,
    Webm,
    Mkv,
}

impl Container {
    /// All containers, in the order used for fallback file lookup.
    pub const ALL: [Container; 4] = [Container::Mp4, Container::Mov, Container::Mkv, Container::Webm];

    pub fn extension(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Mov => "mov",
            Container::Webm => "webm",
            Container::Mkv => "mkv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Container::Mp4 => "video/mp4",
            Container::Mov => "video/quicktime",
            Container::Webm => "video/webm",
            Container::Mkv => "video/x-matroska",
        }
    }

    /// Whether the container takes `-movflags +faststart`.
    pub fn is_isobmff(&self) -> bool {
        matches!(self, Container::Mp4 | Container::Mov)
    }

    fn accepts_video(&self, codec: VideoCodec) -> bool {
        match self {
            Container::Mp4 => matches!(codec, VideoCodec::H264 | VideoCodec::H265 | VideoCodec::Av1),
            Container::Mov => matches!(codec, VideoCodec::H264 | VideoCodec::H265 | VideoCodec::Prores),
            Container::Webm => matches!(codec, VideoCodec::Vp9 | VideoCodec::Av1),
            Container::Mkv => true,
        }
    }

    fn accepts_audio(&self, codec: AudioCodec) -> bool {
        match self {
            Container::Mp4 => matches!(codec, AudioCodec::Aac | AudioCodec::Mp3),
            Container::Mov => matches!(codec, AudioCodec::Aac | AudioCodec::Pcm),
            Container::Webm => matches!(codec, AudioCodec::Opus),
            Container::Mkv => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    #[default]
    H264,
    H265,
    Vp9,
    Av1,
    Prores,
}

impl VideoCodec {
    /// ffmpeg encoder name.
    pub fn encoder(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::H265 => "libx265",
            VideoCodec::Vp9 => "libvpx-vp9",
            VideoCodec::Av1 => "libaom-av1",
            VideoCodec::Prores => "prores_ks",
        }
    }

    /// Whether the encoder understands `-preset`.
    pub fn takes_preset(&self) -> bool {
        matches!(self, VideoCodec::H264 | VideoCodec::H265)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    #[default]
    Aac,
    Opus,
    Mp3,
    Pcm,
    None,
}

impl AudioCodec {
    /// ffmpeg encoder name, `None` for a silent output.
    pub fn encoder(&self) -> Option<&'static str> {
        match self {
            AudioCodec::Aac => Some("aac"),
            AudioCodec::Opus => Some("libopus"),
            AudioCodec::Mp3 => Some("libmp3lame"),
            AudioCodec::Pcm => Some("pcm_s16le"),
            AudioCodec::None => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    /// Use the project's configured geometry.
    #[default]
    Project,
    /// Use the explicit `width`/`height` on the settings.
    Custom,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FpsMode {
    #[default]
    Project,
    Override,
}

/// Video rate control.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RateControl {
    Crf { value: u8 },
    Bitrate { kbps: u32 },
}

impl Default for RateControl {
    fn default() -> Self {
        RateControl::Crf { value: 23 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    /// The whole timeline, optionally narrowed by an in/out frame range.
    #[default]
    Timeline,
    Clip,
    Source,
}

/// Which part of the project a job exports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceSelector {
    pub kind: SelectorKind,
    pub clip_id: Option<String>,
    pub source_id: Option<String>,
    pub in_frame: Option<f64>,
    pub out_frame: Option<f64>,
}

impl SourceSelector {
    pub fn timeline() -> Self {
        Self::default()
    }

    pub fn clip(id: impl Into<String>) -> Self {
        Self {
            kind: SelectorKind::Clip,
            clip_id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn source(id: impl Into<String>) -> Self {
        Self {
            kind: SelectorKind::Source,
            source_id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn with_range(mut self, in_frame: f64, out_frame: f64) -> Self {
        self.in_frame = Some(in_frame);
        self.out_frame = Some(out_frame);
        self
    }
}

/// Pixel formats the encoder adapter passes through.
const PIXEL_FORMATS: &[&str] = &[
    "yuv420p",
    "yuv422p",
    "yuv444p",
    "yuv420p10le",
    "yuv422p10le",
    "yuv444p10le",
];

pub const DEFAULT_PIXEL_FORMAT: &str = "yuv420p";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderSettings {
    pub container: Container,
    pub video_codec: VideoCodec,
    pub audio_codec: AudioCodec,
    pub resolution_mode: ResolutionMode,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Multiplier applied after the base geometry is chosen. Defaults to 1.
    pub resolution_scale: Option<f64>,
    pub fps_mode: FpsMode,
    pub fps: Option<f64>,
    pub pixel_format: Option<String>,
    pub rate_control: RateControl,
    pub source: SourceSelector,
    pub include_audio: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            container: Container::default(),
            video_codec: VideoCodec::default(),
            audio_codec: AudioCodec::default(),
            resolution_mode: ResolutionMode::default(),
            width: None,
            height: None,
            resolution_scale: None,
            fps_mode: FpsMode::default(),
            fps: None,
            pixel_format: None,
            rate_control: RateControl::default(),
            source: SourceSelector::default(),
            include_audio: true,
        }
    }
}

impl RenderSettings {
    pub fn pixel_format(&self) -> &str {
        self.pixel_format.as_deref().unwrap_or(DEFAULT_PIXEL_FORMAT)
    }

    /// Audio codec actually written, accounting for `include_audio`.
    pub fn effective_audio_codec(&self) -> AudioCodec {
        if self.include_audio {
            self.audio_codec
        } else {
            AudioCodec::None
        }
    }

    /// Reject malformed submissions before a job is created.
    pub fn validate(&self) -> Result<()> {
        if !self.container.accepts_video(self.video_codec) {
            return Err(Error::Validation(format!(
                "video codec {:?} cannot be written to {}",
                self.video_codec,
                self.container.extension()
            )));
        }

        let audio = self.effective_audio_codec();
        if audio != AudioCodec::None && !self.container.accepts_audio(audio) {
            return Err(Error::Validation(format!(
                "audio codec {:?} cannot be written to {}",
                audio,
                self.container.extension()
            )));
        }

        if self.resolution_mode == ResolutionMode::Custom {
            match (self.width, self.height) {
                (Some(w), Some(h)) if w > 0 && h > 0 => {}
                _ => {
                    return Err(Error::Validation(
                        "custom resolution requires positive width and height".into(),
                    ))
                }
            }
        }

        if let Some(scale) = self.resolution_scale {
            if !scale.is_finite() || scale <= 0.0 {
                return Err(Error::Validation(format!(
                    "resolutionScale must be a positive number, got {scale}"
                )));
            }
        }

        if self.fps_mode == FpsMode::Override && self.fps.is_none() {
            return Err(Error::Validation("fps override requires an fps value".into()));
        }

        if !PIXEL_FORMATS.contains(&self.pixel_format()) {
            return Err(Error::Validation(format!(
                "unsupported pixel format '{}'",
                self.pixel_format()
            )));
        }

        match self.rate_control {
            RateControl::Crf { value } if value > 63 => {
                return Err(Error::Validation(format!("crf {value} is out of range 0..=63")));
            }
            RateControl::Bitrate { kbps: 0 } => {
                return Err(Error::Validation("bitrate must be greater than zero".into()));
            }
            _ => {}
        }

        match self.source.kind {
            SelectorKind::Clip if self.source.clip_id.is_none() => {
                Err(Error::Validation("clip selector requires clipId".into()))
            }
            SelectorKind::Source if self.source.source_id.is_none() => {
                Err(Error::Validation("source selector requires sourceId".into()))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let settings = RenderSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.pixel_format(), "yuv420p");
        assert!(settings.include_audio);
    }

    #[test]
    fn content_types() {
        assert_eq!(Container::Mp4.content_type(), "video/mp4");
        assert_eq!(Container::Mov.content_type(), "video/quicktime");
        assert_eq!(Container::Webm.content_type(), "video/webm");
        assert_eq!(Container::Mkv.content_type(), "video/x-matroska");
    }

    #[test]
    fn webm_rejects_h264() {
        let settings = RenderSettings {
            container: Container::Webm,
            audio_codec: AudioCodec::Opus,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let ok = RenderSettings {
            video_codec: VideoCodec::Vp9,
            ..settings
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn incompatible_audio_is_ignored_when_audio_excluded() {
        let settings = RenderSettings {
            audio_codec: AudioCodec::Opus,
            include_audio: false,
            ..Default::default()
        };
        assert!(settings.validate().is_ok());
        assert_eq!(settings.effective_audio_codec(), AudioCodec::None);
    }

    #[test]
    fn custom_resolution_needs_dimensions() {
        let settings = RenderSettings {
            resolution_mode: ResolutionMode::Custom,
            width: Some(1280),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn override_fps_needs_value() {
        let settings = RenderSettings {
            fps_mode: FpsMode::Override,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn crf_out_of_range() {
        let settings = RenderSettings {
            rate_control: RateControl::Crf { value: 70 },
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn selector_requires_ids() {
        let settings = RenderSettings {
            source: SourceSelector {
                kind: SelectorKind::Clip,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn parses_client_json() {
        let json = r#"{
            "container": "mov",
            "videoCodec": "prores",
            "audioCodec": "pcm",
            "resolutionMode": "custom",
            "width": 1920,
            "height": 1080,
            "fpsMode": "override",
            "fps": 30,
            "rateControl": {"mode": "bitrate", "kbps": 8000},
            "source": {"kind": "clip", "clipId": "c1"},
            "includeAudio": false
        }"#;
        let settings: RenderSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.container, Container::Mov);
        assert_eq!(settings.rate_control, RateControl::Bitrate { kbps: 8000 });
        assert_eq!(settings.source.clip_id.as_deref(), Some("c1"));
        assert!(settings.validate().is_ok());
    }
}
