//! Render parameter derivation.
//!
//! Turns a [`Project`] plus [`RenderSettings`] into concrete
//! [`RenderParams`]. Everything here is pure and total: malformed numbers
//! fall back to defaults, so the result always has positive geometry,
//! frame rate and duration.
//!
//! Frame-count precedence, first match wins:
//!
//! 1. timeline selector with an explicit in/out range
//! 2. timeline selector without a range: union span of all clips
//! 3. clip selector: the clip's own span
//! 4. source selector: the source's stored duration
//! 5. one second of frames at the project rate

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::project::{Clip, Project};
use crate::settings::{FpsMode, RenderSettings, ResolutionMode, SelectorKind, SourceSelector};

pub const DEFAULT_WIDTH: u32 = 640;
pub const DEFAULT_HEIGHT: u32 = 360;
pub const DEFAULT_FPS: f64 = 24.0;
pub const MIN_DIMENSION: u32 = 16;
pub const MIN_DURATION_SECS: f64 = 0.1;

/// Concrete encode target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenderParams {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_seconds: f64,
}

/// Soft limits (scale down with a warning) and hard ceilings (reject).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderLimits {
    pub max_width: u32,
    pub max_height: u32,
    pub max_fps: f64,
    pub extreme_width: u32,
    pub extreme_height: u32,
    pub extreme_duration_secs: f64,
}

impl Default for RenderLimits {
    fn default() -> Self {
        crate::config::RenderConfig::default().limits()
    }
}

impl RenderLimits {
    /// Reject requests beyond the hard ceiling.
    ///
    /// Expects the *requested* parameters, before soft clamping.
    pub fn check_ceiling(&self, requested: &RenderParams) -> Result<()> {
        if requested.width > self.extreme_width || requested.height > self.extreme_height {
            return Err(Error::JobTooLarge(format!(
                "{}x{} exceeds the {}x{} ceiling",
                requested.width, requested.height, self.extreme_width, self.extreme_height
            )));
        }
        if requested.duration_seconds > self.extreme_duration_secs {
            return Err(Error::JobTooLarge(format!(
                "{:.1}s exceeds the {:.0}s ceiling",
                requested.duration_seconds, self.extreme_duration_secs
            )));
        }
        Ok(())
    }
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

fn non_negative(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

/// Timeline frame rate: timeline fps, else project settings fps, else 24.
pub fn project_fps(project: &Project) -> f64 {
    positive(project.timeline.fps)
        .or_else(|| positive(project.settings.fps))
        .unwrap_or(DEFAULT_FPS)
}

fn one_second_of_frames(project: &Project) -> f64 {
    project_fps(project).round().max(1.0)
}

/// An explicit in/out range on the selector.
///
/// `Some(None)` means a range was given but is unusable.
fn explicit_range(selector: &SourceSelector) -> Option<Option<(f64, f64)>> {
    match (selector.in_frame, selector.out_frame) {
        (Some(i), Some(o)) => match (non_negative(Some(i)), non_negative(Some(o))) {
            (Some(i), Some(o)) if o >= i => Some(Some((i, o))),
            _ => Some(None),
        },
        _ => None,
    }
}

fn valid_clips(project: &Project) -> impl Iterator<Item = &Clip> {
    project
        .timeline
        .clips
        .iter()
        .filter(|c| c.frame_span().is_some())
}

fn union_span(project: &Project) -> Option<(f64, f64)> {
    let start = valid_clips(project).map(|c| c.start_frame).reduce(f64::min)?;
    let end = valid_clips(project).map(|c| c.end_frame).reduce(f64::max)?;
    Some((start, end))
}

fn selected_frames(project: &Project, selector: &SourceSelector) -> Option<f64> {
    match selector.kind {
        SelectorKind::Timeline => match explicit_range(selector) {
            Some(Some((i, o))) => Some(o - i + 1.0),
            Some(None) => None,
            None => union_span(project).map(|(s, e)| e - s + 1.0),
        },
        SelectorKind::Clip => selector
            .clip_id
            .as_deref()
            .and_then(|id| project.clip(id))
            .and_then(Clip::frame_span),
        SelectorKind::Source => selector
            .source_id
            .as_deref()
            .and_then(|id| project.source(id))
            .and_then(|s| positive(s.duration_frames)),
    }
}

/// Number of frames a selector covers. Never less than one.
pub fn compute_duration_frames(project: &Project, selector: &SourceSelector) -> u64 {
    let frames = selected_frames(project, selector)
        .filter(|f| f.is_finite() && *f > 0.0)
        .unwrap_or_else(|| one_second_of_frames(project));
    (frames.round() as u64).max(1)
}

/// First source frame of the selected window, used as the seek offset.
pub fn compute_start_frame(project: &Project, selector: &SourceSelector) -> f64 {
    match selector.kind {
        SelectorKind::Timeline => match explicit_range(selector) {
            Some(Some((i, _))) => i,
            Some(None) => 0.0,
            None => union_span(project).map(|(s, _)| s).unwrap_or(0.0),
        },
        SelectorKind::Clip => selector
            .clip_id
            .as_deref()
            .and_then(|id| project.clip(id))
            .filter(|c| c.frame_span().is_some())
            .map(|c| c.start_frame)
            .unwrap_or(0.0),
        SelectorKind::Source => 0.0,
    }
}

/// The project's own output geometry, 640x360 when unset.
pub fn native_dimensions(project: &Project) -> (u32, u32) {
    match (project.settings.width, project.settings.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => (DEFAULT_WIDTH, DEFAULT_HEIGHT),
    }
}

fn scaled(dimension: u32, scale: f64) -> u32 {
    let value = (f64::from(dimension) * scale).round();
    (value.min(f64::from(u32::MAX)) as u32).max(MIN_DIMENSION)
}

/// Parameters as requested, before soft limits are applied.
pub fn requested_render_params(project: &Project, settings: &RenderSettings) -> RenderParams {
    let (mut width, mut height) = native_dimensions(project);
    if settings.resolution_mode == ResolutionMode::Custom {
        if let (Some(w), Some(h)) = (settings.width, settings.height) {
            if w > 0 && h > 0 {
                width = w;
                height = h;
            }
        }
    }

    let scale = positive(settings.resolution_scale).unwrap_or(1.0);
    let width = scaled(width, scale);
    let height = scaled(height, scale);

    let base_fps = project_fps(project);
    let fps = match settings.fps_mode {
        FpsMode::Override => positive(settings.fps).unwrap_or(base_fps),
        FpsMode::Project => base_fps,
    };

    let frames = compute_duration_frames(project, &settings.source);
    let duration_seconds = (frames as f64 / base_fps).max(MIN_DURATION_SECS);

    RenderParams {
        width,
        height,
        fps,
        duration_seconds,
    }
}

/// Derive the concrete render target, with soft limits applied.
///
/// Oversized geometry is scaled down proportionally to fit the soft
/// maximum; frame rate is capped at the soft maximum.
pub fn derive_render_params(
    project: &Project,
    settings: &RenderSettings,
    limits: &RenderLimits,
) -> RenderParams {
    let requested = requested_render_params(project, settings);
    apply_soft_limits(requested, limits)
}

fn apply_soft_limits(mut params: RenderParams, limits: &RenderLimits) -> RenderParams {
    let mut factor: f64 = 1.0;
    if limits.max_width > 0 && params.width > limits.max_width {
        factor = factor.min(f64::from(limits.max_width) / f64::from(params.width));
    }
    if limits.max_height > 0 && params.height > limits.max_height {
        factor = factor.min(f64::from(limits.max_height) / f64::from(params.height));
    }
    if factor < 1.0 {
        params.width = scaled(params.width, factor);
        params.height = scaled(params.height, factor);
        if limits.max_width > 0 {
            params.width = params.width.min(limits.max_width.max(MIN_DIMENSION));
        }
        if limits.max_height > 0 {
            params.height = params.height.min(limits.max_height.max(MIN_DIMENSION));
        }
    }

    if limits.max_fps.is_finite() && limits.max_fps > 0.0 {
        params.fps = params.fps.min(limits.max_fps);
    }
    if !params.fps.is_finite() || params.fps <= 0.0 {
        params.fps = DEFAULT_FPS;
    }

    params
}
