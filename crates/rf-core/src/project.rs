//! Project timeline model supplied by clients.
//!
//! A [`Project`] is read-only input: a set of content-addressed
//! [`Source`]s, a [`Timeline`] of [`Clip`]s placed at a frame rate, and the
//! project's default output [`ProjectSettings`]. Frame positions are kept
//! as `f64` because clients send whatever their editor produced; consumers
//! must treat negative or non-finite values as absent.

use serde::{Deserialize, Serialize};

/// A stored input media asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Source {
    pub id: String,
    /// Content hash (hex sha256) the upload store keyed the file by.
    pub hash: String,
    pub original_name: Option<String>,
    /// Length of the source in timeline frames.
    pub duration_frames: Option<f64>,
}

/// A placement of a source sub-range on the timeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Clip {
    pub id: String,
    pub source_id: String,
    /// First source frame (inclusive).
    pub start_frame: f64,
    /// Last source frame (inclusive).
    pub end_frame: f64,
    /// Where the clip starts on the timeline.
    pub timeline_frame: f64,
}

impl Clip {
    /// Number of frames the clip covers, or `None` when the range is not
    /// usable (reversed, negative or non-finite).
    pub fn frame_span(&self) -> Option<f64> {
        if !self.start_frame.is_finite() || !self.end_frame.is_finite() {
            return None;
        }
        if self.start_frame < 0.0 || self.end_frame < self.start_frame {
            return None;
        }
        Some(self.end_frame - self.start_frame + 1.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Timeline {
    pub fps: Option<f64>,
    pub clips: Vec<Clip>,
}

/// Default output settings stored with the project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectSettings {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    pub sources: Vec<Source>,
    pub timeline: Timeline,
    pub settings: ProjectSettings,
}

impl Project {
    pub fn source(&self, id: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn clip(&self, id: &str) -> Option<&Clip> {
        self.timeline.clips.iter().find(|c| c.id == id)
    }

    /// Distinct source ids referenced by timeline clips, in first-use order.
    pub fn timeline_source_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for clip in &self.timeline.clips {
            if !ids.contains(&clip.source_id.as_str()) {
                ids.push(clip.source_id.as_str());
            }
        }
        ids
    }
}
