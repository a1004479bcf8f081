//! Export submission payload.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::project::Project;
use crate::settings::RenderSettings;

/// What a client submits to start an export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    #[serde(default)]
    pub project: Project,
    #[serde(default)]
    pub settings: RenderSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_version: Option<String>,
}

impl ExportRequest {
    pub fn new(project: Project, settings: RenderSettings) -> Self {
        Self {
            project,
            settings,
            client_version: None,
        }
    }

    /// Submission-time checks. Project contents are validated lazily when
    /// the job starts, so only the settings are inspected here.
    pub fn validate(&self) -> Result<()> {
        self.settings.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Container;

    #[test]
    fn parses_minimal_submission() {
        let req: ExportRequest = serde_json::from_str(r#"{"project": {}, "settings": {}}"#).unwrap();
        assert_eq!(req.settings.container, Container::Mp4);
        assert!(req.client_version.is_none());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn carries_client_version() {
        let req: ExportRequest =
            serde_json::from_str(r#"{"clientVersion": "2.4.1", "settings": {"container": "webm", "videoCodec": "vp9", "audioCodec": "opus"}}"#)
                .unwrap();
        assert_eq!(req.client_version.as_deref(), Some("2.4.1"));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn rejects_bad_settings() {
        let req: ExportRequest =
            serde_json::from_str(r#"{"settings": {"container": "webm"}}"#).unwrap();
        assert!(req.validate().is_err());
    }
}
