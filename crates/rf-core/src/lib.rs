//! rf-core: shared types, IDs, errors, configuration, and render parameter
//! derivation.
//!
//! This crate is the foundational dependency for all other rf-* crates,
//! providing the job identifier, the unified error type and failure
//! taxonomy, the client-supplied project and settings model, application
//! configuration, and the pure [`params`] deriver.

pub mod config;
pub mod error;
pub mod ids;
pub mod params;
pub mod project;
pub mod request;
pub mod settings;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, ErrorCode, Result};
pub use ids::JobId;
pub use params::{RenderLimits, RenderParams};
pub use project::{Clip, Project, ProjectSettings, Source, Timeline};
pub use request::ExportRequest;
pub use settings::*;
