//! rf-media: input media lookup and the content-addressed upload store.

pub mod resolver;
pub mod store;

pub use resolver::{
    canonical_hash, candidate_policy, check_timeline_shape, resolve_primary_source,
    sanitize_basename, Candidate, MediaResolver,
};
pub use store::{sha256_hex, MediaStore, UploadOutcome};
