//! Content-addressed upload store.
//!
//! Files are written under the media root as `<sha256>.<ext>`, where the
//! extension is inferred from the original upload name when it is one of
//! the known containers, or as a bare `<sha256>` otherwise. Those are
//! exactly the names [`MediaResolver`](crate::MediaResolver) looks for.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use rf_core::{Container, Error, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Result of an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UploadOutcome {
    /// New file written.
    Stored { hash: String, bytes: u64 },
    /// A file for this hash already existed; nothing was written.
    Cached { hash: String },
}

/// Hex-encoded SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn normalize_hash(claimed: &str) -> Result<String> {
    let hash = crate::resolver::canonical_hash(claimed);
    if hash.len() != 64 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::Validation(format!(
            "'{claimed}' is not a hex sha256 digest"
        )));
    }
    Ok(hash)
}

/// Container extension implied by an upload name, if any.
pub fn infer_extension(original_name: Option<&str>) -> Option<&'static str> {
    let ext = Path::new(original_name?).extension()?.to_str()?.to_ascii_lowercase();
    Container::ALL
        .iter()
        .map(Container::extension)
        .find(|known| *known == ext)
}

/// Writes uploads into the media root.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Existing non-empty file stored under `hash`, under any name the
    /// store could have written.
    pub fn find(&self, hash: &str) -> Option<PathBuf> {
        crate::MediaResolver::new(&self.root).resolve_media_path(hash, None, None)
    }

    /// Verify and store an upload.
    ///
    /// The claimed hash must match the SHA-256 of `data`, and `data` must
    /// not be empty. Re-uploading a hash that is already present is not an
    /// error.
    pub async fn store(
        &self,
        claimed_hash: &str,
        original_name: Option<&str>,
        data: Bytes,
    ) -> Result<UploadOutcome> {
        let hash = normalize_hash(claimed_hash)?;
        if data.is_empty() {
            return Err(Error::Validation("upload body is empty".into()));
        }

        let computed = {
            let data = data.clone();
            tokio::task::spawn_blocking(move || sha256_hex(&data))
                .await
                .map_err(|e| Error::Internal(format!("hash task failed: {e}")))?
        };
        if computed != hash {
            tracing::warn!(claimed = %hash, %computed, "Upload hash mismatch");
            return Err(Error::HashMismatch {
                claimed: hash,
                computed,
            });
        }

        if self.find(&hash).is_some() {
            tracing::debug!(%hash, "Upload already present");
            return Ok(UploadOutcome::Cached { hash });
        }

        let file_name = match infer_extension(original_name) {
            Some(ext) => format!("{hash}.{ext}"),
            None => hash.clone(),
        };
        let target = self.root.join(file_name);
        let root = self.root.clone();
        let len = data.len() as u64;

        tokio::task::spawn_blocking(move || write_atomically(&root, &target, &data))
            .await
            .map_err(|e| Error::Internal(format!("write task failed: {e}")))??;

        tracing::info!(%hash, bytes = len, "Stored upload");
        Ok(UploadOutcome::Stored { hash, bytes: len })
    }
}

/// Write to a temp file in the same directory, then rename into place, so
/// readers never observe a partially written file under the final name.
fn write_atomically(root: &Path, target: &Path, data: &[u8]) -> Result<()> {
    use std::io::Write;

    std::fs::create_dir_all(root)?;
    let mut tmp = tempfile::NamedTempFile::new_in(root)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| Error::from(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(s: &'static str) -> (String, Bytes) {
        (sha256_hex(s.as_bytes()), Bytes::from_static(s.as_bytes()))
    }

    #[test]
    fn known_digest() {
        assert_eq!(
            sha256_hex(b"test"),
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }

    #[test]
    fn extension_inference() {
        assert_eq!(infer_extension(Some("Clip.MP4")), Some("mp4"));
        assert_eq!(infer_extension(Some("a/b/c.webm")), Some("webm"));
        assert_eq!(infer_extension(Some("notes.txt")), None);
        assert_eq!(infer_extension(Some("noext")), None);
        assert_eq!(infer_extension(None), None);
    }

    #[tokio::test]
    async fn stores_with_inferred_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let (hash, data) = body("some video bytes");

        let outcome = store.store(&hash, Some("take1.mov"), data).await.unwrap();
        assert_eq!(
            outcome,
            UploadOutcome::Stored {
                hash: hash.clone(),
                bytes: 16
            }
        );
        assert!(dir.path().join(format!("{hash}.mov")).exists());
        assert_eq!(store.find(&hash), Some(dir.path().join(format!("{hash}.mov"))));
    }

    #[tokio::test]
    async fn unknown_extension_stores_bare_hash() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let (hash, data) = body("raw");

        store.store(&hash, Some("capture.avi"), data).await.unwrap();
        assert!(dir.path().join(&hash).exists());
    }

    #[tokio::test]
    async fn second_upload_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let (hash, data) = body("same bytes");

        store.store(&hash, Some("a.mp4"), data.clone()).await.unwrap();
        let again = store.store(&hash.to_uppercase(), Some("b.mkv"), data).await.unwrap();
        assert_eq!(again, UploadOutcome::Cached { hash: hash.clone() });
        assert!(!dir.path().join(format!("{hash}.mkv")).exists());
    }

    #[tokio::test]
    async fn uppercase_hash_upload_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let (hash, data) = body("video");
        let upper = hash.to_uppercase();

        store.store(&upper, Some("a.mp4"), data).await.unwrap();
        let resolved = crate::MediaResolver::new(dir.path()).resolve_media_path(
            &upper,
            None,
            Some(Container::Mp4),
        );
        assert_eq!(resolved, Some(dir.path().join(format!("{hash}.mp4"))));
    }

    #[tokio::test]
    async fn empty_body_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let hash = sha256_hex(b"");

        let err = store
            .store(&hash, Some("a.mp4"), Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn mismatch_is_rejected_and_nothing_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let (hash, _) = body("expected");

        let err = store
            .store(&hash, Some("a.mp4"), Bytes::from_static(b"tampered"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HashMismatch { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn malformed_hash_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let err = store
            .store("../../etc", None, Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(UploadOutcome::Cached { hash: "ab".into() }).unwrap();
        assert_eq!(json["status"], "cached");
    }
}
