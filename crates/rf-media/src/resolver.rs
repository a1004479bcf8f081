//! Input media resolution.
//!
//! The upload store names files after their content hash. Lookup order is
//! shared with it and must stay stable:
//!
//! 1. `<hash>.<preferred container>`
//! 2. `<hash>.<ext>` for mp4, mov, mkv, webm
//! 3. `<hash>` with no extension
//! 4. the sanitized basename of the original upload name
//!
//! The first candidate that exists with a non-zero size wins. A zero-byte
//! file is an upload still being finalized and is skipped.

use std::path::{Path, PathBuf};

use rf_core::{Container, Project, SelectorKind, Source, SourceSelector};
use rf_core::{Error, Result};

/// Extensions tried after the preferred container, in order.
pub const FALLBACK_CONTAINERS: [Container; 4] = Container::ALL;

/// One entry of the lookup policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// `<hash>.<ext>` for the container the job is exporting to.
    PreferredContainer(Container),
    /// `<hash>.<ext>` from [`FALLBACK_CONTAINERS`].
    Fallback(Container),
    /// `<hash>`.
    BareHash,
    /// Sanitized original filename.
    OriginalName(String),
}

impl Candidate {
    fn file_name(&self, hash: &str) -> String {
        match self {
            Candidate::PreferredContainer(c) | Candidate::Fallback(c) => {
                format!("{hash}.{}", c.extension())
            }
            Candidate::BareHash => hash.to_string(),
            Candidate::OriginalName(name) => name.clone(),
        }
    }
}

/// Build the ordered candidate list for a source.
///
/// Hash-based entries are omitted when the hash is not a plain hex/alnum
/// token, and the preferred container is not repeated among the fallbacks.
pub fn candidate_policy(
    hash: &str,
    original_name: Option<&str>,
    preferred: Option<Container>,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    if is_safe_hash(hash) {
        if let Some(container) = preferred {
            candidates.push(Candidate::PreferredContainer(container));
        }
        for container in FALLBACK_CONTAINERS {
            if Some(container) != preferred {
                candidates.push(Candidate::Fallback(container));
            }
        }
        candidates.push(Candidate::BareHash);
    }

    if let Some(name) = original_name.and_then(sanitize_basename) {
        candidates.push(Candidate::OriginalName(name));
    }

    candidates
}

/// Hash as it appears in stored file names.
pub fn canonical_hash(hash: &str) -> String {
    hash.trim().to_ascii_lowercase()
}

/// Whether a claimed hash is safe to use as a file name.
pub fn is_safe_hash(hash: &str) -> bool {
    !hash.is_empty() && hash.len() <= 128 && hash.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Reduce a client-supplied filename to a safe basename.
///
/// Directory components (either separator style) are dropped and only
/// `[A-Za-z0-9._-]` survive. Leading dots are removed so the result can
/// never be `..` or a hidden file. Returns `None` if nothing is left.
pub fn sanitize_basename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

fn is_usable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// Locates input files under the media root.
#[derive(Debug, Clone)]
pub struct MediaResolver {
    root: PathBuf,
}

impl MediaResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Candidate paths in lookup order.
    ///
    /// Hash-based names use the lowercase form the upload store writes.
    pub fn candidates(
        &self,
        hash: &str,
        original_name: Option<&str>,
        preferred: Option<Container>,
    ) -> Vec<PathBuf> {
        let hash = canonical_hash(hash);
        candidate_policy(&hash, original_name, preferred)
            .iter()
            .map(|c| self.root.join(c.file_name(&hash)))
            .collect()
    }

    /// First existing, non-empty candidate. Never errors.
    pub fn resolve_media_path(
        &self,
        hash: &str,
        original_name: Option<&str>,
        preferred: Option<Container>,
    ) -> Option<PathBuf> {
        self.candidates(hash, original_name, preferred)
            .into_iter()
            .find(|p| is_usable(p))
    }

    /// Resolve the input file for a project source.
    pub fn resolve_source(&self, source: &Source, preferred: Option<Container>) -> Option<PathBuf> {
        self.resolve_media_path(&source.hash, source.original_name.as_deref(), preferred)
    }
}

/// Reject whole-timeline exports that span more than one source.
///
/// Clip and source selectors always pass.
pub fn check_timeline_shape(project: &Project, selector: &SourceSelector) -> Result<()> {
    if selector.kind != SelectorKind::Timeline {
        return Ok(());
    }
    let ids = project.timeline_source_ids();
    if ids.len() > 1 {
        return Err(Error::UnsupportedTimeline(format!(
            "timeline references {} sources ({}); only single-source timelines can be exported",
            ids.len(),
            ids.join(", ")
        )));
    }
    Ok(())
}

/// The single source a selector exports from.
///
/// A timeline selector resolves only when every clip shares one source;
/// an empty or multi-source timeline yields `None`.
pub fn resolve_primary_source<'a>(
    project: &'a Project,
    selector: &SourceSelector,
) -> Option<&'a Source> {
    match selector.kind {
        SelectorKind::Source => project.source(selector.source_id.as_deref()?),
        SelectorKind::Clip => {
            let clip = project.clip(selector.clip_id.as_deref()?)?;
            project.source(&clip.source_id)
        }
        SelectorKind::Timeline => match project.timeline_source_ids().as_slice() {
            [only] => project.source(only),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_core::{Clip, Timeline};

    const HASH: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    fn touch(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn policy_order() {
        let policy = candidate_policy(HASH, Some("clip.mov"), Some(Container::Webm));
        assert_eq!(
            policy,
            vec![
                Candidate::PreferredContainer(Container::Webm),
                Candidate::Fallback(Container::Mp4),
                Candidate::Fallback(Container::Mov),
                Candidate::Fallback(Container::Mkv),
                Candidate::BareHash,
                Candidate::OriginalName("clip.mov".into()),
            ]
        );
    }

    #[test]
    fn preferred_container_wins() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &format!("{HASH}.mov"), b"mov");
        let mp4 = touch(dir.path(), &format!("{HASH}.mp4"), b"mp4");
        let resolver = MediaResolver::new(dir.path());

        assert_eq!(
            resolver.resolve_media_path(HASH, None, Some(Container::Mp4)),
            Some(mp4)
        );
    }

    #[test]
    fn falls_back_in_fixed_order() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &format!("{HASH}.webm"), b"webm");
        let mkv = touch(dir.path(), &format!("{HASH}.mkv"), b"mkv");
        let resolver = MediaResolver::new(dir.path());

        assert_eq!(
            resolver.resolve_media_path(HASH, None, Some(Container::Mp4)),
            Some(mkv)
        );
    }

    #[test]
    fn bare_hash_then_original_name() {
        let dir = tempfile::tempdir().unwrap();
        let named = touch(dir.path(), "holiday.mp4", b"x");
        let resolver = MediaResolver::new(dir.path());
        assert_eq!(
            resolver.resolve_media_path(HASH, Some("holiday.mp4"), None),
            Some(named)
        );

        let bare = touch(dir.path(), HASH, b"x");
        assert_eq!(
            resolver.resolve_media_path(HASH, Some("holiday.mp4"), None),
            Some(bare)
        );
    }

    #[test]
    fn skips_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &format!("{HASH}.mp4"), b"");
        let mov = touch(dir.path(), &format!("{HASH}.mov"), b"data");
        let resolver = MediaResolver::new(dir.path());
        assert_eq!(
            resolver.resolve_media_path(HASH, None, Some(Container::Mp4)),
            Some(mov)
        );
    }

    #[test]
    fn uppercase_hash_finds_lowercase_file() {
        let dir = tempfile::tempdir().unwrap();
        let mp4 = touch(dir.path(), &format!("{HASH}.mp4"), b"mp4");
        let resolver = MediaResolver::new(dir.path());
        assert_eq!(
            resolver.resolve_media_path(&HASH.to_uppercase(), None, Some(Container::Mp4)),
            Some(mp4)
        );
    }

    #[test]
    fn missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = MediaResolver::new(dir.path());
        assert!(resolver.resolve_media_path(HASH, Some("a.mp4"), None).is_none());
    }

    #[test]
    fn original_name_cannot_escape_root() {
        assert_eq!(sanitize_basename("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_basename("C:\\videos\\my clip.mp4").as_deref(), Some("myclip.mp4"));
        assert_eq!(sanitize_basename(".."), None);
        assert_eq!(sanitize_basename("..hidden").as_deref(), Some("hidden"));
        assert_eq!(sanitize_basename("///"), None);
    }

    #[test]
    fn unsafe_hash_contributes_no_candidates() {
        let policy = candidate_policy("../x", Some("ok.mp4"), Some(Container::Mp4));
        assert_eq!(policy, vec![Candidate::OriginalName("ok.mp4".into())]);
    }

    fn project(clips: Vec<(&str, &str)>) -> Project {
        Project {
            sources: vec![
                Source {
                    id: "s1".into(),
                    hash: "aa".into(),
                    ..Default::default()
                },
                Source {
                    id: "s2".into(),
                    hash: "bb".into(),
                    ..Default::default()
                },
            ],
            timeline: Timeline {
                fps: Some(24.0),
                clips: clips
                    .into_iter()
                    .map(|(id, src)| Clip {
                        id: id.into(),
                        source_id: src.into(),
                        end_frame: 10.0,
                        ..Default::default()
                    })
                    .collect(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn primary_source_by_kind() {
        let p = project(vec![("c1", "s1"), ("c2", "s2")]);
        assert_eq!(
            resolve_primary_source(&p, &SourceSelector::source("s2")).map(|s| s.id.as_str()),
            Some("s2")
        );
        assert_eq!(
            resolve_primary_source(&p, &SourceSelector::clip("c1")).map(|s| s.id.as_str()),
            Some("s1")
        );
        assert!(resolve_primary_source(&p, &SourceSelector::clip("zz")).is_none());
        assert!(resolve_primary_source(&p, &SourceSelector::source("zz")).is_none());
    }

    #[test]
    fn timeline_needs_exactly_one_source() {
        let single = project(vec![("c1", "s1"), ("c2", "s1")]);
        assert_eq!(
            resolve_primary_source(&single, &SourceSelector::timeline()).map(|s| s.id.as_str()),
            Some("s1")
        );
        assert!(check_timeline_shape(&single, &SourceSelector::timeline()).is_ok());

        let multi = project(vec![("c1", "s1"), ("c2", "s2")]);
        assert!(resolve_primary_source(&multi, &SourceSelector::timeline()).is_none());
        assert!(matches!(
            check_timeline_shape(&multi, &SourceSelector::timeline()),
            Err(Error::UnsupportedTimeline(_))
        ));
        assert!(check_timeline_shape(&multi, &SourceSelector::clip("c2")).is_ok());

        let empty = project(vec![]);
        assert!(resolve_primary_source(&empty, &SourceSelector::timeline()).is_none());
    }
}
