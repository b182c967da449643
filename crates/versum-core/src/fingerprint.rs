//! Source fingerprinting
//!
//! Produces a content digest over every tracked source file of a firmware
//! project. The digest is SHA-1 over a `sha1sum`-style listing, so it matches
//! `find <roots> -type f -print0 | sort -z | xargs -0 sha1sum | sha1sum`.
//! Like `find` without `-L`, symbolic links are never followed or listed.

use crate::error::StampError;
use crate::Result;
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Roots fingerprinted when none are configured.
pub const DEFAULT_TRACKED_ROOTS: &[&str] = &["platformio.ini", "src", "lib", "include"];

/// Length of the fingerprint prefix used as a dev version.
pub const SHORT_LEN: usize = 8;

/// Content digest of the tracked source tree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceFingerprint(pub String);

impl std::fmt::Display for SourceFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SourceFingerprint {
    /// First 8 hex characters
    pub fn short(&self) -> &str {
        &self.0[..SHORT_LEN.min(self.0.len())]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Fingerprint the tracked roots of `project_dir`.
///
/// `tracked` and `excluded` are project-relative. Missing roots are skipped;
/// excluded paths (the generated header at least) never contribute to the
/// digest, and neither does anything below an excluded directory.
///
/// # TDD: test_modifying_header_does_not_change_fingerprint
pub fn compute_fingerprint(
    project_dir: &Path,
    tracked: &[PathBuf],
    excluded: &[PathBuf],
) -> Result<SourceFingerprint> {
    let excluded: Vec<PathBuf> = excluded.iter().map(|p| normalize(p)).collect();

    let mut files = Vec::new();
    for root in tracked {
        let root = normalize(root);
        let file_type = match std::fs::symlink_metadata(project_dir.join(&root)) {
            Ok(meta) => meta.file_type(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Tracked root {:?} does not exist, skipping", root);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if file_type.is_file() {
            files.push(root);
        } else if file_type.is_dir() {
            collect_files(project_dir, &root, &mut files)?;
        } else {
            debug!("Tracked root {:?} is not a regular file, skipping", root);
        }
    }

    files.retain(|f| !excluded.iter().any(|ex| f.starts_with(ex)));

    // Sort by the listed path so traversal order never leaks into the digest
    let mut listed: Vec<String> = files.iter().map(|f| listing_path(f)).collect();
    listed.sort();
    listed.dedup();

    if listed.is_empty() {
        return Err(StampError::EmptySourceSet(
            project_dir.display().to_string(),
        ));
    }

    let mut listing = Sha1::new();
    for path in &listed {
        let content = std::fs::read(project_dir.join(path.trim_start_matches("./")))?;
        let file_hash = hex::encode(Sha1::digest(&content));
        listing.update(format!("{}  {}\n", file_hash, path).as_bytes());
    }

    let fingerprint = SourceFingerprint(hex::encode(listing.finalize()));
    debug!(
        "Fingerprinted {} files: {}",
        listed.len(),
        fingerprint.short()
    );
    Ok(fingerprint)
}

/// Recursively collect regular files below `dir` (project-relative)
fn collect_files(project_dir: &Path, dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(project_dir.join(dir))? {
        let entry = entry?;
        let relative = dir.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            collect_files(project_dir, &relative, files)?;
        } else if file_type.is_file() {
            files.push(relative);
        }
    }

    Ok(())
}

/// Strip `./` prefixes so `./src/version.h` and `src/version.h` compare equal
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, std::path::Component::CurDir))
        .collect()
}

/// Path as `sha1sum` prints it when fed from `find ./src`
fn listing_path(relative: &Path) -> String {
    let joined = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    format!("./{}", joined)
}

/// Default tracked roots as owned paths
pub fn default_tracked_roots() -> Vec<PathBuf> {
    DEFAULT_TRACKED_ROOTS.iter().map(PathBuf::from).collect()
}
