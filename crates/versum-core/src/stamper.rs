//! Pre-build stamping
//!
//! Fingerprint the sources, decide whether the version header must be
//! regenerated, negotiate release versions with the release server, and
//! write the header followed by the cache.

use crate::cache::{read_cached, write_atomic, write_cached, CACHE_FILE};
use crate::error::StampError;
use crate::fingerprint::{compute_fingerprint, default_tracked_roots, SourceFingerprint};
use crate::header::{render_header, HeaderFormat, DEFAULT_HEADER};
use crate::identity::{
    build_time_hex, derive_version, BuildIdentity, BuildMode, VersionScheme,
    DEFAULT_FIRMWARE_TYPE,
};
use crate::release::{ReleaseServer, ReleaseTarget};
use crate::Result;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Inputs of a stamping run
#[derive(Debug, Clone)]
pub struct StampConfig {
    /// Project root; every other path is relative to it
    pub project_dir: PathBuf,
    pub header: PathBuf,
    pub cache: PathBuf,
    pub tracked: Vec<PathBuf>,
    /// Extra paths kept out of the fingerprint (the header always is)
    pub excluded: Vec<PathBuf>,
    pub chip: String,
    pub firmware_type: String,
    pub mode: BuildMode,
    pub scheme: VersionScheme,
    pub release_version: Option<String>,
    /// Emit `BUILD_TIME` into the header
    pub with_build_time: bool,
}

impl StampConfig {
    pub fn new(project_dir: impl Into<PathBuf>, chip: &str) -> Self {
        StampConfig {
            project_dir: project_dir.into(),
            header: PathBuf::from(DEFAULT_HEADER),
            cache: PathBuf::from(CACHE_FILE),
            tracked: default_tracked_roots(),
            excluded: Vec::new(),
            chip: chip.to_string(),
            firmware_type: DEFAULT_FIRMWARE_TYPE.to_string(),
            mode: BuildMode::Dev,
            scheme: VersionScheme::Fingerprint,
            release_version: None,
            with_build_time: true,
        }
    }

    pub fn with_mode(mut self, mode: BuildMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_release_version(mut self, version: &str) -> Self {
        self.release_version = Some(version.to_string());
        self
    }

    pub fn with_header(mut self, header: impl Into<PathBuf>) -> Self {
        self.header = header.into();
        self
    }

    pub fn header_path(&self) -> PathBuf {
        self.project_dir.join(&self.header)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.project_dir.join(&self.cache)
    }

    pub fn target(&self) -> ReleaseTarget {
        ReleaseTarget::new(&self.chip, &self.firmware_type)
    }

    /// Fingerprint the tracked sources, header excluded
    pub fn fingerprint(&self) -> Result<SourceFingerprint> {
        let excluded = self
            .excluded
            .iter()
            .chain(std::iter::once(&self.header))
            .map(|p| self.project_relative(p))
            .collect::<Result<Vec<_>>>()?;
        compute_fingerprint(&self.project_dir, &self.tracked, &excluded)
    }

    /// Express `path` relative to the project; absolute paths must lie inside it
    fn project_relative(&self, path: &Path) -> Result<PathBuf> {
        if path.is_relative() {
            return Ok(path.to_path_buf());
        }
        if let Ok(relative) = path.strip_prefix(&self.project_dir) {
            return Ok(relative.to_path_buf());
        }

        // Compare canonical forms so symlinked temp dirs or `..` still match.
        // The file itself may not exist yet, so resolve its parent.
        let outside = || StampError::OutsideProject(path.display().to_string());
        let project = self.project_dir.canonicalize()?;
        let (parent, name) = match (path.parent(), path.file_name()) {
            (Some(parent), Some(name)) => (parent, name),
            _ => return Err(outside()),
        };
        let parent = parent.canonicalize().map_err(|_| outside())?;
        parent
            .join(name)
            .strip_prefix(&project)
            .map(Path::to_path_buf)
            .map_err(|_| outside())
    }
}

/// What a stamping run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StampOutcome {
    /// Fingerprint matched the cache; nothing was written
    Unchanged { fingerprint: SourceFingerprint },
    /// Header and cache were rewritten
    Regenerated {
        identity: BuildIdentity,
        fingerprint: SourceFingerprint,
    },
    /// The release server already has this version; nothing was written
    AlreadyReleased { version: String },
}

/// Stamp the project using the current time.
pub async fn stamp(
    config: &StampConfig,
    server: Option<&dyn ReleaseServer>,
) -> Result<StampOutcome> {
    stamp_at(config, server, Utc::now()).await
}

/// Stamp the project as if it were `now`.
///
/// # TDD: test_release_matching_remote_writes_nothing
pub async fn stamp_at(
    config: &StampConfig,
    server: Option<&dyn ReleaseServer>,
    now: DateTime<Utc>,
) -> Result<StampOutcome> {
    let header_path = config.header_path();
    let cache_path = config.cache_path();
    let format = HeaderFormat::from_path(&header_path)?;

    let fingerprint = config.fingerprint()?;
    info!(
        "Source fingerprint {} ({} build)",
        fingerprint.short(),
        config.mode
    );

    if config.mode.is_release() {
        debug!("Release build, bypassing fingerprint cache");
    } else if is_cache_current(&cache_path, &header_path, &fingerprint)? {
        info!("Sources unchanged, keeping {:?}", config.header);
        return Ok(StampOutcome::Unchanged { fingerprint });
    }

    let version = derive_version(
        config.mode,
        config.scheme,
        &fingerprint,
        config.release_version.as_deref(),
        now,
    )?;

    if config.mode.is_release() {
        if let Some(server) = server {
            let latest = server.latest_version(&config.target()).await?;
            if latest.as_deref() == Some(version.as_str()) {
                info!("Version {} is already released, nothing to do", version);
                return Ok(StampOutcome::AlreadyReleased { version });
            }
            debug!("Remote latest is {:?}, releasing {}", latest, version);
        }
    }

    let identity = BuildIdentity {
        version,
        build_time: config.with_build_time.then(|| build_time_hex(now)),
        firmware_type: config.firmware_type.clone(),
        chip: config.chip.clone(),
    };

    // Header before cache: a crash in between only costs one extra regeneration
    write_atomic(&header_path, render_header(&identity, format).as_bytes())?;
    write_cached(&cache_path, &fingerprint)?;

    info!(
        "Stamped {} {} {} into {:?}",
        identity.chip, identity.firmware_type, identity.version, config.header
    );
    Ok(StampOutcome::Regenerated {
        identity,
        fingerprint,
    })
}

fn is_cache_current(
    cache_path: &Path,
    header_path: &Path,
    fingerprint: &SourceFingerprint,
) -> Result<bool> {
    match read_cached(cache_path)? {
        Some(cached) if cached == fingerprint.as_str() => {
            if header_path.exists() {
                Ok(true)
            } else {
                warn!("Fingerprint cached but {:?} is missing, regenerating", header_path);
                Ok(false)
            }
        }
        Some(_) => {
            debug!("Cached fingerprint is stale");
            Ok(false)
        }
        None => {
            info!("{:?} doesn't exist, regenerating", cache_path);
            Ok(false)
        }
    }
}
