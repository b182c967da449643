//! Post-build artifact handling
//!
//! Names the compiled firmware after its [`BuildIdentity`] and either copies
//! it into a local output directory or uploads it to the release server.

use crate::identity::{BuildIdentity, BuildMode};
use crate::release::{ReleaseServer, ReleaseServerConfig, ReleaseTarget};
use crate::Result;
use flate2::{write::GzEncoder, Compression};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Extension of firmware images
pub const BIN_EXT: &str = "bin";

/// `<chip>.<type>.<version>[.<build_time>].bin`
///
/// # TDD: test_artifact_file_name_template
pub fn artifact_file_name(identity: &BuildIdentity, with_build_time: bool) -> String {
    let mut parts = vec![
        identity.chip.as_str(),
        identity.firmware_type.as_str(),
        identity.version.as_str(),
    ];
    if with_build_time {
        if let Some(build_time) = identity.build_time.as_deref() {
            parts.push(build_time);
        }
    }
    parts.push(BIN_EXT);
    parts.join(".")
}

/// How the artifact leaves the build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Upload,
    Local,
}

/// Upload only when a server and an upload credential are both configured
pub fn plan_delivery(server: Option<&ReleaseServerConfig>) -> Delivery {
    match server {
        Some(config) if config.token.as_deref().is_some_and(|t| !t.is_empty()) => {
            Delivery::Upload
        }
        _ => Delivery::Local,
    }
}

/// Inputs of the post-build step
#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// The compiled firmware image
    pub binary: PathBuf,
    pub out_dir: PathBuf,
    pub with_build_time: bool,
    pub compress: bool,
    /// Remove older artifacts of the same chip and type first
    pub prune: bool,
    pub mode: BuildMode,
}

impl PublishConfig {
    pub fn new(binary: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        PublishConfig {
            binary: binary.into(),
            out_dir: out_dir.into(),
            with_build_time: false,
            compress: false,
            prune: false,
            mode: BuildMode::Dev,
        }
    }
}

/// What the post-build step produced
#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub file_name: String,
    /// SHA-256 of the uncompressed firmware image
    pub sha256: String,
    /// Local paths or remote URLs written
    pub destinations: Vec<String>,
    pub pruned: Vec<PathBuf>,
    pub published_latest: bool,
}

/// Deliver the built binary.
///
/// With an `uploader` the image goes to the release server, otherwise it is
/// copied into `out_dir`.
pub async fn publish(
    config: &PublishConfig,
    identity: &BuildIdentity,
    uploader: Option<&dyn ReleaseServer>,
) -> Result<PublishReport> {
    let file_name = artifact_file_name(identity, config.with_build_time);
    let data = std::fs::read(&config.binary)?;
    let sha256 = hex::encode(Sha256::digest(&data));
    debug!("{} sha256 {}", file_name, sha256);

    let mut report = PublishReport {
        file_name,
        sha256,
        destinations: Vec::new(),
        pruned: Vec::new(),
        published_latest: false,
    };

    match uploader {
        Some(server) => upload(config, identity, server, data, &mut report).await?,
        None => {
            if config.mode.is_release() {
                warn!("No upload credential set, copying {} locally", report.file_name);
            }
            copy_local(config, identity, &mut report)?;
        }
    }

    Ok(report)
}

async fn upload(
    config: &PublishConfig,
    identity: &BuildIdentity,
    server: &dyn ReleaseServer,
    data: Vec<u8>,
    report: &mut PublishReport,
) -> Result<()> {
    let target = ReleaseTarget::new(&identity.chip, &identity.firmware_type);

    let (name, body) = if config.compress {
        (format!("{}.gz", report.file_name), gzip_bytes(&data)?)
    } else {
        (report.file_name.clone(), data)
    };

    let url = server
        .upload_artifact(&target, &identity.version, &name, body)
        .await?;
    report.destinations.push(url);

    if config.mode.publishes_latest() {
        server.publish_latest(&target, &identity.version).await?;
        report.published_latest = true;
    }
    Ok(())
}

fn copy_local(
    config: &PublishConfig,
    identity: &BuildIdentity,
    report: &mut PublishReport,
) -> Result<()> {
    std::fs::create_dir_all(&config.out_dir)?;

    if config.prune {
        report.pruned = prune_stale(&config.out_dir, identity, &report.file_name)?;
    }

    let dest = config.out_dir.join(&report.file_name);
    std::fs::copy(&config.binary, &dest)?;
    info!("Copied firmware to {:?}", dest);
    report.destinations.push(dest.display().to_string());

    if config.compress {
        let gz = config.out_dir.join(format!("{}.gz", report.file_name));
        gzip_file(&config.binary, &gz)?;
        info!("Compressed firmware to {:?}", gz);
        report.destinations.push(gz.display().to_string());
    }
    Ok(())
}

/// Remove artifacts of the same chip and type other than `keep`
fn prune_stale(out_dir: &Path, identity: &BuildIdentity, keep: &str) -> Result<Vec<PathBuf>> {
    let prefix = format!("{}.{}.", identity.chip, identity.firmware_type);
    let keep_gz = format!("{}.gz", keep);
    let mut pruned = Vec::new();

    for entry in std::fs::read_dir(out_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let is_artifact = name.ends_with(".bin") || name.ends_with(".bin.gz");

        if name.starts_with(&prefix) && is_artifact && name != keep && name != keep_gz {
            std::fs::remove_file(entry.path())?;
            debug!("Pruned stale artifact {}", name);
            pruned.push(entry.path());
        }
    }

    pruned.sort();
    Ok(pruned)
}

/// Gzip `data` in memory
pub fn gzip_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Gzip `input` into `output`
pub fn gzip_file(input: &Path, output: &Path) -> Result<()> {
    let mut reader = io::BufReader::new(std::fs::File::open(input)?);
    let mut writer = io::BufWriter::new(std::fs::File::create(output)?);

    let mut encoder = GzEncoder::new(&mut writer, Compression::best());
    io::copy(&mut reader, &mut encoder)?;
    encoder.finish()?;

    writer.flush()?;
    Ok(())
}
