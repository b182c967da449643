//! Build identity and version derivation

use crate::error::StampError;
use crate::fingerprint::SourceFingerprint;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Firmware type used when none is configured.
pub const DEFAULT_FIRMWARE_TYPE: &str = "STATION";

/// Prefix for timestamp-derived dev versions.
pub const DEV_PREFIX: &str = "D";

/// Identity stamped into the generated header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildIdentity {
    pub version: String,
    /// Unix time of regeneration, lowercase hex
    pub build_time: Option<String>,
    pub firmware_type: String,
    pub chip: String,
}

/// Which kind of build is being stamped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Dev,
    Prerelease,
    Release,
}

impl BuildMode {
    /// Release and prerelease builds need an externally supplied version
    pub fn is_release(&self) -> bool {
        !matches!(self, BuildMode::Dev)
    }

    /// Only full releases move the remote `latest.json` pointer
    pub fn publishes_latest(&self) -> bool {
        matches!(self, BuildMode::Release)
    }
}

impl std::fmt::Display for BuildMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BuildMode::Dev => "dev",
            BuildMode::Prerelease => "prerelease",
            BuildMode::Release => "release",
        };
        f.write_str(s)
    }
}

/// Parsed value of the `RELEASE_BUILD` switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseFlag {
    pub mode: BuildMode,
    /// Set when the switch itself carried the version
    pub version: Option<String>,
}

/// Interpret a `RELEASE_BUILD` value.
///
/// `release`/`1`/`true` select release mode, `prerelease` selects prerelease
/// mode, falsy values select dev mode. Anything else is a release whose
/// version is the value itself.
pub fn parse_release_flag(value: &str) -> ReleaseFlag {
    let trimmed = value.trim();
    let mode_only = |mode| ReleaseFlag {
        mode,
        version: None,
    };

    match trimmed.to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "dev" => mode_only(BuildMode::Dev),
        "1" | "true" | "yes" | "release" => mode_only(BuildMode::Release),
        "prerelease" | "pre" => mode_only(BuildMode::Prerelease),
        _ => ReleaseFlag {
            mode: BuildMode::Release,
            version: Some(trimmed.to_string()),
        },
    }
}

/// How dev builds derive their version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionScheme {
    /// First 8 hex chars of the source fingerprint
    #[default]
    Fingerprint,
    /// `D<unix seconds>`
    Timestamp,
}

impl std::str::FromStr for VersionScheme {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fingerprint" | "hash" => Ok(VersionScheme::Fingerprint),
            "timestamp" | "time" => Ok(VersionScheme::Timestamp),
            other => Err(format!("unknown version scheme: {other}")),
        }
    }
}

/// Reject versions that could not be embedded verbatim.
///
/// The version lands inside a quoted header literal, an artifact file name and
/// a release server URL path, so only `[A-Za-z0-9._+-]` is allowed and `..`
/// is refused.
pub fn validate_version(version: &str) -> Result<()> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-');

    if !version.is_empty() && version.chars().all(allowed) && !version.contains("..") {
        Ok(())
    } else {
        Err(StampError::InvalidVersion(version.to_string()))
    }
}

/// Derive the version string for this build.
///
/// Dev builds derive it locally; release builds must be handed one, and it
/// must pass [`validate_version`].
pub fn derive_version(
    mode: BuildMode,
    scheme: VersionScheme,
    fingerprint: &SourceFingerprint,
    release_version: Option<&str>,
    now: DateTime<Utc>,
) -> Result<String> {
    if mode.is_release() {
        let version = release_version
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(StampError::MissingReleaseVersion)?;
        validate_version(version)?;
        return Ok(version.to_string());
    }

    Ok(match scheme {
        VersionScheme::Fingerprint => fingerprint.short().to_string(),
        VersionScheme::Timestamp => format!("{}{}", DEV_PREFIX, now.timestamp()),
    })
}

/// Build time as lowercase hex Unix seconds
pub fn build_time_hex(now: DateTime<Utc>) -> String {
    format!("{:x}", now.timestamp())
}
