//! versum-core: version stamping for firmware builds
//!
//! Fingerprints a firmware project's sources, keeps a generated version
//! header in sync with them, and names and ships the compiled binary.
//!
//! ## Flow
//!
//! 1. [`stamp`] before the build: fingerprint, compare with `.versum`,
//!    derive a version, write the header, then the cache.
//! 2. [`publish`] after the build: read the header back, name the artifact,
//!    copy/compress it locally or upload it to the release server.

pub mod artifact;
pub mod cache;
pub mod error;
pub mod fakes;
pub mod fingerprint;
pub mod header;
pub mod identity;
pub mod release;
pub mod stamper;
pub mod telemetry;

pub use artifact::{
    artifact_file_name, gzip_bytes, plan_delivery, publish, Delivery, PublishConfig,
    PublishReport,
};
pub use cache::{read_cached, write_cached, CACHE_FILE};
pub use error::StampError;
pub use fingerprint::{compute_fingerprint, default_tracked_roots, SourceFingerprint};
pub use header::{parse_header, read_identity, render_header, HeaderFormat, DEFAULT_HEADER};
pub use identity::{
    derive_version, parse_release_flag, validate_version, BuildIdentity, BuildMode, ReleaseFlag,
    VersionScheme, DEFAULT_FIRMWARE_TYPE,
};
pub use release::{
    HttpReleaseServer, LatestRelease, ReleaseServer, ReleaseServerConfig, ReleaseTarget,
};
pub use stamper::{stamp, stamp_at, StampConfig, StampOutcome};
pub use telemetry::init_tracing;

/// Result type for versum operations
pub type Result<T> = std::result::Result<T, StampError>;
