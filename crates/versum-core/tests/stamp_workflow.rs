use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use versum_core::fakes::MemoryReleaseServer;
use versum_core::{
    artifact_file_name, publish, read_identity, stamp_at, BuildMode, PublishConfig,
    ReleaseTarget, StampConfig, StampError, StampOutcome,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fixed_timestamp() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
        .expect("parse timestamp")
        .with_timezone(&Utc)
}

/// A minimal PlatformIO-style project
fn make_project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    std::fs::write(root.join("platformio.ini"), "[env:esp32]\nboard = esp32dev\n").unwrap();
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::create_dir_all(root.join("lib/ws_logger")).unwrap();
    std::fs::write(root.join("src/main.cpp"), "#include \"version.h\"\nvoid setup() {}\n").unwrap();
    std::fs::write(root.join("lib/ws_logger/ws_logger.h"), "#pragma once\n").unwrap();
    dir
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).expect("read file")
}

// ---------------------------------------------------------------------------
// Dev builds
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unchanged_sources_skip_regeneration() {
    let project = make_project();
    let config = StampConfig::new(project.path(), "esp32");

    let first = stamp_at(&config, None, fixed_timestamp()).await.unwrap();
    let StampOutcome::Regenerated { fingerprint, .. } = first else {
        panic!("first run should regenerate");
    };
    let header_before = read(&config.header_path());

    // A later run with identical sources must not touch the header
    let later = fixed_timestamp() + Duration::hours(1);
    let second = stamp_at(&config, None, later).await.unwrap();

    assert_eq!(second, StampOutcome::Unchanged { fingerprint });
    assert_eq!(read(&config.header_path()), header_before);
}

#[tokio::test]
async fn cache_holds_new_fingerprint_after_regeneration() {
    let project = make_project();
    let config = StampConfig::new(project.path(), "esp32");

    let outcome = stamp_at(&config, None, fixed_timestamp()).await.unwrap();
    let StampOutcome::Regenerated { fingerprint, .. } = outcome else {
        panic!("expected regeneration");
    };

    assert_eq!(read(&config.cache_path()), fingerprint.as_str());
}

#[tokio::test]
async fn source_change_regenerates_with_new_version() {
    let project = make_project();
    let config = StampConfig::new(project.path(), "esp32");

    let StampOutcome::Regenerated { identity: v1, .. } =
        stamp_at(&config, None, fixed_timestamp()).await.unwrap()
    else {
        panic!("expected regeneration");
    };

    std::fs::write(project.path().join("src/main.cpp"), "void setup() { init(); }\n").unwrap();

    let StampOutcome::Regenerated { identity: v2, .. } =
        stamp_at(&config, None, fixed_timestamp()).await.unwrap()
    else {
        panic!("expected regeneration after edit");
    };

    assert_ne!(v1.version, v2.version);
    assert_eq!(read_identity(&config.header_path()).unwrap(), v2);
}

#[tokio::test]
async fn header_rewrite_alone_does_not_invalidate_cache() {
    let project = make_project();
    let config = StampConfig::new(project.path(), "esp32");
    stamp_at(&config, None, fixed_timestamp()).await.unwrap();

    // Touch the generated header the way a manual edit would
    let mut header = read(&config.header_path());
    header.push_str("// local note\n");
    std::fs::write(config.header_path(), header).unwrap();

    let outcome = stamp_at(&config, None, fixed_timestamp()).await.unwrap();
    assert!(matches!(outcome, StampOutcome::Unchanged { .. }));
}

#[tokio::test]
async fn absolute_header_path_is_kept_out_of_fingerprint() {
    let project = make_project();
    let header = project.path().join("src/version.h");
    let config = StampConfig::new(project.path(), "esp32").with_header(&header);

    let first = stamp_at(&config, None, fixed_timestamp()).await.unwrap();
    assert!(matches!(first, StampOutcome::Regenerated { .. }));

    // Writing the header must not change what the next run sees
    let later = fixed_timestamp() + Duration::minutes(5);
    let second = stamp_at(&config, None, later).await.unwrap();
    assert!(matches!(second, StampOutcome::Unchanged { .. }));

    let relative = StampConfig::new(project.path(), "esp32");
    assert_eq!(
        config.fingerprint().unwrap(),
        relative.fingerprint().unwrap()
    );
}

#[tokio::test]
async fn rust_module_header_is_supported() {
    let project = make_project();
    let config = StampConfig::new(project.path(), "esp32c3").with_header("src/version.rs");

    stamp_at(&config, None, fixed_timestamp()).await.unwrap();

    let text = read(&project.path().join("src/version.rs"));
    assert!(text.contains("pub const CHIP: &str = \"esp32c3\";"));
    assert_eq!(read_identity(&config.header_path()).unwrap().chip, "esp32c3");
}

// ---------------------------------------------------------------------------
// Release builds
// ---------------------------------------------------------------------------

#[tokio::test]
async fn release_matching_remote_writes_nothing() {
    let project = make_project();
    let config = StampConfig::new(project.path(), "esp32")
        .with_mode(BuildMode::Release)
        .with_release_version("v1.2.0");
    let server =
        MemoryReleaseServer::new().with_latest(&ReleaseTarget::new("esp32", "STATION"), "v1.2.0");

    let outcome = stamp_at(&config, Some(&server), fixed_timestamp())
        .await
        .unwrap();

    assert_eq!(
        outcome,
        StampOutcome::AlreadyReleased {
            version: "v1.2.0".to_string()
        }
    );
    assert!(!config.header_path().exists());
    assert!(!config.cache_path().exists());
}

#[tokio::test]
async fn release_bypasses_cache_and_stamps_supplied_version() {
    let project = make_project();
    let dev = StampConfig::new(project.path(), "esp32");
    stamp_at(&dev, None, fixed_timestamp()).await.unwrap();

    let release = dev
        .clone()
        .with_mode(BuildMode::Release)
        .with_release_version("v2.0.0");
    let server =
        MemoryReleaseServer::new().with_latest(&ReleaseTarget::new("esp32", "STATION"), "v1.9.9");

    let outcome = stamp_at(&release, Some(&server), fixed_timestamp())
        .await
        .unwrap();

    let StampOutcome::Regenerated { identity, .. } = outcome else {
        panic!("release should always regenerate");
    };
    assert_eq!(identity.version, "v2.0.0");
    assert_eq!(server.latest_queries(), 1);
    assert!(read(&release.header_path()).contains("#define FIRMWARE_VERSION \"v2.0.0\""));
}

#[tokio::test]
async fn release_without_version_fails_before_writing() {
    let project = make_project();
    let config = StampConfig::new(project.path(), "esp32").with_mode(BuildMode::Release);

    let err = stamp_at(&config, None, fixed_timestamp()).await.unwrap_err();

    assert!(matches!(err, StampError::MissingReleaseVersion));
    assert!(!config.header_path().exists());
}

#[tokio::test]
async fn unsafe_release_version_fails_before_writing() {
    let project = make_project();
    let server = MemoryReleaseServer::new();

    for version in ["1.0\"; int x = 1; //", "../../../etc"] {
        let config = StampConfig::new(project.path(), "esp32")
            .with_mode(BuildMode::Release)
            .with_release_version(version);

        let err = stamp_at(&config, Some(&server), fixed_timestamp())
            .await
            .unwrap_err();

        assert!(matches!(err, StampError::InvalidVersion(_)));
        assert!(!config.header_path().exists());
        assert!(!config.cache_path().exists());
    }
    assert_eq!(server.latest_queries(), 0);
}

#[tokio::test]
async fn unreachable_release_server_is_fatal() {
    let project = make_project();
    let config = StampConfig::new(project.path(), "esp32")
        .with_mode(BuildMode::Release)
        .with_release_version("v1.0.0");
    let server = MemoryReleaseServer::unreachable();

    let err = stamp_at(&config, Some(&server), fixed_timestamp())
        .await
        .unwrap_err();

    assert!(matches!(err, StampError::Http(_)));
    assert!(!config.header_path().exists());
}

// ---------------------------------------------------------------------------
// Stamp → build → publish
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_reads_identity_back_from_header() {
    let project = make_project();
    let config = StampConfig::new(project.path(), "esp32");
    let StampOutcome::Regenerated { identity, .. } =
        stamp_at(&config, None, fixed_timestamp()).await.unwrap()
    else {
        panic!("expected regeneration");
    };

    let binary = project.path().join("firmware.bin");
    std::fs::write(&binary, b"\xe9image").unwrap();

    // The post-build step runs in another process: it only has the header
    let reread = read_identity(&config.header_path()).unwrap();
    assert_eq!(reread, identity);

    let out_dir = project.path().join("build");
    let report = publish(&PublishConfig::new(&binary, &out_dir), &reread, None)
        .await
        .unwrap();

    let expected = format!("esp32.STATION.{}.bin", identity.version);
    assert_eq!(report.file_name, expected);
    assert_eq!(artifact_file_name(&reread, false), expected);
    assert!(out_dir.join(expected).exists());
}
