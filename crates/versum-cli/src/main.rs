//! versum - firmware version stamper
//!
//! Build hook that keeps a generated version header in sync with the
//! firmware sources and ships the compiled binary under a versioned name.
//!
//! ## Commands
//!
//! - `stamp`: fingerprint sources and regenerate the version header if needed
//! - `publish`: name the built binary and copy or upload it
//! - `fingerprint`: print the current source fingerprint and cache status
//! - `show`: print the build identity stored in the header

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use versum_core::{
    parse_release_flag, plan_delivery, publish, read_cached, read_identity, stamp, BuildMode,
    Delivery, HttpReleaseServer, PublishConfig, ReleaseServer, ReleaseServerConfig, StampConfig,
    StampOutcome, VersionScheme, CACHE_FILE, DEFAULT_FIRMWARE_TYPE, DEFAULT_HEADER,
};

#[derive(Parser)]
#[command(name = "versum")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Firmware version stamper", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fingerprint sources and regenerate the version header when they changed
    Stamp {
        #[command(flatten)]
        project: ProjectArgs,

        #[command(flatten)]
        release: ReleaseArgs,

        #[command(flatten)]
        sources: SourceArgs,

        /// Chip identifier
        #[arg(long, env = "BOARD_MCU")]
        chip: String,

        /// Firmware type
        #[arg(long, env = "FIRMWARE_TYPE", default_value = DEFAULT_FIRMWARE_TYPE)]
        firmware_type: String,

        /// Dev version scheme (fingerprint or timestamp)
        #[arg(long, default_value = "fingerprint")]
        scheme: VersionScheme,

        /// Leave BUILD_TIME out of the header
        #[arg(long)]
        no_build_time: bool,
    },

    /// Name the built binary and copy or upload it
    Publish {
        /// Compiled firmware image
        binary: PathBuf,

        #[command(flatten)]
        project: ProjectArgs,

        #[command(flatten)]
        release: ReleaseArgs,

        /// Output directory for local copies (relative to the project)
        #[arg(long, default_value = "../build")]
        out_dir: PathBuf,

        /// Append the build time to the file name
        #[arg(long)]
        with_build_time: bool,

        /// Gzip the artifact
        #[arg(long)]
        compress: bool,

        /// Remove older artifacts of the same chip and type
        #[arg(long)]
        prune: bool,

        /// Upload credential for the release server
        #[arg(long, env = "UPLOAD_KEY", hide_env_values = true)]
        upload_key: Option<String>,
    },

    /// Show the current source fingerprint and whether the cache matches
    Fingerprint {
        #[command(flatten)]
        project: ProjectArgs,

        #[command(flatten)]
        sources: SourceArgs,
    },

    /// Show the build identity stored in the version header
    Show {
        #[command(flatten)]
        project: ProjectArgs,
    },
}

#[derive(Args)]
struct ProjectArgs {
    /// Project directory
    #[arg(short, long, default_value = ".")]
    project_dir: PathBuf,

    /// Generated header, relative to the project
    #[arg(long, default_value = DEFAULT_HEADER)]
    header: PathBuf,
}

/// Which files make up the fingerprint and where it is cached
#[derive(Args)]
struct SourceArgs {
    /// Cache file holding the last fingerprint
    #[arg(long, default_value = CACHE_FILE)]
    cache: PathBuf,

    /// Tracked file or directory (repeatable)
    #[arg(long = "track")]
    tracked: Vec<PathBuf>,

    /// Path kept out of the fingerprint (repeatable)
    #[arg(long = "exclude")]
    excluded: Vec<PathBuf>,
}

impl SourceArgs {
    /// Stamp configuration for `chip` with these sources selected
    fn stamp_config(self, project: &ProjectArgs, chip: &str) -> StampConfig {
        let mut config = StampConfig::new(&project.project_dir, chip).with_header(&project.header);
        config.cache = self.cache;
        if !self.tracked.is_empty() {
            config.tracked = self.tracked;
        }
        config.excluded = self.excluded;
        config
    }
}

#[derive(Args)]
struct ReleaseArgs {
    /// Release switch: release, prerelease, or the release version itself
    #[arg(long, env = "RELEASE_BUILD")]
    release_build: Option<String>,

    /// Explicit release version
    #[arg(long, env = "RELEASE_VERSION")]
    release_version: Option<String>,

    /// Release server base URL
    #[arg(long, env = "RELEASE_SERVER")]
    server: Option<String>,
}

impl ReleaseArgs {
    /// Build mode and the version supplied on the command line or environment
    fn resolve(&self) -> (BuildMode, Option<String>) {
        let flag = parse_release_flag(self.release_build.as_deref().unwrap_or(""));
        let version = self
            .release_version
            .clone()
            .filter(|v| !v.trim().is_empty())
            .or(flag.version);
        (flag.mode, version)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Same variables the firmware build reads, so load them before parsing
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    versum_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Stamp {
            project,
            release,
            sources,
            chip,
            firmware_type,
            scheme,
            no_build_time,
        } => {
            let (mode, version) = release.resolve();
            let version = match version {
                None if mode.is_release() => prompt_release_version()?,
                other => other,
            };

            let mut config = sources.stamp_config(&project, &chip).with_mode(mode);
            config.firmware_type = firmware_type;
            config.scheme = scheme;
            config.release_version = version;
            config.with_build_time = !no_build_time;

            cmd_stamp(&config, release.server.as_deref()).await
        }
        Commands::Publish {
            binary,
            project,
            release,
            out_dir,
            with_build_time,
            compress,
            prune,
            upload_key,
        } => {
            let (mode, _) = release.resolve();
            let config = PublishConfig {
                binary,
                out_dir: project.project_dir.join(out_dir),
                with_build_time,
                compress,
                prune,
                mode,
            };
            let header = project.project_dir.join(&project.header);
            let server = release.server.as_deref().map(|url| {
                let config = ReleaseServerConfig::new(url);
                match upload_key.as_deref() {
                    Some(key) if !key.is_empty() => config.with_token(key),
                    _ => config,
                }
            });
            if server.is_none() && upload_key.is_some() {
                warn!("UPLOAD_KEY is set but no release server is configured");
            }

            cmd_publish(&config, &header, server).await
        }
        Commands::Fingerprint { project, sources } => {
            cmd_fingerprint(&sources.stamp_config(&project, ""))
        }
        Commands::Show { project } => cmd_show(&project.project_dir.join(&project.header)),
    }
}

/// Ask for the release version on the terminal
fn prompt_release_version() -> Result<Option<String>> {
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        return Ok(None);
    }

    eprint!("Release version: ");
    std::io::stderr().flush()?;

    let mut line = String::new();
    stdin
        .lock()
        .read_line(&mut line)
        .context("Failed to read release version")?;
    let version = line.trim().to_string();
    Ok((!version.is_empty()).then_some(version))
}

/// Regenerate the version header if the sources changed
async fn cmd_stamp(config: &StampConfig, server_url: Option<&str>) -> Result<()> {
    let server = match server_url {
        Some(url) => Some(
            HttpReleaseServer::new(ReleaseServerConfig::new(url))
                .context("Failed to create release server client")?,
        ),
        None => None,
    };
    let server_ref = server.as_ref().map(|s| s as &dyn ReleaseServer);

    let outcome = stamp(config, server_ref)
        .await
        .context("Failed to stamp version header")?;

    match outcome {
        StampOutcome::Unchanged { fingerprint } => {
            println!("Up to date: {}", fingerprint.short());
        }
        StampOutcome::Regenerated {
            identity,
            fingerprint,
        } => {
            println!("Version: {}", identity.version);
            println!("Fingerprint: {}", fingerprint);
            if let Some(build_time) = identity.build_time {
                println!("Build time: {}", build_time);
            }
        }
        StampOutcome::AlreadyReleased { version } => {
            info!("Release {} already published, stopping", version);
            println!("Already released: {}", version);
        }
    }

    Ok(())
}

/// Name the built binary and deliver it
async fn cmd_publish(
    config: &PublishConfig,
    header: &Path,
    server: Option<ReleaseServerConfig>,
) -> Result<()> {
    let identity = read_identity(header)
        .context(format!("Failed to read build identity from {:?}", header))?;

    let uploader = match plan_delivery(server.as_ref()) {
        Delivery::Upload => match server {
            Some(server) => Some(
                HttpReleaseServer::new(server).context("Failed to create release server client")?,
            ),
            None => None,
        },
        Delivery::Local => None,
    };
    let uploader_ref = uploader.as_ref().map(|s| s as &dyn ReleaseServer);

    let report = publish(config, &identity, uploader_ref)
        .await
        .context("Failed to publish firmware")?;

    println!("Artifact: {}", report.file_name);
    println!("SHA256: {}", report.sha256);
    for dest in &report.destinations {
        println!("  -> {}", dest);
    }
    for pruned in &report.pruned {
        println!("  pruned {}", pruned.display());
    }
    if report.published_latest {
        println!("Latest: {}", identity.version);
    }

    Ok(())
}

/// Show the fingerprint and whether the cache agrees with it
fn cmd_fingerprint(config: &StampConfig) -> Result<()> {
    let fingerprint = config
        .fingerprint()
        .context(format!("Failed to fingerprint {:?}", config.project_dir))?;
    let cached = read_cached(&config.cache_path()).context("Failed to read cache")?;

    println!("Fingerprint: {}", fingerprint);
    println!("Short: {}", fingerprint.short());
    match cached {
        Some(c) if c == fingerprint.as_str() => println!("Cache: up to date"),
        Some(_) => println!("Cache: stale"),
        None => println!("Cache: missing"),
    }

    Ok(())
}

/// Print the identity stored in the header
fn cmd_show(header: &Path) -> Result<()> {
    let identity = read_identity(header)
        .context(format!("Failed to read build identity from {:?}", header))?;

    println!("Version: {}", identity.version);
    println!("Firmware type: {}", identity.firmware_type);
    println!("Chip: {}", identity.chip);
    if let Some(build_time) = identity.build_time {
        println!("Build time: {}", build_time);
    }

    Ok(())
}
