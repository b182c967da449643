//! Tracing setup for the `versum` binary.
//!
//! Build hooks run inside another tool's output, so log lines go to stderr
//! and stdout stays free for the command's own report. Only the versum
//! crates log at the requested level; dependencies such as the HTTP client
//! are held at `warn` unless `RUST_LOG` says otherwise.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events follow the requested level
const OWN_TARGETS: &[&str] = &["versum", "versum_core"];

/// Filter directives used when `RUST_LOG` is unset
fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    OWN_TARGETS
        .iter()
        .fold("warn".to_string(), |acc, target| {
            format!("{acc},{target}={level}")
        })
}

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` wins over `level` when set. With `json` every line is a JSON
/// object. Only the first call in a process takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let (json_layer, text_layer) = if json {
        let base = fmt::layer().with_target(false).with_writer(std::io::stderr);
        (Some(base.json()), None)
    } else {
        let base = fmt::layer().with_target(false).with_writer(std::io::stderr);
        (None, Some(base))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .ok();
}
