//! Generated version header
//!
//! Renders a [`BuildIdentity`] into the header the firmware compiles against
//! and parses it back for the post-build step. Two flavours exist: a C header
//! with include-guarded `#define`s and a Rust module with `pub const`s.

use crate::error::StampError;
use crate::identity::{validate_version, BuildIdentity};
use crate::Result;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;

/// Header path used when none is configured, relative to the project.
pub const DEFAULT_HEADER: &str = "src/version.h";

/// Flavour of generated header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderFormat {
    C,
    Rust,
}

impl HeaderFormat {
    /// Pick the flavour from the header's extension
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("h") | Some("hpp") | Some("hh") => Ok(HeaderFormat::C),
            Some("rs") => Ok(HeaderFormat::Rust),
            _ => Err(StampError::UnsupportedHeader(path.display().to_string())),
        }
    }

    /// Names of the (version, build time, firmware type, chip) definitions
    fn field_names(&self) -> [&'static str; 4] {
        match self {
            HeaderFormat::C => ["FIRMWARE_VERSION", "BUILD_TIME", "FIRMWARE_TYPE", "CHIP"],
            HeaderFormat::Rust => ["VERSION", "BUILD_TIME", "FIRMWARE", "CHIP"],
        }
    }
}

/// Render `identity` using the fixed layout for `format`.
///
/// Values are inserted in a single pass, so a value that happens to contain
/// placeholder-like text is written verbatim.
pub fn render_header(identity: &BuildIdentity, format: HeaderFormat) -> String {
    let BuildIdentity {
        version,
        build_time,
        firmware_type,
        chip,
    } = identity;

    match format {
        HeaderFormat::C => {
            let build_time = build_time
                .as_ref()
                .map(|t| format!("#define BUILD_TIME \"{t}\"\n"))
                .unwrap_or_default();
            format!(
                "#ifndef __VERSION_H__\n\
                 #define __VERSION_H__\n\
                 \n\
                 #define FIRMWARE_VERSION \"{version}\"\n\
                 {build_time}\
                 #define FIRMWARE_TYPE \"{firmware_type}\"\n\
                 #define CHIP \"{chip}\"\n\
                 \n\
                 #endif\n"
            )
        }
        HeaderFormat::Rust => {
            let build_time = build_time
                .as_ref()
                .map(|t| format!("pub const BUILD_TIME: &str = \"{t}\";\n"))
                .unwrap_or_default();
            format!(
                "pub const VERSION: &str = \"{version}\";\n\
                 {build_time}\
                 pub const CHIP: &str = \"{chip}\";\n\
                 pub const FIRMWARE: &str = \"{firmware_type}\";\n"
            )
        }
    }
}

/// Parse header text back into a [`BuildIdentity`].
///
/// `origin` only feeds error messages.
pub fn parse_header(text: &str, format: HeaderFormat, origin: &str) -> Result<BuildIdentity> {
    let pattern = match format {
        HeaderFormat::C => r#"(?m)^\s*#define\s+(\w+)\s+"([^"]*)""#,
        HeaderFormat::Rust => {
            r#"(?m)^\s*pub\s+const\s+(\w+)\s*:\s*&\s*(?:'static\s+)?str\s*=\s*"([^"]*)"\s*;"#
        }
    };
    let re = Regex::new(pattern).map_err(|e| StampError::UnsupportedHeader(e.to_string()))?;

    let defines: HashMap<&str, &str> = re
        .captures_iter(text)
        .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
        .collect();

    let [version, build_time, firmware, chip] = format.field_names();
    let required = |name: &str| {
        defines
            .get(name)
            .map(|v| v.to_string())
            .ok_or_else(|| StampError::MalformedHeader {
                path: origin.to_string(),
                field: name.to_string(),
            })
    };

    Ok(BuildIdentity {
        version: required(version)?,
        build_time: defines.get(build_time).map(|v| v.to_string()),
        firmware_type: required(firmware)?,
        chip: required(chip)?,
    })
}

/// Read and parse the header at `path`.
///
/// The version is checked again since it is about to name an artifact.
pub fn read_identity(path: &Path) -> Result<BuildIdentity> {
    let format = HeaderFormat::from_path(path)?;
    let text = std::fs::read_to_string(path)?;
    let identity = parse_header(&text, format, &path.display().to_string())?;
    validate_version(&identity.version)?;
    Ok(identity)
}
