//! Error types for versum-core

use thiserror::Error;

/// Errors that can occur while stamping or publishing a build
#[derive(Error, Debug)]
pub enum StampError {
    /// None of the tracked roots contained a file
    #[error("No source files found to fingerprint under {0}")]
    EmptySourceSet(String),

    /// Release mode needs a version and none was supplied
    #[error("Release build requested but no release version was supplied")]
    MissingReleaseVersion,

    /// Generated header is missing a required definition
    #[error("Malformed version header {path}: missing {field}")]
    MalformedHeader { path: String, field: String },

    /// Header path has an extension we cannot render
    #[error("Unsupported header format: {0}")]
    UnsupportedHeader(String),

    /// Release server answered with an unexpected status
    #[error("Release server returned {status} for {url}")]
    ServerStatus { status: u16, url: String },

    /// Version would not survive the header, a file name or a URL path
    #[error("Invalid version {0:?}: use letters, digits and . _ + - only")]
    InvalidVersion(String),

    /// Header or excluded path points outside the project directory
    #[error("Path {0} is outside the project directory")]
    OutsideProject(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error (release server)
    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for StampError {
    fn from(err: reqwest::Error) -> Self {
        StampError::Http(err.to_string())
    }
}
