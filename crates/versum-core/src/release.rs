//! Release server client
//!
//! The release server stores firmware binaries per chip and firmware type and
//! exposes the newest published version as `latest.json`:
//!
//! - `GET  <server>/<chip>/<type>/latest.json` → `{"version": "..."}`
//! - `PUT  <server>/<chip>/<type>/<version>/<file>` (bearer auth)
//! - `PUT  <server>/<chip>/<type>/latest.json` (bearer auth)

use crate::error::StampError;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Body of `latest.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestRelease {
    pub version: String,
}

/// Where a release lives on the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTarget {
    pub chip: String,
    pub firmware_type: String,
}

impl ReleaseTarget {
    pub fn new(chip: &str, firmware_type: &str) -> Self {
        ReleaseTarget {
            chip: chip.to_string(),
            firmware_type: firmware_type.to_string(),
        }
    }
}

/// Remote store of released firmware
#[async_trait]
pub trait ReleaseServer: Send + Sync {
    /// Latest released version, `None` if nothing was released yet
    async fn latest_version(&self, target: &ReleaseTarget) -> Result<Option<String>>;

    /// Upload a binary under its versioned path, returning where it went
    async fn upload_artifact(
        &self,
        target: &ReleaseTarget,
        version: &str,
        file_name: &str,
        data: Vec<u8>,
    ) -> Result<String>;

    /// Point `latest.json` at `version`
    async fn publish_latest(&self, target: &ReleaseTarget, version: &str) -> Result<()>;
}

/// Release server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseServerConfig {
    /// Base URL, without trailing slash
    pub server_url: String,
    /// Upload credential (optional for read-only use)
    pub token: Option<String>,
}

impl ReleaseServerConfig {
    /// Create config for a specific server
    pub fn new(server_url: &str) -> Self {
        ReleaseServerConfig {
            server_url: server_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Read `RELEASE_SERVER` and `UPLOAD_KEY`; `None` when no server is set
    pub fn from_env() -> Option<Self> {
        let server = std::env::var("RELEASE_SERVER")
            .ok()
            .filter(|s| !s.trim().is_empty())?;
        let config = Self::new(&server);
        Some(match std::env::var("UPLOAD_KEY") {
            Ok(token) if !token.is_empty() => config.with_token(&token),
            _ => config,
        })
    }

    /// Set upload credential
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn latest_url(&self, target: &ReleaseTarget) -> String {
        format!(
            "{}/{}/{}/latest.json",
            self.server_url, target.chip, target.firmware_type
        )
    }

    pub fn artifact_url(&self, target: &ReleaseTarget, version: &str, file_name: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.server_url, target.chip, target.firmware_type, version, file_name
        )
    }
}

/// HTTP implementation of [`ReleaseServer`]
pub struct HttpReleaseServer {
    config: ReleaseServerConfig,
    http_client: reqwest::Client,
}

impl HttpReleaseServer {
    pub fn new(config: ReleaseServerConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("versum/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(HttpReleaseServer {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &ReleaseServerConfig {
        &self.config
    }

    fn token(&self) -> Result<&str> {
        self.config
            .token
            .as_deref()
            .ok_or_else(|| StampError::Http("upload credential is not set".to_string()))
    }

    async fn put(&self, url: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let response = self
            .http_client
            .put(url)
            .bearer_auth(self.token()?)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StampError::ServerStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ReleaseServer for HttpReleaseServer {
    async fn latest_version(&self, target: &ReleaseTarget) -> Result<Option<String>> {
        let url = self.config.latest_url(target);
        debug!("Querying latest release at {}", url);

        let response = self.http_client.get(&url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            info!("No release published yet at {}", url);
            return Ok(None);
        }
        if !status.is_success() {
            return Err(StampError::ServerStatus {
                status: status.as_u16(),
                url,
            });
        }

        let latest: LatestRelease = response.json().await?;
        Ok(Some(latest.version))
    }

    async fn upload_artifact(
        &self,
        target: &ReleaseTarget,
        version: &str,
        file_name: &str,
        data: Vec<u8>,
    ) -> Result<String> {
        let url = self.config.artifact_url(target, version, file_name);
        info!("Uploading {} ({} bytes) to {}", file_name, data.len(), url);

        self.put(&url, data, "application/octet-stream").await?;
        Ok(url)
    }

    async fn publish_latest(&self, target: &ReleaseTarget, version: &str) -> Result<()> {
        let url = self.config.latest_url(target);
        let body = serde_json::to_vec(&LatestRelease {
            version: version.to_string(),
        })?;

        info!("Publishing {} as latest at {}", version, url);
        self.put(&url, body, "application/json").await
    }
}
