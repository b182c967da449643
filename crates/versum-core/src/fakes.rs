//! In-memory release server (testing only)
//!
//! Satisfies the [`ReleaseServer`] contract without any network access.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StampError;
use crate::release::{ReleaseServer, ReleaseTarget};
use crate::Result;

/// An uploaded object kept by [`MemoryReleaseServer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub version: String,
    pub file_name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
struct State {
    latest: HashMap<(String, String), String>,
    artifacts: Vec<StoredArtifact>,
    latest_queries: usize,
}

/// Release server backed by a `HashMap<(chip, type), version>`.
#[derive(Debug, Default)]
pub struct MemoryReleaseServer {
    state: Mutex<State>,
    unreachable: bool,
}

impl MemoryReleaseServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A server whose every call fails, as if it were offline
    pub fn unreachable() -> Self {
        MemoryReleaseServer {
            state: Mutex::default(),
            unreachable: true,
        }
    }

    /// Seed the latest version for a target
    pub fn with_latest(self, target: &ReleaseTarget, version: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .latest
            .insert(key(target), version.to_string());
        self
    }

    pub fn latest(&self, target: &ReleaseTarget) -> Option<String> {
        self.state.lock().unwrap().latest.get(&key(target)).cloned()
    }

    pub fn artifacts(&self) -> Vec<StoredArtifact> {
        self.state.lock().unwrap().artifacts.clone()
    }

    pub fn latest_queries(&self) -> usize {
        self.state.lock().unwrap().latest_queries
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable {
            return Err(StampError::Http("connection refused".to_string()));
        }
        Ok(())
    }
}

fn key(target: &ReleaseTarget) -> (String, String) {
    (target.chip.clone(), target.firmware_type.clone())
}

#[async_trait]
impl ReleaseServer for MemoryReleaseServer {
    async fn latest_version(&self, target: &ReleaseTarget) -> Result<Option<String>> {
        self.check_reachable()?;
        let mut state = self.state.lock().unwrap();
        state.latest_queries += 1;
        Ok(state.latest.get(&key(target)).cloned())
    }

    async fn upload_artifact(
        &self,
        target: &ReleaseTarget,
        version: &str,
        file_name: &str,
        data: Vec<u8>,
    ) -> Result<String> {
        self.check_reachable()?;
        self.state.lock().unwrap().artifacts.push(StoredArtifact {
            version: version.to_string(),
            file_name: file_name.to_string(),
            data,
        });
        Ok(format!(
            "memory://{}/{}/{}/{}",
            target.chip, target.firmware_type, version, file_name
        ))
    }

    async fn publish_latest(&self, target: &ReleaseTarget, version: &str) -> Result<()> {
        self.check_reachable()?;
        self.state
            .lock()
            .unwrap()
            .latest
            .insert(key(target), version.to_string());
        Ok(())
    }
}
