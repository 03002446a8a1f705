//! Host capability probing
//!
//! Buildx support is detected once per process. Concurrent callers share the
//! first probe and every later caller reads the cached answer.

use crate::backend::ContainerBackend;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// What the host reports about docker buildx
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildxInfo {
    pub available: bool,
    pub version: Option<String>,
    pub builders: Vec<String>,
}

/// Memoising prober for optional backend features
pub struct CapabilityProber {
    backend: Arc<dyn ContainerBackend>,
    buildx: OnceCell<BuildxInfo>,
    warned: AtomicBool,
}

impl CapabilityProber {
    pub fn new(backend: Arc<dyn ContainerBackend>) -> Self {
        Self {
            backend,
            buildx: OnceCell::new(),
            warned: AtomicBool::new(false),
        }
    }

    /// Probe buildx, running the backend queries at most once
    pub async fn probe_buildx(&self) -> &BuildxInfo {
        self.buildx.get_or_init(|| self.detect_buildx()).await
    }

    /// Server version of the backend, for diagnostics
    pub async fn backend_version(&self) -> Option<String> {
        match self.backend.server_version().await {
            Ok(version) => Some(version),
            Err(e) => {
                warn!("Could not determine backend version: {}", e);
                None
            }
        }
    }

    /// Warn once per process that `action` may need buildx when it is missing
    pub async fn warn_if_needed(&self, action: &str) {
        if self.probe_buildx().await.available {
            return;
        }
        if !self.warned.swap(true, Ordering::SeqCst) {
            warn!(
                "Action '{}' may require Docker buildx, but it is not available; multi-platform builds may fail",
                action
            );
        }
    }

    async fn detect_buildx(&self) -> BuildxInfo {
        let version_text = match self.backend.buildx_version().await {
            Ok(text) => text,
            Err(e) => {
                debug!("buildx version failed: {}", e);
                warn_unavailable();
                return BuildxInfo::default();
            }
        };

        let listing = match self.backend.buildx_builders().await {
            Ok(text) => text,
            Err(e) => {
                debug!("buildx ls failed: {}", e);
                warn_unavailable();
                return BuildxInfo::default();
            }
        };

        let available = has_active_default_builder(&listing);
        if !available {
            warn_unavailable();
        }

        BuildxInfo {
            available,
            version: parse_version(&version_text),
            builders: parse_builders(&listing),
        }
    }
}

fn warn_unavailable() {
    warn!("Docker buildx is not available. Install it with `docker buildx install` or update Docker to 19.03+");
}

/// Version token from output like `github.com/docker/buildx v0.10.4 abc123`
pub fn parse_version(output: &str) -> Option<String> {
    let line = output.lines().find(|l| !l.trim().is_empty())?;
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 2 {
        return None;
    }
    fields
        .iter()
        .find(|f| f.starts_with('v') && f[1..].starts_with(|c: char| c.is_ascii_digit()))
        .or_else(|| fields.last())
        .map(|f| f.to_string())
}

/// True when a line mentions the `default` builder and it is not inactive
pub fn has_active_default_builder(listing: &str) -> bool {
    listing
        .lines()
        .any(|line| line.contains("default") && !line.contains("inactive"))
}

/// First column of every non-empty line after the header
pub fn parse_builders(listing: &str) -> Vec<String> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(|name| name.to_string())
        .collect()
}
