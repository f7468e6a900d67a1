//! Cooperative file-based shutdown signal.
//!
//! The mere existence of a marker file signals shutdown intent; the
//! marker is consumed (deleted) the moment it is observed. There is no
//! polling thread: the session checks once per received message.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Watches for a quit-marker file and consumes it on sight.
#[derive(Debug, Clone)]
pub struct ShutdownSentinel {
    marker: PathBuf,
}

impl ShutdownSentinel {
    /// Sentinel with an explicit marker path.
    pub fn at(marker: impl Into<PathBuf>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    /// Conventional marker for a program: `~/.Close<prog>`.
    pub fn for_program(prog: &str) -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            marker: home.join(format!(".Close{prog}")),
        }
    }

    /// The watched path.
    pub fn marker(&self) -> &Path {
        &self.marker
    }

    /// True if the marker exists. The marker is deleted before
    /// returning so the next start is not immediately stopped again.
    pub fn triggered(&self) -> bool {
        if !self.marker.exists() {
            return false;
        }
        debug!(path = %self.marker.display(), "quit marker found, removing");
        if let Err(e) = std::fs::remove_file(&self.marker) {
            warn!(path = %self.marker.display(), error = %e, "failed to remove quit marker");
        }
        true
    }
}
