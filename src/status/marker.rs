//! Agent status markers - authoritative state written by agent hooks
//!
//! One JSON file per working directory under `~/.config/pane-watch/markers/`,
//! named after a stable hash of the canonical directory path.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::config::StatusConfig;
use crate::infra::terminal::stable_hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerState {
    Working,
    Waiting,
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMarker {
    pub state: MarkerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Marker lookup keyed by working directory
pub trait MarkerSource: Send + Sync {
    fn lookup(&self, working_dir: &Path) -> Option<AgentMarker>;
}

/// Source for sessions without an agent runtime
pub struct NoMarkers;

impl MarkerSource for NoMarkers {
    fn lookup(&self, _working_dir: &Path) -> Option<AgentMarker> {
        None
    }
}

pub struct FileMarkerStore {
    dir: PathBuf,
    max_age: Duration,
}

impl FileMarkerStore {
    pub fn new(dir: PathBuf, max_age: Duration) -> Self {
        Self { dir, max_age }
    }

    pub fn from_config(config: &StatusConfig) -> Self {
        let dir = config
            .marker_dir
            .clone()
            .unwrap_or_else(Self::default_dir);
        Self::new(dir, config.marker_max_age())
    }

    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("pane-watch")
            .join("markers")
    }

    /// Marker file for `working_dir`
    pub fn path_for(&self, working_dir: &Path) -> PathBuf {
        let canonical = working_dir
            .canonicalize()
            .unwrap_or_else(|_| working_dir.to_path_buf());
        let key = stable_hash(&canonical.to_string_lossy());
        self.dir.join(format!("{:016x}.json", key))
    }

    /// Read the marker, stale or not
    pub fn read(&self, working_dir: &Path) -> Result<Option<AgentMarker>> {
        let path = self.path_for(working_dir);
        if !path.exists() {
            return Ok(None);
        }

        let mut file = File::open(&path)
            .with_context(|| format!("Failed to open marker {}", path.display()))?;
        file.lock_shared()?;
        let mut content = String::new();
        let read = file.read_to_string(&mut content);
        let _ = file.unlock();
        read.with_context(|| format!("Failed to read marker {}", path.display()))?;

        let marker = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse marker {}", path.display()))?;
        Ok(Some(marker))
    }

    /// Write a marker (agent hooks and the `marker` command)
    pub fn write(&self, working_dir: &Path, marker: &AgentMarker) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let path = self.path_for(working_dir);

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open marker {}", path.display()))?;

        file.lock_exclusive()?;
        let written = (|| -> Result<()> {
            file.set_len(0)?;
            file.write_all(serde_json::to_string_pretty(marker)?.as_bytes())?;
            file.flush()?;
            Ok(())
        })();
        let _ = file.unlock();
        written?;

        Ok(path)
    }

    pub fn is_fresh(&self, marker: &AgentMarker, now: DateTime<Utc>) -> bool {
        match (now - marker.updated_at).to_std() {
            Ok(age) => age <= self.max_age,
            // timestamp in the future: clock skew between writer and reader
            Err(_) => true,
        }
    }
}

impl MarkerSource for FileMarkerStore {
    fn lookup(&self, working_dir: &Path) -> Option<AgentMarker> {
        match self.read(working_dir) {
            Ok(Some(marker)) if self.is_fresh(&marker, Utc::now()) => Some(marker),
            Ok(Some(marker)) => {
                debug!(dir = %working_dir.display(), updated_at = %marker.updated_at, "Ignoring stale marker");
                None
            }
            Ok(None) => None,
            Err(e) => {
                debug!(dir = %working_dir.display(), error = %e, "Marker unreadable");
                None
            }
        }
    }
}
