//! Status detection - text patterns reconciled with agent markers

pub mod marker;
pub mod patterns;
pub mod reconcile;

use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub use marker::{AgentMarker, FileMarkerStore, MarkerSource, MarkerState, NoMarkers};
pub use patterns::PatternDetector;
pub use reconcile::reconcile;

use crate::config::StatusConfig;

/// Prompt used when a waiting session shows no readable prompt text
pub const WAITING_FALLBACK: &str = "Waiting for input";

/// Coarse session status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Status {
    #[default]
    Active,
    Waiting {
        prompt: String,
    },
    Thinking,
    Done,
    Error,
    /// Set by lifecycle only, never by detection
    Paused,
}

impl Status {
    /// Waiting with `prompt`, or the fallback prompt when it is blank
    pub fn waiting(prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        let prompt = if prompt.trim().is_empty() {
            WAITING_FALLBACK.to_string()
        } else {
            prompt
        };
        Status::Waiting { prompt }
    }

    /// Statuses polled on the slow cadence
    pub fn is_idle(&self) -> bool {
        matches!(
            self,
            Status::Waiting { .. } | Status::Done | Status::Error | Status::Paused
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Waiting { .. } => "waiting",
            Status::Thinking => "thinking",
            Status::Done => "done",
            Status::Error => "error",
            Status::Paused => "paused",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Status::Active => "🟢",
            Status::Waiting { .. } => "🟡",
            Status::Thinking => "💭",
            Status::Done => "✅",
            Status::Error => "🔴",
            Status::Paused => "⏸",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Waiting { prompt } => write!(f, "waiting: {}", prompt),
            other => f.write_str(other.label()),
        }
    }
}

/// Both status signals behind one call
pub struct StatusDetector {
    patterns: PatternDetector,
    markers: Arc<dyn MarkerSource>,
}

impl StatusDetector {
    pub fn new(config: &StatusConfig, markers: Arc<dyn MarkerSource>) -> Self {
        Self {
            patterns: PatternDetector::new(config),
            markers,
        }
    }

    /// Detector without an agent marker source
    pub fn patterns_only(config: &StatusConfig) -> Self {
        Self::new(config, Arc::new(NoMarkers))
    }

    /// Status for the latest capture
    ///
    /// Patterns run only when the text changed; the marker is consulted on every poll.
    pub fn evaluate(
        &self,
        text: &str,
        changed: bool,
        previous: &Status,
        working_dir: Option<&Path>,
    ) -> Status {
        if *previous == Status::Paused {
            return Status::Paused;
        }

        let current = if changed {
            self.patterns.detect(text)
        } else {
            previous.clone()
        };

        let marker = working_dir.and_then(|dir| self.markers.lookup(dir));
        reconcile(current, marker.as_ref())
    }
}
