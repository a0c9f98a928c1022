/// Configuration for the undo/redo engine.
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Maximum number of states kept on the undo stack.
const DEFAULT_MAX_UNDO_DEPTH: usize = 100;

const MAX_UNDO_DEPTH_ENV: &str = "RICHPAD_MAX_UNDO_DEPTH";
const ACTION_TIMEOUT_ENV: &str = "RICHPAD_ACTION_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Max states on the undo stack; the oldest are evicted first.
    pub max_undo_depth: usize,
    /// How long an asynchronous undo/redo action may stay in flight
    /// before [`check_stalled`](crate::UndoRedoManager::check_stalled)
    /// abandons it. `None` waits forever.
    pub action_timeout_ms: Option<u64>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_undo_depth: DEFAULT_MAX_UNDO_DEPTH,
            action_timeout_ms: None,
        }
    }
}

impl HistoryConfig {
    pub fn action_timeout(&self) -> Option<Duration> {
        self.action_timeout_ms.map(Duration::from_millis)
    }

    /// Parses a JSON config. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config: Self =
            serde_json::from_str(json).context("Failed to parse history config")?;
        config.sanitize();
        Ok(config)
    }

    /// Loads config from `path`, falling back to defaults.
    ///
    /// A missing file yields defaults silently; an unreadable or invalid
    /// file is logged and also yields defaults.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let loaded = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))
            .and_then(|contents| Self::from_json(&contents));
        match loaded {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{e:#}; using defaults");
                Self::default()
            }
        }
    }

    /// Saves config to `path` as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Applies `RICHPAD_MAX_UNDO_DEPTH` and `RICHPAD_ACTION_TIMEOUT_MS`
    /// when set. Unparsable values are logged and ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(depth) = env_number(MAX_UNDO_DEPTH_ENV) {
            self.max_undo_depth = depth as usize;
        }
        if let Some(timeout) = env_number(ACTION_TIMEOUT_ENV) {
            self.action_timeout_ms = Some(timeout);
        }
        self.sanitize();
        self
    }

    fn sanitize(&mut self) {
        if self.max_undo_depth == 0 {
            tracing::warn!("max_undo_depth must be at least 1; using 1");
            self.max_undo_depth = 1;
        }
    }
}

fn env_number(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Ignoring {key}={raw:?}: {e}");
            None
        }
    }
}
