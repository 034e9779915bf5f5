//! Recorder configuration
//!
//! Loaded from environment variables with defaults for everything.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for the recorder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    /// Directory recordings are written into (`RECORDINGS_PATH`)
    pub recordings_path: PathBuf,

    /// FFmpeg executable (`FFMPEG_PATH`)
    pub ffmpeg_path: String,

    /// Grace period between the quit keystroke and a forced kill
    /// (`RECORDING_STOP_TIMEOUT_SECS`)
    pub stop_timeout_secs: u64,

    /// How often the scheduler looks for due recordings
    /// (`SCHEDULER_INTERVAL_SECS`)
    pub scheduler_interval_secs: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            recordings_path: PathBuf::from("/app/recordings"),
            ffmpeg_path: "ffmpeg".to_string(),
            stop_timeout_secs: 10,
            scheduler_interval_secs: 60,
        }
    }
}

impl RecorderConfig {
    /// Load from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("RECORDINGS_PATH").filter(|v| !v.is_empty()) {
            config.recordings_path = PathBuf::from(path);
        }
        if let Some(ffmpeg) = lookup("FFMPEG_PATH").filter(|v| !v.is_empty()) {
            config.ffmpeg_path = ffmpeg;
        }
        if let Some(secs) = parse_secs(&lookup, "RECORDING_STOP_TIMEOUT_SECS") {
            config.stop_timeout_secs = secs;
        }
        if let Some(secs) = parse_secs(&lookup, "SCHEDULER_INTERVAL_SECS") {
            config.scheduler_interval_secs = secs;
        }

        config
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_interval_secs.max(1))
    }
}

fn parse_secs<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(secs) => Some(secs),
        Err(e) => {
            tracing::warn!("Ignoring invalid {}={:?}: {}", key, raw, e);
            None
        }
    }
}
