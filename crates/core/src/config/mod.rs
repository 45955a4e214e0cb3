use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{Curve, Result};

/// Top-level configuration structure for a runtime instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub frame: FrameConfig,
    pub bridge: BridgeConfig,
    pub animation: AnimationConfig,
}

impl RuntimeConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a config file. Missing fields fall back to their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }
}

/// Cadence of the frame clock that drives low-latency timers and animations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FrameConfig {
    pub interval_ms: u64,
}

impl FrameConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self { interval_ms: 16 }
    }
}

/// Polling cadence of the full-capability side of the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    pub poll_interval_ms: u64,
}

impl BridgeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 4,
        }
    }
}

/// Defaults for animations requested by events that omit them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnimationConfig {
    pub default_duration_ms: u64,
    pub default_curve: Curve,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            default_duration_ms: 300,
            default_curve: Curve::EaseInOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RuntimeConfig::from_json_str(r#"{ "bridge": { "pollIntervalMs": 8 } }"#)
            .unwrap();

        assert_eq!(config.bridge.poll_interval(), Duration::from_millis(8));
        assert_eq!(config.frame.interval(), Duration::from_millis(16));
        assert_eq!(config.animation.default_curve, Curve::EaseInOut);
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let config = RuntimeConfig::from_json_str(r#"{ "frame": { "intervalMs": 0 } }"#).unwrap();
        assert_eq!(config.frame.interval(), Duration::from_millis(1));
    }

    #[test]
    fn rejects_malformed_files() {
        assert!(RuntimeConfig::from_json_str("{ frame").is_err());
    }
}
