//! Configuration system.
//!
//! Loads world-sync configuration from JSON strings/files.

use std::{path::Path, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Root configuration shared by client/server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Authority listen address, e.g. `127.0.0.1:40000`.
    pub server_addr: String,
    /// Client frame rate; one synchronization tick per frame.
    pub tick_hz: u32,
    /// Character name sent on world entry (client only).
    #[serde(default = "default_player_name")]
    pub player_name: String,
    /// Maximum distance at which an entity is tracked locally.
    #[serde(default = "default_visibility_radius")]
    pub visibility_radius: f32,
    /// Delay between hiding a deleted entity and disposing it.
    #[serde(default = "default_disposal_delay_ms")]
    pub disposal_delay_ms: u64,
    /// Age after which an unmaterialized placeholder is dropped. `None` keeps
    /// placeholders forever.
    #[serde(default = "default_pending_timeout_ms")]
    pub pending_timeout_ms: Option<u64>,
}

fn default_player_name() -> String {
    "Player".to_string()
}

fn default_visibility_radius() -> f32 {
    100.0
}

fn default_disposal_delay_ms() -> u64 {
    500
}

fn default_pending_timeout_ms() -> Option<u64> {
    Some(30_000)
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:40000".to_string(),
            tick_hz: 60,
            player_name: default_player_name(),
            visibility_radius: default_visibility_radius(),
            disposal_delay_ms: default_disposal_delay_ms(),
            pending_timeout_ms: default_pending_timeout_ms(),
        }
    }
}

impl SyncConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and parses a JSON config file.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn disposal_delay(&self) -> Duration {
        Duration::from_millis(self.disposal_delay_ms)
    }

    pub fn pending_timeout(&self) -> Option<Duration> {
        self.pending_timeout_ms.map(Duration::from_millis)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.tick_hz.max(1) as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let cfg = SyncConfig::from_json_str(r#"{"server_addr":"10.0.0.1:5000","tick_hz":30}"#)
            .unwrap();
        assert_eq!(cfg.server_addr, "10.0.0.1:5000");
        assert_eq!(cfg.visibility_radius, 100.0);
        assert_eq!(cfg.disposal_delay(), Duration::from_millis(500));
        assert_eq!(cfg.pending_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn null_pending_timeout_disables_reaper() {
        let cfg = SyncConfig::from_json_str(
            r#"{"server_addr":"x","tick_hz":60,"pending_timeout_ms":null}"#,
        )
        .unwrap();
        assert_eq!(cfg.pending_timeout(), None);
    }
}
