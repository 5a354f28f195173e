//! Server-side runtime configuration, persisted as `config.json`.
//!
//! Grounded on spec.md §6's persisted-state list and the teacher's
//! `Default`-then-load-then-save config pattern.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;

fn default_listen_port() -> u16 {
    9757
}

fn default_codec() -> PreferredCodec {
    PreferredCodec::H265
}

fn default_bitrate_kbps() -> u32 {
    50_000
}

fn default_tracking_rate_hz() -> u32 {
    250
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferredCodec {
    H264,
    H265,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_codec")]
    pub preferred_codec: PreferredCodec,
    #[serde(default = "default_bitrate_kbps")]
    pub bitrate_kbps: u32,
    #[serde(default = "default_tracking_rate_hz")]
    pub tracking_rate_hz: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_port: default_listen_port(),
            preferred_codec: default_codec(),
            bitrate_kbps: default_bitrate_kbps(),
            tracking_rate_hz: default_tracking_rate_hz(),
        }
    }
}

impl Config {
    /// Loads `path` if present, otherwise returns the default config
    /// without touching disk — the caller decides whether to persist it.
    pub fn load(path: &PathBuf) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = Config::default();
        assert_eq!(config.listen_port, 9757);
        assert_eq!(config.preferred_codec, PreferredCodec::H265);
    }

    #[test]
    fn missing_file_yields_default_without_creating_it() {
        let mut path = std::env::temp_dir();
        path.push(format!("wivrn-config-test-{:x}.json", rand::random::<u64>()));
        let config = Config::load(&path).unwrap();
        assert_eq!(config.listen_port, 9757);
        assert!(!path.exists());
    }

    #[test]
    fn round_trips_through_disk() {
        let mut path = std::env::temp_dir();
        path.push(format!("wivrn-config-test-{:x}.json", rand::random::<u64>()));
        let mut config = Config::default();
        config.bitrate_kbps = 80_000;
        config.save(&path).unwrap();
        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.bitrate_kbps, 80_000);
        std::fs::remove_file(&path).ok();
    }
}
