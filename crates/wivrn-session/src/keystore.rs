//! The paired-headset key store, persisted as `keys.json`.
//!
//! Grounded on spec.md §6 ("Server keeps `$XDG_DATA_HOME/wivrn/keys.json`
//! with the list of paired public keys and display names") and §9's note
//! that the pairing-key store is process-wide state that should be
//! encapsulated behind a small service with explicit init/teardown rather
//! than free functions — `KeyStore` is that service.

use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairedHeadset {
    #[serde(with = "hex_bytes")]
    pub public_key: [u8; 32],
    pub display_name: String,
    pub paired_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct KeyStoreFile {
    headsets: Vec<PairedHeadset>,
}

/// Known paired headsets, loaded once at startup and flushed to disk after
/// every successful pairing.
pub struct KeyStore {
    path: PathBuf,
    file: KeyStoreFile,
}

impl KeyStore {
    /// Loads `path` if it exists, or starts with an empty store.
    pub fn load(path: PathBuf) -> Result<Self> {
        let file = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => KeyStoreFile::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(KeyStore { path, file })
    }

    pub fn contains(&self, public_key: &[u8; 32]) -> bool {
        self.file.headsets.iter().any(|h| &h.public_key == public_key)
    }

    pub fn display_name(&self, public_key: &[u8; 32]) -> Option<&str> {
        self.file
            .headsets
            .iter()
            .find(|h| &h.public_key == public_key)
            .map(|h| h.display_name.as_str())
    }

    /// Records a newly paired headset and persists the store immediately —
    /// pairing is rare and loss of this write would force a repeat of the
    /// SMP exchange, so it's not worth batching.
    pub fn add(&mut self, public_key: [u8; 32], display_name: String) -> Result<()> {
        self.file.headsets.retain(|h| h.public_key != public_key);
        self.file.headsets.push(PairedHeadset {
            public_key,
            display_name,
            paired_at: now_rfc3339(),
        });
        self.save()
    }

    pub fn headsets(&self) -> &[PairedHeadset] {
        &self.file.headsets
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&self.file)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> std::result::Result<S::Ok, S::Error> {
        hex::encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<[u8; 32], D::Error> {
        let hex = String::deserialize(deserializer)?;
        let bytes = hex::decode(&hex).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes of hex-encoded key"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("wivrn-keystore-test-{:x}", rand::random::<u64>()));
        dir.push("keys.json");
        dir
    }

    #[test]
    fn fresh_store_has_no_known_headsets() {
        let store = KeyStore::load(scratch_path()).unwrap();
        assert!(!store.contains(&[1u8; 32]));
    }

    #[test]
    fn added_headset_persists_and_reloads() {
        let path = scratch_path();
        {
            let mut store = KeyStore::load(path.clone()).unwrap();
            store.add([7u8; 32], "Quest".to_string()).unwrap();
        }
        let reloaded = KeyStore::load(path.clone()).unwrap();
        assert!(reloaded.contains(&[7u8; 32]));
        assert_eq!(reloaded.display_name(&[7u8; 32]), Some("Quest"));
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn re_adding_same_key_replaces_rather_than_duplicates() {
        let path = scratch_path();
        let mut store = KeyStore::load(path.clone()).unwrap();
        store.add([3u8; 32], "First Name".to_string()).unwrap();
        store.add([3u8; 32], "Renamed".to_string()).unwrap();
        assert_eq!(store.headsets().len(), 1);
        assert_eq!(store.display_name(&[3u8; 32]), Some("Renamed"));
        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }
}
