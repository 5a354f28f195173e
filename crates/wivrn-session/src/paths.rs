//! XDG base-directory resolution and the per-install cookie.
//!
//! Grounded on `directories`' `ProjectDirs` usage in
//! `examples/eisbaw-ost/src/config.rs`-style config/storage crates in the
//! pack; resolves `$XDG_DATA_HOME`/`$XDG_CONFIG_HOME` for the `wivrn`
//! qualifier rather than hand-rolling `$HOME` concatenation (spec.md §6).

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rand::RngCore;

use crate::error::{Result, SessionError};

const COOKIE_FILE: &str = "cookie";
const COOKIE_LEN: usize = 16;

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "wivrn")
}

pub fn default_data_dir() -> Result<PathBuf> {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| SessionError::Io(std::io::Error::other("could not resolve XDG data directory")))
}

pub fn default_config_dir() -> Result<PathBuf> {
    project_dirs()
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| SessionError::Io(std::io::Error::other("could not resolve XDG config directory")))
}

/// A random 128-bit value persisted once per install, read back to give
/// mDNS a stable `cookie` TXT field across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallCookie(pub [u8; COOKIE_LEN]);

impl InstallCookie {
    pub fn generate() -> Self {
        let mut bytes = [0u8; COOKIE_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        InstallCookie(bytes)
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    /// Loads the cookie from `dir/cookie`, generating and persisting a new
    /// one if absent. The file's content is the raw hex string.
    pub fn load_or_create(dir: &Path) -> Result<Self> {
        let path = dir.join(COOKIE_FILE);
        if let Ok(content) = std::fs::read_to_string(&path) {
            if let Some(cookie) = Self::from_hex(content.trim()) {
                return Ok(cookie);
            }
        }
        let cookie = Self::generate();
        std::fs::create_dir_all(dir)?;
        std::fs::write(&path, cookie.to_hex())?;
        Ok(cookie)
    }

    fn from_hex(s: &str) -> Option<Self> {
        let bytes: [u8; COOKIE_LEN] = hex::decode(s).ok()?.try_into().ok()?;
        Some(InstallCookie(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_round_trips_through_hex() {
        let cookie = InstallCookie::generate();
        let parsed = InstallCookie::from_hex(&cookie.to_hex()).unwrap();
        assert_eq!(cookie, parsed);
    }

    #[test]
    fn load_or_create_persists_across_calls() {
        let dir = tempfile_dir();
        let first = InstallCookie::load_or_create(&dir).unwrap();
        let second = InstallCookie::load_or_create(&dir).unwrap();
        assert_eq!(first, second);
        std::fs::remove_dir_all(&dir).ok();
    }

    fn tempfile_dir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("wivrn-session-test-{:x}", rand::random::<u64>()));
        dir
    }
}
