//! The fixed-layout session-secrets record and its derivation.
//!
//! Grounded on `examples/original_source/common/secrets.h`/`.cpp`'s
//! `secrets` struct and constructor, adjusted to `spec.md` §4.D's explicit
//! derivation inputs (empty password, fixed deployment salt, DH output as
//! the Argon2id "secret" parameter) rather than the original's
//! PIN-as-password scheme — see DESIGN.md for why the spec's statement
//! takes precedence here.

use crate::cipher::{CONTROL_IV_LEN, KEY_LEN, STREAM_IV_PREFIX_LEN};
use crate::error::Result;
use crate::kdf::{self, SESSION_SECRET_SALT};

/// Total byte length of the derived record: matches Argon2id's
/// caller-sized output requirement (`sizeof(secrets)` in the original).
pub const SECRETS_LEN: usize =
    KEY_LEN + CONTROL_IV_LEN + CONTROL_IV_LEN + KEY_LEN + STREAM_IV_PREFIX_LEN + STREAM_IV_PREFIX_LEN;

/// Per-direction keys and IVs derived once per session from the DH secret.
#[derive(Clone)]
pub struct Secrets {
    pub control_key: [u8; KEY_LEN],
    pub control_iv_to_headset: [u8; CONTROL_IV_LEN],
    pub control_iv_from_headset: [u8; CONTROL_IV_LEN],
    pub stream_key: [u8; KEY_LEN],
    pub stream_iv_header_to_headset: [u8; STREAM_IV_PREFIX_LEN],
    pub stream_iv_header_from_headset: [u8; STREAM_IV_PREFIX_LEN],
}

impl Secrets {
    /// Derives the session secrets from a shared DH output. Both peers
    /// compute the same `dh` value and so derive identical secrets
    /// independently; nothing else is exchanged.
    pub fn derive(dh: &[u8]) -> Result<Self> {
        let bytes = kdf::derive(b"", SESSION_SECRET_SALT, dh, SECRETS_LEN)?;
        Ok(Self::from_bytes(&bytes))
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        debug_assert_eq!(bytes.len(), SECRETS_LEN);
        let mut offset = 0;
        let mut take = |len: usize| {
            let slice = &bytes[offset..offset + len];
            offset += len;
            slice
        };
        Secrets {
            control_key: take(KEY_LEN).try_into().unwrap(),
            control_iv_to_headset: take(CONTROL_IV_LEN).try_into().unwrap(),
            control_iv_from_headset: take(CONTROL_IV_LEN).try_into().unwrap(),
            stream_key: take(KEY_LEN).try_into().unwrap(),
            stream_iv_header_to_headset: take(STREAM_IV_PREFIX_LEN).try_into().unwrap(),
            stream_iv_header_from_headset: take(STREAM_IV_PREFIX_LEN).try_into().unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_from_same_dh_matches() {
        let dh = [9u8; 32];
        let a = Secrets::derive(&dh).unwrap();
        let b = Secrets::derive(&dh).unwrap();
        assert_eq!(a.control_key, b.control_key);
        assert_eq!(a.stream_iv_header_to_headset, b.stream_iv_header_to_headset);
    }

    #[test]
    fn direction_keys_are_distinct() {
        let secrets = Secrets::derive(&[1u8; 32]).unwrap();
        assert_ne!(
            secrets.control_iv_to_headset,
            secrets.control_iv_from_headset
        );
        assert_ne!(
            secrets.stream_iv_header_to_headset,
            secrets.stream_iv_header_from_headset
        );
    }
}
