//! Argon2id key derivation, parameterized per `spec.md` §4.C.
//!
//! Grounded on `crypto::argon2(pass, salt, secret, size)` in
//! `examples/original_source/common/crypto.h`/`secrets.cpp`, with the
//! password/salt/secret roles fixed by `spec.md` §4.D rather than by the
//! original (which passes the pairing PIN as the password; the spec
//! explicitly calls for an empty password and a fixed deployment salt, so
//! that governs here).

use crate::error::{CryptoError, Result};
use argon2::{Algorithm, Argon2, Params, Version};

const LANES: u32 = 2;
const THREADS: u32 = 2;
const MEM_COST_KIB: u32 = 65536;

/// The fixed salt used for session-secret derivation. Argon2 requires at
/// least 8 bytes of salt; this is a protocol constant, not a per-session
/// random value, since the uniqueness here comes from the DH secret.
pub const SESSION_SECRET_SALT: &[u8] = b"wivrn-session-secret-salt";

/// Derives `output_len` bytes of key material from `(password, salt,
/// secret)` using Argon2id with the spec's fixed parameters.
pub fn derive(password: &[u8], salt: &[u8], secret: &[u8], output_len: usize) -> Result<Vec<u8>> {
    if salt.len() < 8 {
        return Err(CryptoError::Kdf("salt must be at least 8 bytes".into()));
    }
    // `t_cost` (iteration count) isn't named in the spec's parameter triple
    // (lanes=2, threads=2, memcost=65536); 2 is used here since `threads` in
    // the original OpenSSL-backed implementation is conflated with the
    // iteration count when lanes == threads. See DESIGN.md.
    let params = Params::new(MEM_COST_KIB, THREADS, LANES, Some(output_len))
        .map_err(|e| CryptoError::Kdf(e.to_string()))?;
    let argon2 = Argon2::new_with_secret(secret, Algorithm::Argon2id, Version::V0x13, params)
        .map_err(|e| CryptoError::Kdf(e.to_string()))?;
    let mut output = vec![0u8; output_len];
    argon2
        .hash_password_into(password, salt, &mut output)
        .map_err(|e| CryptoError::Kdf(e.to_string()))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let dh = [7u8; 32];
        let a = derive(b"", SESSION_SECRET_SALT, &dh, 80).unwrap();
        let b = derive(b"", SESSION_SECRET_SALT, &dh, 80).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 80);
    }

    #[test]
    fn different_secrets_derive_different_keys() {
        let a = derive(b"", SESSION_SECRET_SALT, &[1u8; 32], 80).unwrap();
        let b = derive(b"", SESSION_SECRET_SALT, &[2u8; 32], 80).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_short_salt() {
        assert!(derive(b"", b"short", &[0u8; 32], 16).is_err());
    }
}
