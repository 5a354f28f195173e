//! AES-CTR-like stream cipher for in-place channel encryption.
//!
//! Grounded on `crypto::cipher_context`/`encrypt_context`/`decrypt_context`
//! in `examples/original_source/common/crypto.h` (zero-copy
//! `encrypt_in_place`/`decrypt_in_place` over spans) and on
//! `examples/eisbaw-ost/src/calling/srtp.rs`'s `Ctr128BE<Aes128>` usage for
//! the idiomatic Rust shape of an AES-CTR keystream. CTR is its own
//! inverse, so one type serves both directions; the control and stream
//! channels differ only in how the IV is assembled (§4.C/§6).

use std::sync::atomic::{AtomicU64, Ordering};

use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};

use crate::error::{CryptoError, Result};

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

pub const KEY_LEN: usize = 16;
pub const CONTROL_IV_LEN: usize = 16;
pub const STREAM_IV_PREFIX_LEN: usize = 8;

/// Encrypts/decrypts the reliable (control) channel: one fixed 16-byte IV
/// per direction, reused for the lifetime of the session since the
/// underlying transport is ordered and lossless — but the keystream itself
/// must keep advancing across every call, the same way a persistent
/// `EVP_CIPHER_CTX` is never reset between `encrypt_in_place` calls in
/// `examples/original_source/common/crypto.h`. `position` tracks how many
/// keystream bytes this direction has consumed so far; reconstructing the
/// cipher from `(key, iv)` and seeking to `position` on each call continues
/// the same CTR byte stream a fresh `Aes128Ctr` instance would have
/// produced if it had never been dropped, rather than restarting at block
/// zero for every message — restarting would XOR every message in a given
/// direction with an identical keystream prefix, a many-time pad.
pub struct ControlCipher {
    key: [u8; KEY_LEN],
    iv: [u8; CONTROL_IV_LEN],
    position: AtomicU64,
}

impl ControlCipher {
    pub fn new(key: [u8; KEY_LEN], iv: [u8; CONTROL_IV_LEN]) -> Self {
        ControlCipher {
            key,
            iv,
            position: AtomicU64::new(0),
        }
    }

    /// Encrypts/decrypts `data` in place, continuing the keystream from
    /// wherever the previous call on this instance left off. CTR mode XORs
    /// a keystream with the plaintext, so encrypt and decrypt are the same
    /// transform as long as both sides advance through the same keystream
    /// in the same order — guaranteed here since the reliable channel is
    /// ordered and lossless.
    pub fn apply_keystream(&self, data: &mut [u8]) -> Result<()> {
        let position = self.position.fetch_add(data.len() as u64, Ordering::SeqCst);
        let mut cipher = Aes128Ctr::new((&self.key).into(), (&self.iv).into());
        cipher.seek(position);
        cipher.apply_keystream(data);
        Ok(())
    }
}

/// Encrypts/decrypts the datagram (stream) channel: the low 8 bytes of the
/// 128-bit CTR counter are the per-datagram sequence number carried on the
/// wire (§6); the high 8 bytes are a fixed per-direction prefix derived at
/// handshake time.
pub struct StreamCipherKey {
    key: [u8; KEY_LEN],
    iv_prefix: [u8; STREAM_IV_PREFIX_LEN],
}

impl StreamCipherKey {
    pub fn new(key: [u8; KEY_LEN], iv_prefix: [u8; STREAM_IV_PREFIX_LEN]) -> Self {
        StreamCipherKey { key, iv_prefix }
    }

    /// Encrypts/decrypts one datagram's payload using `counter` as the low
    /// half of the IV.
    pub fn apply_keystream(&self, counter: u64, data: &mut [u8]) -> Result<()> {
        let mut iv = [0u8; 16];
        iv[..STREAM_IV_PREFIX_LEN].copy_from_slice(&self.iv_prefix);
        iv[STREAM_IV_PREFIX_LEN..].copy_from_slice(&counter.to_le_bytes());
        let mut cipher = Aes128Ctr::new((&self.key).into(), (&iv).into());
        cipher.apply_keystream(data);
        Ok(())
    }
}

pub fn key_from_slice(slice: &[u8]) -> Result<[u8; KEY_LEN]> {
    slice.try_into().map_err(|_| CryptoError::MalformedKey {
        expected: KEY_LEN,
        actual: slice.len(),
    })
}
