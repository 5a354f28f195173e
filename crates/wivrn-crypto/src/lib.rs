//! Cryptographic primitives for the WiVRn session handshake: DH/RSA
//! keypairs, the AES-CTR-like channel cipher, Argon2id session-secret
//! derivation, and the SMP pairing PAKE.

pub mod cipher;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod secrets;
pub mod smp;

pub use cipher::{ControlCipher, StreamCipherKey};
pub use error::{CryptoError, Result};
pub use keys::{DhKeypair, RsaKeypair, WrappedSecret};
pub use secrets::Secrets;
pub use smp::Smp;
