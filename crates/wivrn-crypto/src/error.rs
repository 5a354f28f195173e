use thiserror::Error;

/// Fatal cryptographic failures: key generation, DH, KDF, or cipher init.
/// Per the session's error policy these always tear the connection down.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("diffie-hellman exchange failed: {0}")]
    DiffieHellman(String),

    #[error("argon2id key derivation failed: {0}")]
    Kdf(String),

    #[error("cipher initialization failed: {0}")]
    CipherInit(String),

    #[error("RSA key encapsulation failed: {0}")]
    Encapsulation(String),

    #[error("pairing rejected: SMP verification failed")]
    PairingRejected,

    #[error("malformed key material: expected {expected} bytes, got {actual}")]
    MalformedKey { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, CryptoError>;
