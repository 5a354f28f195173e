//! Keypairs used in the handshake: X25519/X448 for Diffie-Hellman, RSA for
//! key encapsulation. Mirrors `crypto::key` in the original implementation,
//! minus the OpenSSL `EVP_PKEY` wrapper — each algorithm gets its own typed
//! Rust keypair instead of one dynamically-typed handle.

use crate::error::{CryptoError, Result};
use rand_core::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

/// An ephemeral or long-term Diffie-Hellman keypair.
///
/// `spec.md` names X25519 as the pairing/session workhorse and X448 as an
/// alternative curve; both share the same DH contract so callers don't need
/// to branch on which one is in use except when persisting to PEM.
pub enum DhKeypair {
    X25519 {
        secret: x25519_dalek::StaticSecret,
        public: x25519_dalek::PublicKey,
    },
    X448 {
        secret: x448::Secret,
        public: x448::PublicKey,
    },
}

impl DhKeypair {
    pub fn generate_x25519() -> Self {
        let secret = x25519_dalek::StaticSecret::random_from_rng(OsRng);
        let public = x25519_dalek::PublicKey::from(&secret);
        DhKeypair::X25519 { secret, public }
    }

    pub fn generate_x448() -> Result<Self> {
        let secret = x448::Secret::new(&mut OsRng);
        let public = x448::PublicKey::from(&secret);
        Ok(DhKeypair::X448 { secret, public })
    }

    pub fn public_key_bytes(&self) -> Vec<u8> {
        match self {
            DhKeypair::X25519 { public, .. } => public.as_bytes().to_vec(),
            DhKeypair::X448 { public, .. } => public.as_bytes().to_vec(),
        }
    }

    /// Computes the shared secret with a peer's public key, encoded the same
    /// way `public_key_bytes` produces it (32 bytes for X25519, 56 for X448).
    pub fn diffie_hellman(&self, peer_public: &[u8]) -> Result<Vec<u8>> {
        match self {
            DhKeypair::X25519 { secret, .. } => {
                let bytes: [u8; 32] = peer_public.try_into().map_err(|_| {
                    CryptoError::MalformedKey {
                        expected: 32,
                        actual: peer_public.len(),
                    }
                })?;
                let peer = x25519_dalek::PublicKey::from(bytes);
                Ok(secret.diffie_hellman(&peer).as_bytes().to_vec())
            }
            DhKeypair::X448 { secret, .. } => {
                let bytes: [u8; 56] = peer_public.try_into().map_err(|_| {
                    CryptoError::MalformedKey {
                        expected: 56,
                        actual: peer_public.len(),
                    }
                })?;
                let peer = x448::PublicKey::from_bytes(&bytes).ok_or_else(|| {
                    CryptoError::DiffieHellman("peer X448 public key is not on curve".into())
                })?;
                let shared = secret
                    .as_diffie_hellman(&peer)
                    .ok_or_else(|| CryptoError::DiffieHellman("X448 DH produced identity".into()))?;
                Ok(shared.as_bytes().to_vec())
            }
        }
    }
}

/// A wrapped secret produced by RSA key encapsulation: `wrapped` travels on
/// the wire, `secret` is the value both sides now share.
pub struct WrappedSecret {
    pub wrapped: Vec<u8>,
    pub secret: Vec<u8>,
}

/// RSA-3072+ keypair used for key encapsulation (KEM) rather than DH, for
/// peers that only support RSA.
pub struct RsaKeypair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

const ENCAPSULATED_SECRET_LEN: usize = 32;

impl RsaKeypair {
    pub fn generate(bits: usize) -> Result<Self> {
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(RsaKeypair { private, public })
    }

    pub fn to_pem(&self) -> Result<String> {
        self.private
            .to_pkcs8_pem(Default::default())
            .map(|s| s.to_string())
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))
    }

    pub fn from_private_pem(pem: &str) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(RsaKeypair { private, public })
    }

    pub fn public_key_pem(&self) -> Result<String> {
        self.public
            .to_public_key_pem(Default::default())
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))
    }

    /// Generates a fresh random secret and wraps it for `self`'s peer using
    /// their RSA public key. Used on the side that does not hold the
    /// private key.
    pub fn encapsulate(peer_public_pem: &str) -> Result<WrappedSecret> {
        let peer_public = RsaPublicKey::from_public_key_pem(peer_public_pem)
            .map_err(|e| CryptoError::Encapsulation(e.to_string()))?;
        let mut secret = vec![0u8; ENCAPSULATED_SECRET_LEN];
        rand::RngCore::fill_bytes(&mut OsRng, &mut secret);
        let wrapped = peer_public
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &secret)
            .map_err(|e| CryptoError::Encapsulation(e.to_string()))?;
        Ok(WrappedSecret { wrapped, secret })
    }

    /// Recovers the secret a peer wrapped with our public key.
    pub fn decapsulate(&self, wrapped: &[u8]) -> Result<Vec<u8>> {
        self.private
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map_err(|e| CryptoError::Encapsulation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x25519_dh_is_symmetric() {
        let a = DhKeypair::generate_x25519();
        let b = DhKeypair::generate_x25519();
        let shared_a = a.diffie_hellman(&b.public_key_bytes()).unwrap();
        let shared_b = b.diffie_hellman(&a.public_key_bytes()).unwrap();
        assert_eq!(shared_a, shared_b);
        assert_eq!(shared_a.len(), 32);
    }

    #[test]
    fn x448_dh_is_symmetric() {
        let a = DhKeypair::generate_x448().unwrap();
        let b = DhKeypair::generate_x448().unwrap();
        let shared_a = a.diffie_hellman(&b.public_key_bytes()).unwrap();
        let shared_b = b.diffie_hellman(&a.public_key_bytes()).unwrap();
        assert_eq!(shared_a, shared_b);
    }

    #[test]
    fn rsa_encapsulation_round_trips() {
        let keypair = RsaKeypair::generate(3072).unwrap();
        let pem = keypair.public_key_pem().unwrap();
        let wrapped = RsaKeypair::encapsulate(&pem).unwrap();
        let recovered = keypair.decapsulate(&wrapped.wrapped).unwrap();
        assert_eq!(recovered, wrapped.secret);
    }
}
