use thiserror::Error;

/// Session-level failures: everything above the transport/crypto layers.
/// `ProtocolMismatch` and `PairingRejected` are fatal at handshake time;
/// `DecoderError` is reported as feedback and never propagated past the
/// call site that produced it; `QueueClosed` is the expected shutdown
/// sentinel, not a real failure.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("deserialization failed: {0}")]
    Deserialization(#[from] wivrn_proto::DeserializationError),

    #[error("transport error: {0}")]
    Transport(#[from] wivrn_transport::TransportError),

    #[error("crypto error: {0}")]
    Crypto(#[from] wivrn_crypto::CryptoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persisted state is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("protocol version mismatch: local={local:#x} peer={peer:#x}")]
    ProtocolMismatch { local: u64, peer: u64 },

    #[error("unexpected message during handshake: {0}")]
    UnexpectedMessage(&'static str),

    #[error("pairing rejected: SMP secret did not match")]
    PairingRejected,

    #[error("decoder error: {0}")]
    DecoderError(String),

    #[error("queue closed")]
    QueueClosed,
}

pub type Result<T> = std::result::Result<T, SessionError>;
