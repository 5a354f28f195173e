use thiserror::Error;

/// Transport-level failures: connection loss, short reads on a framed
/// stream, or system errors. Fatal for the session that hit them.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("reliable frame had zero length, a protocol violation")]
    ZeroLengthFrame,

    #[error("peer closed the reliable channel")]
    ConnectionClosed,

    #[error("deserialization failed: {0}")]
    Deserialization(#[from] wivrn_proto::DeserializationError),

    #[error("cipher error: {0}")]
    Crypto(#[from] wivrn_crypto::CryptoError),
}

pub type Result<T> = std::result::Result<T, TransportError>;
