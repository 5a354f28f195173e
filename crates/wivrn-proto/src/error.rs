use thiserror::Error;

/// Failure raised while decoding a wire-format buffer.
///
/// Every variant is fatal to the channel that produced it: the accumulator
/// and session runtime never attempt to resynchronize a corrupted stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeserializationError {
    #[error("buffer underflow: need {needed} bytes, {remaining} remaining")]
    BufferUnderflow { needed: usize, remaining: usize },

    #[error("variant tag {tag} out of range (expected < {count})")]
    InvalidVariantTag { tag: u32, count: u32 },

    #[error("string or vector length {len} exceeds remaining buffer of {remaining} bytes")]
    OversizeLength { len: usize, remaining: usize },
}

pub type Result<T> = std::result::Result<T, DeserializationError>;
