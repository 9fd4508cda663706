use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("unexpected end of input while reading chunk frame")]
    ShortRead,
    #[error("chunk CRC mismatch: expected {expected:08x}, computed {actual:08x}")]
    CrcMismatch { expected: u32, actual: u32 },
    #[error("declared chunk length {0} exceeds maximum allowed")]
    LengthOverflow(u64),
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed {chunk} payload: {reason}")]
    Malformed { chunk: &'static str, reason: String },
    #[error("unknown enum value {value} for {field}")]
    UnknownEnum { field: &'static str, value: u8 },
    #[error("non-zero reserved byte at offset {0}")]
    ReservedNonZero(usize),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
    #[error("AEAD decryption failed (authentication tag rejected)")]
    DecryptFailed,
    #[error("AEAD encryption failed: {0}")]
    EncryptFailed(String),
    #[error("encryption stream used after close")]
    StreamClosed,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("bad PXI signature")]
    BadSignature,
    #[error("unexpected chunk type {got:?}, expected one of {expected}")]
    UnexpectedChunk { got: [u8; 4], expected: &'static str },
    #[error("unsupported option: {0}")]
    UnsupportedOption(String),
    #[error("volume producer failed for volume {id}: {reason}")]
    VolumeProducer { id: String, reason: String },
    #[error(transparent)]
    Chunk(#[from] ChunkError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
