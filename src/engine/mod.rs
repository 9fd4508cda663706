//! Encode/decode orchestrators driving the chunk layer in the fixed order
//! `IHDR -> [ENCR] -> CONF -> SVOL* -> IEND`.

pub mod decoder;
pub mod encoder;

pub use decoder::{ArchiveInfo, DecodedHeader, Decoder};
pub use encoder::Encoder;
