//! PXI (Pextra Image) container engine: chunk framing, CRC-32 protection,
//! AES-256-GCM streaming encryption and volume packaging for instance
//! backups.
//!
//! Format guarantees for version 1:
//! - 8-byte PNG-style signature, then a strict `IHDR -> [ENCR] -> CONF ->
//!   SVOL* -> IEND` chunk sequence.
//! - All multi-byte integers are big-endian except the per-segment GCM
//!   nonce counter.
//! - `SVOL` chunks carry a zeroed, unchecked CRC; every other chunk's CRC is
//!   verified on read.
//! - Compression is reserved at `none`; there is no random access or
//!   in-place update.

pub mod chunk;
pub mod chunks;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod signature;
pub mod volume;

pub use config::{InstanceConfig, InstanceMetadata, InstanceVolume};
pub use engine::{ArchiveInfo, DecodedHeader, Decoder, Encoder};
pub use error::{EngineError, Result};
