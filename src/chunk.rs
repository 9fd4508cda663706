//! Length-prefixed, type-tagged, CRC-protected chunk framing.
//!
//! Every record past the signature has the shape
//! `length(8 BE) ‖ type(4) ‖ payload(length) ‖ crc(4 BE)`.

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{ChunkError, Result};

/// Chunks larger than this are rejected outright; guards against a corrupt
/// length field turning into an unbounded allocation.
pub const MAX_CHUNK_LEN: u64 = 1 << 40;

pub const TAG_IHDR: [u8; 4] = *b"IHDR";
pub const TAG_ENCR: [u8; 4] = *b"ENCR";
pub const TAG_CONF: [u8; 4] = *b"CONF";
pub const TAG_SVOL: [u8; 4] = *b"SVOL";
pub const TAG_IEND: [u8; 4] = *b"IEND";

/// CRC-32/IEEE over payload bytes only. Empty payload yields `0`.
pub fn crc32(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

/// A fully materialized, non-streamed chunk (everything but SVOL).
#[derive(Debug, Clone)]
pub struct Chunk {
    pub tag: [u8; 4],
    pub payload: Vec<u8>,
}

/// Write a complete chunk (header, payload, CRC) in one call.
pub fn write_chunk(w: &mut impl Write, tag: [u8; 4], payload: &[u8]) -> Result<()> {
    w.write_u64::<BigEndian>(payload.len() as u64)?;
    w.write_all(&tag)?;
    w.write_all(payload)?;
    w.write_u32::<BigEndian>(crc32(payload))?;
    Ok(())
}

/// Read one complete chunk, verifying its CRC for every tag but `SVOL`.
/// `SVOL` payloads are streamed rather than materialized here; the engine's
/// decoder parses their header and bounds their body directly off the frame.
pub fn read_chunk(r: &mut impl Read) -> Result<Chunk> {
    let length = r.read_u64::<BigEndian>().map_err(|_| ChunkError::ShortRead)?;
    if length > MAX_CHUNK_LEN {
        return Err(ChunkError::LengthOverflow(length).into());
    }
    let mut tag = [0u8; 4];
    r.read_exact(&mut tag).map_err(|_| ChunkError::ShortRead)?;
    let mut payload = vec![0u8; length as usize];
    r.read_exact(&mut payload).map_err(|_| ChunkError::ShortRead)?;
    let stored_crc = r.read_u32::<BigEndian>().map_err(|_| ChunkError::ShortRead)?;

    if tag != TAG_SVOL {
        let computed = crc32(&payload);
        if computed != stored_crc {
            return Err(ChunkError::CrcMismatch { expected: stored_crc, actual: computed }.into());
        }
    }
    Ok(Chunk { tag, payload })
}
