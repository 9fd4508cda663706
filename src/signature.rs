//! The fixed 8-byte PXI prelude, mirroring PNG's signature-plus-line-ending trick.

use std::io::{Read, Write};

use crate::error::{EngineError, Result};

pub const SIGNATURE: [u8; 8] = [0x50, 0x58, 0x49, 0x00, 0x0D, 0x0A, 0x1A, 0x0A];

pub fn write(w: &mut impl Write) -> Result<()> {
    w.write_all(&SIGNATURE)?;
    Ok(())
}

pub fn check(r: &mut impl Read) -> Result<()> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf).map_err(|_| EngineError::BadSignature)?;
    if buf != SIGNATURE {
        return Err(EngineError::BadSignature);
    }
    Ok(())
}
