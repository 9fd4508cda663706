//! `IEND`: empty terminator chunk.

use crate::error::{PayloadError, Result};

pub fn build() -> Vec<u8> {
    Vec::new()
}

pub fn parse(payload: &[u8]) -> Result<()> {
    if !payload.is_empty() {
        return Err(PayloadError::Malformed { chunk: "IEND", reason: "payload must be empty".into() }.into());
    }
    Ok(())
}
