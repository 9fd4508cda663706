//! `ENCR`: base nonce, reserved AEAD field and KDF salt. Present iff
//! `IHDR.encryption != none`, immediately following `IHDR`.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{PayloadError, Result};

pub const NONCE_LEN: usize = 12;
pub const MIN_AEAD_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct Encr {
    pub nonce: [u8; NONCE_LEN],
    pub aead: Vec<u8>,
    pub salt: Vec<u8>,
}

impl Encr {
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN + 4 + self.aead.len() + self.salt.len());
        out.extend_from_slice(&self.nonce);
        let mut len_buf = [0u8; 2];
        BigEndian::write_u16(&mut len_buf, self.aead.len() as u16);
        out.extend_from_slice(&len_buf);
        BigEndian::write_u16(&mut len_buf, self.salt.len() as u16);
        out.extend_from_slice(&len_buf);
        out.extend_from_slice(&self.aead);
        out.extend_from_slice(&self.salt);
        out
    }

    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < NONCE_LEN + 4 {
            return Err(PayloadError::Malformed {
                chunk: "ENCR",
                reason: "payload shorter than fixed prefix".into(),
            }
            .into());
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&payload[..NONCE_LEN]);
        let aead_len = BigEndian::read_u16(&payload[NONCE_LEN..NONCE_LEN + 2]) as usize;
        let salt_len = BigEndian::read_u16(&payload[NONCE_LEN + 2..NONCE_LEN + 4]) as usize;

        if aead_len < MIN_AEAD_LEN {
            return Err(PayloadError::Malformed {
                chunk: "ENCR",
                reason: format!("aead_len {aead_len} below minimum {MIN_AEAD_LEN}"),
            }
            .into());
        }
        let body_start = NONCE_LEN + 4;
        if payload.len() < body_start + aead_len + salt_len {
            return Err(PayloadError::Malformed {
                chunk: "ENCR",
                reason: "declared aead/salt lengths exceed payload".into(),
            }
            .into());
        }
        let aead = payload[body_start..body_start + aead_len].to_vec();
        let salt = payload[body_start + aead_len..body_start + aead_len + salt_len].to_vec();
        Ok(Encr { nonce, aead, salt })
    }
}
