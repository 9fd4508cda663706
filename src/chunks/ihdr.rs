//! `IHDR`: the fixed 16-byte header chunk, always first.

use crate::error::{PayloadError, Result};

pub const CURRENT_VERSION: u8 = 1;
pub const PAYLOAD_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceType {
    Docker = 0,
    Lxc = 1,
    Qemu = 2,
}

impl InstanceType {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Self::Docker),
            1 => Ok(Self::Lxc),
            2 => Ok(Self::Qemu),
            _ => Err(PayloadError::UnknownEnum { field: "instance_type", value: v }.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None = 0,
}

impl Compression {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Self::None),
            _ => Err(PayloadError::UnknownEnum { field: "compression", value: v }.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    None = 0,
    Aes256Gcm = 1,
}

impl Encryption {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Self::None),
            1 => Ok(Self::Aes256Gcm),
            _ => Err(PayloadError::UnknownEnum { field: "encryption", value: v }.into()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Ihdr {
    pub version: u8,
    pub instance_type: InstanceType,
    pub compression: Compression,
    pub encryption: Encryption,
}

impl Ihdr {
    pub fn build(&self) -> [u8; PAYLOAD_LEN] {
        let mut out = [0u8; PAYLOAD_LEN];
        out[0] = self.version;
        out[1] = self.instance_type as u8;
        out[2] = self.compression as u8;
        out[3] = self.encryption as u8;
        out
    }

    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() != PAYLOAD_LEN {
            return Err(PayloadError::Malformed {
                chunk: "IHDR",
                reason: format!("expected {PAYLOAD_LEN} bytes, got {}", payload.len()),
            }
            .into());
        }
        // Only the first four reserved bytes are checked; the rest are spare.
        for (i, &b) in payload[4..8].iter().enumerate() {
            if b != 0 {
                return Err(PayloadError::ReservedNonZero(4 + i).into());
            }
        }
        Ok(Ihdr {
            version: payload[0],
            instance_type: InstanceType::from_u8(payload[1])?,
            compression: Compression::from_u8(payload[2])?,
            encryption: Encryption::from_u8(payload[3])?,
        })
    }
}
