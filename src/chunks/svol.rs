//! `SVOL`: volume packaging. The only chunk whose payload is streamed rather
//! than buffered; CRC is always zero and unchecked (see [`crate::chunk`]).

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{PayloadError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeType {
    Directory = 0,
    Iscsi = 1,
    Lvm = 2,
    NetFs = 3,
    Rbd = 4,
    Zfs = 5,
    LxcRootfs = 6,
}

// The JSON config carries volume type as the same numeric enum used on the
// wire, so config round-trips without a separate string-name mapping.
impl Serialize for VolumeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for VolumeType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let v = u8::deserialize(deserializer)?;
        VolumeType::from_u8(v).map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

impl VolumeType {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Self::Directory),
            1 => Ok(Self::Iscsi),
            2 => Ok(Self::Lvm),
            3 => Ok(Self::NetFs),
            4 => Ok(Self::Rbd),
            5 => Ok(Self::Zfs),
            6 => Ok(Self::LxcRootfs),
            _ => Err(PayloadError::UnknownEnum { field: "volume_type", value: v }.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeFormat {
    Raw = 0,
    Qcow2 = 1,
    Vmdk = 2,
}

impl VolumeFormat {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Self::Raw),
            1 => Ok(Self::Qcow2),
            2 => Ok(Self::Vmdk),
            _ => Err(PayloadError::UnknownEnum { field: "volume_format", value: v }.into()),
        }
    }
}

const QCOW2_MAGIC: [u8; 4] = [0x51, 0x46, 0x49, 0xFB];
const VMDK_MAGIC: [u8; 4] = [0x4B, 0x44, 0x4D, 0x56];

/// Sniff a volume format from the first 4 bytes observed in the stream.
/// Fewer than 4 bytes total always sniffs as `raw`.
pub fn sniff_format(lead: &[u8]) -> VolumeFormat {
    if lead.len() < 4 {
        return VolumeFormat::Raw;
    }
    let head = &lead[..4];
    if head == QCOW2_MAGIC {
        VolumeFormat::Qcow2
    } else if head == VMDK_MAGIC {
        VolumeFormat::Vmdk
    } else {
        VolumeFormat::Raw
    }
}

#[derive(Debug, Clone)]
pub struct SvolHeader {
    pub volume_type: VolumeType,
    pub format: VolumeFormat,
    pub id: String,
}

impl SvolHeader {
    /// The header-only payload preceding the raw volume bytes: `7 + id.len()`.
    pub fn build(&self) -> Vec<u8> {
        let id_bytes = self.id.as_bytes();
        let mut out = Vec::with_capacity(7 + id_bytes.len());
        out.push(self.volume_type as u8);
        out.push(self.format as u8);
        out.push(id_bytes.len() as u8);
        out.extend_from_slice(id_bytes);
        out.extend_from_slice(&[0u8; 4]);
        out
    }

    pub fn header_len(id: &str) -> usize {
        7 + id.len()
    }

    /// Parse the fixed-shape header prefix; `payload` must be exactly the
    /// `7 + id_len` header bytes, not the trailing volume stream.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < 7 {
            return Err(PayloadError::Malformed {
                chunk: "SVOL",
                reason: "payload shorter than fixed header".into(),
            }
            .into());
        }
        let volume_type = VolumeType::from_u8(payload[0])?;
        let format = VolumeFormat::from_u8(payload[1])?;
        let id_len = payload[2] as usize;
        if payload.len() != 7 + id_len {
            return Err(PayloadError::Malformed {
                chunk: "SVOL",
                reason: format!("expected {} header bytes, got {}", 7 + id_len, payload.len()),
            }
            .into());
        }
        let id = String::from_utf8(payload[3..3 + id_len].to_vec()).map_err(|_| {
            PayloadError::Malformed { chunk: "SVOL", reason: "volume id is not valid UTF-8".into() }
        })?;
        for (i, &b) in payload[3 + id_len..7 + id_len].iter().enumerate() {
            if b != 0 {
                return Err(PayloadError::ReservedNonZero(3 + id_len + i).into());
            }
        }
        Ok(SvolHeader { volume_type, format, id })
    }
}
