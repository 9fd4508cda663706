//! Decode orchestrators: `FullRead`/`Restore` drive the same streaming
//! volume-drain; `InfoRead` can stop at `ENCR` without deriving a key.

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt};

use crate::chunk::{self, ChunkError};
use crate::chunks::svol::SvolHeader;
use crate::chunks::{conf, encr, iend, ihdr};
use crate::config::InstanceConfig;
use crate::crypto;
use crate::error::{CryptoError, EngineError, PayloadError, Result};
use crate::signature;
use crate::volume;

#[derive(Debug, Clone)]
pub struct DecodedHeader {
    pub version: u8,
    pub instance_type: ihdr::InstanceType,
    pub encryption: ihdr::Encryption,
}

#[derive(Debug, Clone)]
pub struct ArchiveInfo {
    pub header: DecodedHeader,
    pub config: Option<InstanceConfig>,
    pub volume_ids: Vec<String>,
}

pub struct Decoder<R> {
    source: R,
}

impl<R: Read> Decoder<R> {
    pub fn new(source: R) -> Self {
        Decoder { source }
    }

    /// Parses the whole archive, invoking `on_volume` once per `SVOL` with
    /// its header and a reader bounded to exactly that volume's bytes. The
    /// callback need not drain the reader fully; any remainder is discarded
    /// before the next chunk is parsed.
    pub fn full_read(
        mut self,
        password: Option<&[u8]>,
        mut on_volume: impl FnMut(&SvolHeader, &mut dyn Read) -> Result<()>,
    ) -> Result<(DecodedHeader, InstanceConfig)> {
        signature::check(&mut self.source)?;
        let header = read_ihdr(&mut self.source)?;
        let decoded_header = DecodedHeader {
            version: header.version,
            instance_type: header.instance_type,
            encryption: header.encryption,
        };

        if header.encryption == ihdr::Encryption::Aes256Gcm {
            let encr = read_encr(&mut self.source)?;
            let pwd = password.ok_or_else(|| {
                EngineError::Crypto(CryptoError::KeyDerivation("password required for encrypted archive".into()))
            })?;
            let key = crypto::derive_key(pwd, &encr.salt)?;
            let mut reader = crypto::DecryptReader::new(self.source, &key, encr.nonce);
            let config = read_conf(&mut reader)?;
            drain_volumes(&mut reader, &mut on_volume)?;
            Ok((decoded_header, config))
        } else {
            let config = read_conf(&mut self.source)?;
            drain_volumes(&mut self.source, &mut on_volume)?;
            Ok((decoded_header, config))
        }
    }

    /// Inspects header metadata without necessarily deriving a key. When
    /// `skip_encrypted` is set and the archive is encrypted, returns right
    /// after `ENCR` with `config: None` and no volume ids.
    pub fn info_read(mut self, password: Option<&[u8]>, skip_encrypted: bool) -> Result<ArchiveInfo> {
        signature::check(&mut self.source)?;
        let header = read_ihdr(&mut self.source)?;
        let decoded_header = DecodedHeader {
            version: header.version,
            instance_type: header.instance_type,
            encryption: header.encryption,
        };

        if header.encryption == ihdr::Encryption::Aes256Gcm {
            let encr = read_encr(&mut self.source)?;
            if skip_encrypted {
                return Ok(ArchiveInfo { header: decoded_header, config: None, volume_ids: Vec::new() });
            }
            let pwd = password.ok_or_else(|| {
                EngineError::Crypto(CryptoError::KeyDerivation("password required for encrypted archive".into()))
            })?;
            let key = crypto::derive_key(pwd, &encr.salt)?;
            let mut reader = crypto::DecryptReader::new(self.source, &key, encr.nonce);
            let config = read_conf(&mut reader)?;
            let volume_ids = scan_volume_ids(&mut reader)?;
            Ok(ArchiveInfo { header: decoded_header, config: Some(config), volume_ids })
        } else {
            let config = read_conf(&mut self.source)?;
            let volume_ids = scan_volume_ids(&mut self.source)?;
            Ok(ArchiveInfo { header: decoded_header, config: Some(config), volume_ids })
        }
    }

    /// Walks the whole structure (frame lengths, CRCs, chunk ordering,
    /// payload shapes) without writing volume bytes anywhere. Without a
    /// password, an encrypted archive can only be checked up to `ENCR`.
    pub fn validate_structure(mut self, password: Option<&[u8]>) -> Result<()> {
        signature::check(&mut self.source)?;
        let header = read_ihdr(&mut self.source)?;
        if header.encryption == ihdr::Encryption::Aes256Gcm {
            let encr = read_encr(&mut self.source)?;
            if let Some(pwd) = password {
                let key = crypto::derive_key(pwd, &encr.salt)?;
                let mut reader = crypto::DecryptReader::new(self.source, &key, encr.nonce);
                validate_body(&mut reader)?;
            }
            Ok(())
        } else {
            validate_body(&mut self.source)
        }
    }

    /// Streams every volume into the destination `dest_for` resolves for its
    /// id (`rootfs` is tar-extracted, everything else written verbatim), and
    /// writes the recovered configuration to `config_out` as input-schema
    /// JSON.
    pub fn restore(
        self,
        password: Option<&[u8]>,
        dest_for: impl Fn(&str) -> PathBuf,
        config_out: &Path,
    ) -> Result<InstanceConfig> {
        let (_, config) = self.full_read(password, |svol_header, body| {
            let dest = dest_for(&svol_header.id);
            let mut consumer = volume::consumer_for(&svol_header.id, dest);
            consumer.consume(body)
        })?;
        std::fs::write(config_out, config.to_input_json()?)?;
        Ok(config)
    }
}

fn read_frame_prefix<R: Read>(r: &mut R) -> Result<(u64, [u8; 4])> {
    let length = r.read_u64::<BigEndian>().map_err(|_| ChunkError::ShortRead)?;
    let mut tag = [0u8; 4];
    r.read_exact(&mut tag).map_err(|_| ChunkError::ShortRead)?;
    Ok((length, tag))
}

fn read_ihdr<R: Read>(r: &mut R) -> Result<ihdr::Ihdr> {
    let c = chunk::read_chunk(r)?;
    if c.tag != chunk::TAG_IHDR {
        return Err(EngineError::UnexpectedChunk { got: c.tag, expected: "IHDR" });
    }
    ihdr::Ihdr::parse(&c.payload)
}

fn read_encr<R: Read>(r: &mut R) -> Result<encr::Encr> {
    let c = chunk::read_chunk(r)?;
    if c.tag != chunk::TAG_ENCR {
        return Err(EngineError::UnexpectedChunk { got: c.tag, expected: "ENCR" });
    }
    encr::Encr::parse(&c.payload)
}

fn read_conf<R: Read>(r: &mut R) -> Result<InstanceConfig> {
    let c = chunk::read_chunk(r)?;
    if c.tag != chunk::TAG_CONF {
        return Err(EngineError::UnexpectedChunk { got: c.tag, expected: "CONF" });
    }
    conf::parse(&c.payload)
}

/// Reads `SVOL` chunks (invoking `on_volume` for each) until `IEND`.
fn drain_volumes<R: Read>(
    r: &mut R,
    on_volume: &mut dyn FnMut(&SvolHeader, &mut dyn Read) -> Result<()>,
) -> Result<()> {
    loop {
        let (length, tag) = read_frame_prefix(r)?;
        if tag == chunk::TAG_IEND {
            let mut payload = vec![0u8; length as usize];
            r.read_exact(&mut payload).map_err(|_| ChunkError::ShortRead)?;
            let stored_crc = r.read_u32::<BigEndian>().map_err(|_| ChunkError::ShortRead)?;
            let computed = chunk::crc32(&payload);
            if computed != stored_crc {
                return Err(ChunkError::CrcMismatch { expected: stored_crc, actual: computed }.into());
            }
            iend::parse(&payload)?;
            return Ok(());
        }
        if tag != chunk::TAG_SVOL {
            return Err(EngineError::UnexpectedChunk { got: tag, expected: "SVOL or IEND" });
        }

        let mut prefix = [0u8; 3];
        r.read_exact(&mut prefix).map_err(|_| ChunkError::ShortRead)?;
        let id_len = prefix[2] as usize;
        let mut rest = vec![0u8; 4 + id_len];
        r.read_exact(&mut rest).map_err(|_| ChunkError::ShortRead)?;
        let mut header_bytes = Vec::with_capacity(7 + id_len);
        header_bytes.extend_from_slice(&prefix);
        header_bytes.extend_from_slice(&rest);
        let header = SvolHeader::parse(&header_bytes)?;

        let header_len = header_bytes.len() as u64;
        if length < header_len {
            return Err(
                PayloadError::Malformed { chunk: "SVOL", reason: "declared length shorter than header".into() }
                    .into(),
            );
        }
        let body_len = length - header_len;

        let mut body = r.by_ref().take(body_len);
        on_volume(&header, &mut body)?;
        io::copy(&mut body, &mut io::sink())?;
        r.read_u32::<BigEndian>().map_err(|_| ChunkError::ShortRead)?;
    }
}

fn scan_volume_ids<R: Read>(r: &mut R) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    drain_volumes(r, &mut |header, body| {
        io::copy(body, &mut io::sink())?;
        ids.push(header.id.clone());
        Ok(())
    })?;
    Ok(ids)
}

/// Verifies the CONF chunk's frame and CRC without deserializing its JSON,
/// so an archive with perfectly sound framing but a forward-incompatible
/// config schema still validates structurally.
fn validate_body<R: Read>(r: &mut R) -> Result<()> {
    let c = chunk::read_chunk(r)?;
    if c.tag != chunk::TAG_CONF {
        return Err(EngineError::UnexpectedChunk { got: c.tag, expected: "CONF" });
    }
    drain_volumes(r, &mut |_header, body| {
        io::copy(body, &mut io::sink())?;
        Ok(())
    })
}
