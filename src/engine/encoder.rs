//! Encode orchestrator: signature -> IHDR -> [ENCR] -> CONF -> SVOL* -> IEND.

use std::collections::HashSet;
use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, WriteBytesExt};

use crate::chunk::{self, TAG_SVOL};
use crate::chunks::svol::{sniff_format, SvolHeader, VolumeFormat};
use crate::chunks::{conf, encr, iend, ihdr};
use crate::config::{InstanceConfig, InstanceMetadata, InstanceVolume};
use crate::crypto;
use crate::error::Result;
use crate::signature;
use crate::volume;

fn instance_type_for(metadata: &InstanceMetadata) -> ihdr::InstanceType {
    match metadata {
        InstanceMetadata::Qemu { .. } => ihdr::InstanceType::Qemu,
        InstanceMetadata::Lxc { .. } => ihdr::InstanceType::Lxc,
        InstanceMetadata::DockerPodman { .. } => ihdr::InstanceType::Docker,
    }
}

pub struct Encoder<W> {
    sink: W,
}

impl<W: Write + Seek> Encoder<W> {
    pub fn new(sink: W) -> Self {
        Encoder { sink }
    }

    /// Encodes `config` plus the streams `producer_for` yields for each of
    /// its non-excluded volumes. When `password` is `Some`, everything past
    /// `ENCR` is written through the AES-256-GCM segment stream and volume
    /// bytes are spilled to a temp file first so no seek is required on the
    /// encrypted path (see DESIGN.md's open-question resolution).
    pub fn encode(
        mut self,
        config: &InstanceConfig,
        password: Option<&[u8]>,
        exclude: &HashSet<String>,
        mut producer_for: impl FnMut(&InstanceVolume) -> Result<Box<dyn Read>>,
    ) -> Result<()> {
        signature::write(&mut self.sink)?;

        let encryption =
            if password.is_some() { ihdr::Encryption::Aes256Gcm } else { ihdr::Encryption::None };
        let header = ihdr::Ihdr {
            version: ihdr::CURRENT_VERSION,
            instance_type: instance_type_for(&config.metadata),
            compression: ihdr::Compression::None,
            encryption,
        };
        chunk::write_chunk(&mut self.sink, chunk::TAG_IHDR, &header.build())?;

        let crypto_ctx = match password {
            Some(pwd) => {
                let salt = crypto::random_bytes::<16>();
                let base_nonce = crypto::random_bytes::<12>();
                let key = crypto::derive_key(pwd, &salt)?;
                let encr = encr::Encr { nonce: base_nonce, aead: vec![0u8; 16], salt: salt.to_vec() };
                chunk::write_chunk(&mut self.sink, chunk::TAG_ENCR, &encr.build())?;
                Some((key, base_nonce))
            }
            None => None,
        };

        let volumes: Vec<&InstanceVolume> =
            config.volumes.iter().filter(|v| !exclude.contains(&v.id)).collect();
        for v in &volumes {
            volume::reject_if_iscsi(v.volume_type)?;
        }

        match crypto_ctx {
            Some((key, base_nonce)) => {
                let mut writer = crypto::EncryptWriter::new(&mut self.sink, &key, base_nonce);
                chunk::write_chunk(&mut writer, chunk::TAG_CONF, &conf::build(config)?)?;
                for v in &volumes {
                    let mut stream = producer_for(v)?;
                    write_svol_buffered(&mut writer, v, &mut *stream)?;
                }
                chunk::write_chunk(&mut writer, chunk::TAG_IEND, &iend::build())?;
                writer.close()?;
            }
            None => {
                chunk::write_chunk(&mut self.sink, chunk::TAG_CONF, &conf::build(config)?)?;
                for v in &volumes {
                    let mut stream = producer_for(v)?;
                    write_svol_seekable(&mut self.sink, v, &mut *stream)?;
                }
                chunk::write_chunk(&mut self.sink, chunk::TAG_IEND, &iend::build())?;
            }
        }

        Ok(())
    }
}

/// Unencrypted path: write a placeholder header, stream the volume while
/// sniffing its leading bytes, then seek back and patch length/format.
fn write_svol_seekable<W: Write + Seek>(w: &mut W, v: &InstanceVolume, stream: &mut dyn Read) -> Result<()> {
    let header = SvolHeader { volume_type: v.volume_type, format: VolumeFormat::Raw, id: v.id.clone() };

    let frame_start = w.stream_position()?;
    w.write_u64::<BigEndian>(SvolHeader::header_len(&v.id) as u64)?;
    w.write_all(&TAG_SVOL)?;
    let header_bytes_start = w.stream_position()?;
    w.write_all(&header.build())?;

    let mut lead = Vec::with_capacity(4);
    let mut total: u64 = 0;
    let mut buf = [0u8; 65536];
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        if lead.len() < 4 {
            let take = (4 - lead.len()).min(n);
            lead.extend_from_slice(&buf[..take]);
        }
        w.write_all(&buf[..n])?;
        total += n as u64;
    }
    // SVOL CRC is always zero and never verified.
    w.write_u32::<BigEndian>(0)?;
    let frame_end = w.stream_position()?;

    let format = sniff_format(&lead);
    let final_len = SvolHeader::header_len(&v.id) as u64 + total;

    w.seek(SeekFrom::Start(frame_start))?;
    w.write_u64::<BigEndian>(final_len)?;
    w.seek(SeekFrom::Start(header_bytes_start))?;
    let mut patched = header.build();
    patched[1] = format as u8;
    w.write_all(&patched)?;
    w.seek(SeekFrom::Start(frame_end))?;
    Ok(())
}

/// Encrypted path: spill the volume to a temp file while sniffing its
/// leading bytes, then emit one correctly sized SVOL frame. Avoids ever
/// seeking through the encryption wrapper.
fn write_svol_buffered<W: Write>(w: &mut W, v: &InstanceVolume, stream: &mut dyn Read) -> Result<()> {
    let mut spill = tempfile::tempfile()?;
    let mut lead = Vec::with_capacity(4);
    let mut total: u64 = 0;
    let mut buf = [0u8; 65536];
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        if lead.len() < 4 {
            let take = (4 - lead.len()).min(n);
            lead.extend_from_slice(&buf[..take]);
        }
        spill.write_all(&buf[..n])?;
        total += n as u64;
    }
    spill.seek(SeekFrom::Start(0))?;

    let format = sniff_format(&lead);
    let header = SvolHeader { volume_type: v.volume_type, format, id: v.id.clone() };
    let header_bytes = header.build();
    let final_len = header_bytes.len() as u64 + total;

    w.write_u64::<BigEndian>(final_len)?;
    w.write_all(&TAG_SVOL)?;
    w.write_all(&header_bytes)?;
    io::copy(&mut spill, w)?;
    w.write_u32::<BigEndian>(0)?;
    Ok(())
}
