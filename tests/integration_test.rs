use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};

use pxitool::chunks::svol::{VolumeFormat, VolumeType};
use pxitool::config::{InstanceConfig, InstanceMetadata, InstanceVolume};
use pxitool::engine::{Decoder, Encoder};
use pxitool::error::EngineError;
use tempfile::NamedTempFile;

fn lxc_config(volumes: Vec<InstanceVolume>) -> InstanceConfig {
    InstanceConfig {
        name: "demo".into(),
        metadata: InstanceMetadata::Lxc { distro: "debian".into(), release: "bookworm".into() },
        volumes,
    }
}

#[test]
fn empty_archive_round_trips_with_zero_volumes() {
    let archive = NamedTempFile::new().unwrap();
    let config = lxc_config(vec![]);

    let encoder = Encoder::new(File::create(archive.path()).unwrap());
    encoder.encode(&config, None, &HashSet::new(), |_v| unreachable!()).unwrap();

    let decoder = Decoder::new(File::open(archive.path()).unwrap());
    let mut seen = Vec::new();
    let (header, decoded) = decoder
        .full_read(None, |h, body| {
            seen.push(h.id.clone());
            std::io::copy(body, &mut std::io::sink())?;
            Ok(())
        })
        .unwrap();

    assert_eq!(header.version, 1);
    assert_eq!(decoded, config);
    assert!(seen.is_empty());
}

#[test]
fn single_raw_volume_round_trips_byte_exact() {
    let archive = NamedTempFile::new().unwrap();
    let config = lxc_config(vec![InstanceVolume {
        id: "vol1".into(),
        volume_type: VolumeType::Lvm,
        path: "unused".into(),
        size: None,
    }]);
    let payload = b"hello, world!".to_vec();

    let encoder = Encoder::new(File::create(archive.path()).unwrap());
    {
        let payload = payload.clone();
        encoder
            .encode(&config, None, &HashSet::new(), move |_v| Ok(Box::new(std::io::Cursor::new(payload)) as Box<dyn Read>))
            .unwrap_or_else(|_| panic!("encode failed"));
    }

    let decoder = Decoder::new(File::open(archive.path()).unwrap());
    let mut recovered = Vec::new();
    let mut format = None;
    let (_, decoded) = decoder
        .full_read(None, |h, body| {
            assert_eq!(h.id, "vol1");
            format = Some(h.format);
            body.read_to_end(&mut recovered)?;
            Ok(())
        })
        .unwrap();

    assert_eq!(decoded.volumes.len(), 1);
    assert_eq!(recovered, payload);
    assert_eq!(format, Some(VolumeFormat::Raw));
}

#[test]
fn qcow2_magic_is_sniffed_into_volume_format() {
    let archive = NamedTempFile::new().unwrap();
    let config = lxc_config(vec![InstanceVolume {
        id: "disk0".into(),
        volume_type: VolumeType::Lvm,
        path: "unused".into(),
        size: None,
    }]);
    let mut payload = vec![0x51, 0x46, 0x49, 0xFB];
    payload.extend(std::iter::repeat(0xAA).take(1020));

    let encoder = Encoder::new(File::create(archive.path()).unwrap());
    let payload_clone = payload.clone();
    encoder
        .encode(&config, None, &HashSet::new(), move |_v| {
            Ok(Box::new(std::io::Cursor::new(payload_clone)) as Box<dyn Read>)
        })
        .unwrap();

    let decoder = Decoder::new(File::open(archive.path()).unwrap());
    let mut format = None;
    decoder
        .full_read(None, |h, body| {
            format = Some(h.format);
            std::io::copy(body, &mut std::io::sink())?;
            Ok(())
        })
        .unwrap();

    assert_eq!(format, Some(VolumeFormat::Qcow2));
}

#[test]
fn encrypted_archive_round_trips_and_rejects_wrong_password() {
    let archive = NamedTempFile::new().unwrap();
    let config = lxc_config(vec![]);

    let encoder = Encoder::new(File::create(archive.path()).unwrap());
    encoder.encode(&config, Some(b"correct horse"), &HashSet::new(), |_v| unreachable!()).unwrap();

    let decoder = Decoder::new(File::open(archive.path()).unwrap());
    let (header, decoded) = decoder.full_read(Some(b"correct horse"), |_h, _b| unreachable!()).unwrap();
    assert_eq!(decoded, config);
    assert_eq!(header.encryption, pxitool::chunks::ihdr::Encryption::Aes256Gcm);

    let decoder = Decoder::new(File::open(archive.path()).unwrap());
    let err = decoder.full_read(Some(b"wrong password"), |_h, _b| unreachable!()).unwrap_err();
    assert!(matches!(err, EngineError::Crypto(_)));
}

#[test]
fn encrypted_multi_segment_volume_round_trips() {
    let archive = NamedTempFile::new().unwrap();
    let config = lxc_config(vec![InstanceVolume {
        id: "bigvol".into(),
        volume_type: VolumeType::Zfs,
        path: "unused".into(),
        size: None,
    }]);
    // Larger than one 16384-byte GCM segment so the spill-file path exercises
    // more than a single encrypt/decrypt call.
    let payload: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();

    let encoder = Encoder::new(File::create(archive.path()).unwrap());
    let payload_clone = payload.clone();
    encoder
        .encode(&config, Some(b"hunter2"), &HashSet::new(), move |_v| {
            Ok(Box::new(std::io::Cursor::new(payload_clone)) as Box<dyn Read>)
        })
        .unwrap();

    let decoder = Decoder::new(File::open(archive.path()).unwrap());
    let mut recovered = Vec::new();
    decoder
        .full_read(Some(b"hunter2"), |_h, body| {
            body.read_to_end(&mut recovered)?;
            Ok(())
        })
        .unwrap();

    assert_eq!(recovered, payload);
}

#[test]
fn bad_signature_is_rejected_before_any_chunk_parse() {
    let archive = NamedTempFile::new().unwrap();
    let mut file = File::create(archive.path()).unwrap();
    file.write_all(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]).unwrap();
    drop(file);

    let decoder = Decoder::new(File::open(archive.path()).unwrap());
    let err = decoder.full_read(None, |_h, _b| unreachable!()).unwrap_err();
    assert!(matches!(err, EngineError::BadSignature));
}

#[test]
fn corrupted_conf_crc_is_detected() {
    let archive = NamedTempFile::new().unwrap();
    let config = lxc_config(vec![]);

    let encoder = Encoder::new(File::create(archive.path()).unwrap());
    encoder.encode(&config, None, &HashSet::new(), |_v| unreachable!()).unwrap();

    let mut bytes = std::fs::read(archive.path()).unwrap();
    // Flip a bit inside the CONF chunk's JSON payload (well past signature+IHDR+length+type).
    let flip_at = bytes.len() / 2;
    bytes[flip_at] ^= 0xFF;
    std::fs::write(archive.path(), &bytes).unwrap();

    let decoder = Decoder::new(File::open(archive.path()).unwrap());
    let err = decoder.full_read(None, |_h, _b| unreachable!()).unwrap_err();
    assert!(matches!(err, EngineError::Chunk(_)) || matches!(err, EngineError::Payload(_)));
}

#[test]
fn restore_writes_verbatim_files_by_id() {
    let archive = NamedTempFile::new().unwrap();
    let config = lxc_config(vec![InstanceVolume {
        id: "data".into(),
        volume_type: VolumeType::Directory,
        path: "unused".into(),
        size: None,
    }]);
    let payload = b"restored bytes".to_vec();

    let encoder = Encoder::new(File::create(archive.path()).unwrap());
    let payload_clone = payload.clone();
    encoder
        .encode(&config, None, &HashSet::new(), move |_v| {
            Ok(Box::new(std::io::Cursor::new(payload_clone)) as Box<dyn Read>)
        })
        .unwrap();

    let out_dir = tempfile::tempdir().unwrap();
    let config_out = out_dir.path().join("config.json");
    let decoder = Decoder::new(File::open(archive.path()).unwrap());
    let recovered = decoder
        .restore(None, |id| out_dir.path().join(id), &config_out)
        .unwrap();

    assert_eq!(recovered.name, "demo");
    assert_eq!(std::fs::read(out_dir.path().join("data")).unwrap(), payload);
    assert!(config_out.exists());
}

#[test]
fn validate_structure_ignores_conf_schema_but_full_read_does_not() {
    use pxitool::chunk;
    use pxitool::chunks::{iend, ihdr};
    use pxitool::signature;

    let archive = NamedTempFile::new().unwrap();
    let mut file = File::create(archive.path()).unwrap();
    signature::write(&mut file).unwrap();
    let header = ihdr::Ihdr {
        version: ihdr::CURRENT_VERSION,
        instance_type: ihdr::InstanceType::Lxc,
        compression: ihdr::Compression::None,
        encryption: ihdr::Encryption::None,
    };
    chunk::write_chunk(&mut file, chunk::TAG_IHDR, &header.build()).unwrap();
    // Well-framed, CRC-correct CONF payload that isn't valid InstanceConfig JSON.
    chunk::write_chunk(&mut file, chunk::TAG_CONF, b"{\"not\":\"a config\"}").unwrap();
    chunk::write_chunk(&mut file, chunk::TAG_IEND, &iend::build()).unwrap();
    drop(file);

    let decoder = Decoder::new(File::open(archive.path()).unwrap());
    decoder.validate_structure(None).unwrap();

    let decoder = Decoder::new(File::open(archive.path()).unwrap());
    let err = decoder.full_read(None, |_h, _b| unreachable!()).unwrap_err();
    assert!(matches!(err, EngineError::Payload(_)));
}

#[test]
fn validate_structure_passes_on_well_formed_archive() {
    let archive = NamedTempFile::new().unwrap();
    let config = lxc_config(vec![]);

    let encoder = Encoder::new(File::create(archive.path()).unwrap());
    encoder.encode(&config, None, &HashSet::new(), |_v| unreachable!()).unwrap();

    let decoder = Decoder::new(File::open(archive.path()).unwrap());
    decoder.validate_structure(None).unwrap();
}
