//! Narrow interfaces to the external collaborators that actually move
//! volume bytes: per-volume-type backup producers on encode, and per-path
//! restore consumers on decode. Concrete producers (LVM/ZFS/RBD/QEMU-qcow2)
//! are the caller's responsibility; only the `rootfs` tar-extraction
//! consumer ships here, because restoring a container's filesystem tree is
//! core engine behavior rather than an external collaborator.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;

use crate::chunks::svol::VolumeType;
use crate::error::{EngineError, Result};

/// The id restore() treats specially: its volume stream is a POSIX tar of a
/// container filesystem, extracted rather than written verbatim.
pub const ROOTFS_VOLUME_ID: &str = "rootfs";

/// Supplies the raw byte stream for one volume during encode. Implementations
/// for concrete backing stores (LVM snapshots, ZFS sends, RBD exports, qemu
/// qcow2 conversion) live outside this crate and are invoked by the caller.
pub trait VolumeProducer {
    fn produce(&mut self, path: &str) -> Result<Box<dyn Read + '_>>;
}

/// Receives the raw byte stream for one volume during restore.
pub trait VolumeConsumer {
    fn consume(&mut self, stream: &mut dyn Read) -> Result<()>;
}

/// Writes a volume's bytes verbatim into a truncated regular file.
pub struct FileConsumer {
    dest: std::path::PathBuf,
}

impl FileConsumer {
    pub fn new(dest: impl Into<std::path::PathBuf>) -> Self {
        FileConsumer { dest: dest.into() }
    }
}

impl VolumeConsumer for FileConsumer {
    fn consume(&mut self, stream: &mut dyn Read) -> Result<()> {
        if let Some(parent) = self.dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&self.dest)?;
        io::copy(stream, &mut file)?;
        Ok(())
    }
}

/// Extracts a POSIX tar stream into a directory, recreating its tree.
/// Matches the original's `restoreLXC` behavior of starting from an empty
/// directory: any pre-existing contents at `dest` are removed first.
pub struct RootfsTarConsumer {
    dest: std::path::PathBuf,
}

impl RootfsTarConsumer {
    pub fn new(dest: impl Into<std::path::PathBuf>) -> Self {
        RootfsTarConsumer { dest: dest.into() }
    }
}

impl VolumeConsumer for RootfsTarConsumer {
    fn consume(&mut self, stream: &mut dyn Read) -> Result<()> {
        if self.dest.exists() {
            fs::remove_dir_all(&self.dest)?;
        }
        fs::create_dir_all(&self.dest)?;
        let mut archive = tar::Archive::new(stream);
        archive.unpack(&self.dest)?;
        Ok(())
    }
}

/// Picks the built-in consumer for a restore target: `rootfs` extracts a
/// tar tree, everything else is written verbatim.
pub fn consumer_for(id: &str, dest: impl Into<std::path::PathBuf>) -> Box<dyn VolumeConsumer> {
    if id == ROOTFS_VOLUME_ID {
        Box::new(RootfsTarConsumer::new(dest))
    } else {
        Box::new(FileConsumer::new(dest))
    }
}

/// iSCSI volumes are a reference to a block device, not packable data.
pub fn reject_if_iscsi(volume_type: VolumeType) -> Result<()> {
    if volume_type == VolumeType::Iscsi {
        return Err(EngineError::UnsupportedOption("iSCSI volumes cannot be packaged".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn rejects_iscsi() {
        assert!(reject_if_iscsi(VolumeType::Iscsi).is_err());
        assert!(reject_if_iscsi(VolumeType::Lvm).is_ok());
    }

    #[test]
    fn file_consumer_writes_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("vol.img");
        let mut consumer = FileConsumer::new(&dest);
        consumer.consume(&mut &b"payload bytes"[..]).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"payload bytes");
    }

    #[test]
    fn rootfs_consumer_extracts_tar() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("rootfs");

        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(5);
        header.set_cksum();
        builder.append_data(&mut header, "hello.txt", &b"world"[..]).unwrap();
        let tar_bytes = builder.into_inner().unwrap();

        let mut consumer = RootfsTarConsumer::new(&dest);
        consumer.consume(&mut tar_bytes.as_slice()).unwrap();
        assert_eq!(fs::read(dest.join("hello.txt")).unwrap(), b"world");
    }
}
