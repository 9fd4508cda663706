//! Argon2id key derivation and the AES-256-GCM segment stream that wraps
//! `CONF`, every `SVOL`, and `IEND` when encryption is enabled.

use std::io::{self, Read, Write};

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{CryptoError, Result};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const SEGMENT_SIZE: usize = 16384;

// Fixed by the wire format, not the usual Argon2id defaults: readers and
// writers must agree on these or keys silently diverge.
const ARGON2_TIME_COST: u32 = 1;
const ARGON2_MEM_COST_KIB: u32 = 64 * 1024;
const ARGON2_PARALLELISM: u32 = 4;

pub fn derive_key(password: &[u8], salt: &[u8]) -> Result<[u8; KEY_LEN]> {
    if password.is_empty() {
        return Err(CryptoError::KeyDerivation("password must not be empty".into()).into());
    }
    let params = Params::new(ARGON2_MEM_COST_KIB, ARGON2_TIME_COST, ARGON2_PARALLELISM, Some(KEY_LEN))
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut out = [0u8; KEY_LEN];
    argon2
        .hash_password_into(password, salt, &mut out)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(out)
}

pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// Per-segment nonce: base nonce with its last 8 bytes overwritten by the
/// little-endian-within-those-bytes encoding of `counter` (byte[11] holds
/// bits 0..7, down to byte[4] holding bits 56..63).
fn segment_nonce(base: &[u8; NONCE_LEN], counter: u64) -> [u8; NONCE_LEN] {
    let mut nonce = *base;
    for i in 0u32..8 {
        nonce[11 - i as usize] = ((counter >> (i * 8)) & 0xFF) as u8;
    }
    nonce
}

fn to_io_err(e: impl std::error::Error + Send + Sync + 'static) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

/// Buffers plaintext into fixed 16384-byte segments, each written as
/// `len(u32 BE) || ciphertext`. Must be explicitly [`close`](Self::close)d so
/// the final, possibly short, segment is flushed.
pub struct EncryptWriter<W: Write> {
    inner: W,
    cipher: Aes256Gcm,
    base_nonce: [u8; NONCE_LEN],
    counter: u64,
    buffer: Vec<u8>,
    closed: bool,
}

impl<W: Write> EncryptWriter<W> {
    pub fn new(inner: W, key: &[u8; KEY_LEN], base_nonce: [u8; NONCE_LEN]) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        EncryptWriter { inner, cipher, base_nonce, counter: 0, buffer: Vec::with_capacity(SEGMENT_SIZE), closed: false }
    }

    fn flush_segment(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let nonce_bytes = segment_nonce(&self.base_nonce, self.counter);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, self.buffer.as_slice())
            .map_err(|e| CryptoError::EncryptFailed(e.to_string()))?;
        self.inner.write_u32::<BigEndian>(ciphertext.len() as u32)?;
        self.inner.write_all(&ciphertext)?;
        self.counter += 1;
        self.buffer.clear();
        Ok(())
    }

    /// Flush the final (possibly short) segment and return the inner sink.
    pub fn close(mut self) -> Result<W> {
        if self.closed {
            return Err(CryptoError::StreamClosed.into());
        }
        self.flush_segment()?;
        self.closed = true;
        Ok(self.inner)
    }
}

impl<W: Write> Write for EncryptWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(to_io_err(CryptoError::StreamClosed));
        }
        let mut remaining = buf;
        let mut written = 0;
        while !remaining.is_empty() {
            let space = SEGMENT_SIZE - self.buffer.len();
            let take = space.min(remaining.len());
            self.buffer.extend_from_slice(&remaining[..take]);
            remaining = &remaining[take..];
            written += take;
            if self.buffer.len() == SEGMENT_SIZE {
                self.flush_segment().map_err(to_io_err)?;
            }
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reads the segment framing produced by [`EncryptWriter`], exposing the
/// decrypted plaintext as a contiguous byte stream.
pub struct DecryptReader<R: Read> {
    inner: R,
    cipher: Aes256Gcm,
    base_nonce: [u8; NONCE_LEN],
    counter: u64,
    buffer: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl<R: Read> DecryptReader<R> {
    pub fn new(inner: R, key: &[u8; KEY_LEN], base_nonce: [u8; NONCE_LEN]) -> Self {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        DecryptReader { inner, cipher, base_nonce, counter: 0, buffer: Vec::new(), pos: 0, eof: false }
    }

    fn fill_segment(&mut self) -> io::Result<()> {
        let ct_len = match self.inner.read_u32::<BigEndian>() {
            Ok(len) => len as usize,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                self.eof = true;
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let mut ciphertext = vec![0u8; ct_len];
        self.inner.read_exact(&mut ciphertext)?;
        let nonce_bytes = segment_nonce(&self.base_nonce, self.counter);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext.as_slice())
            .map_err(|_| to_io_err(CryptoError::DecryptFailed))?;
        self.counter += 1;
        self.buffer = plaintext;
        self.pos = 0;
        Ok(())
    }
}

impl<R: Read> Read for DecryptReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.buffer.len() && !self.eof {
            self.fill_segment()?;
        }
        if self.pos >= self.buffer.len() {
            return Ok(0);
        }
        let n = (self.buffer.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
