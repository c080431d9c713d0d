//! Binary framing for WAL records.
//!
//! Every record is JSON wrapped in a checksummed header and a CRC32 trailer:
//!
//! ```text
//! [version: 1 byte][length: 4 bytes LE][header crc32: 4 bytes LE]
//! [data: N bytes JSON][crc32: 4 bytes LE]
//! ```
//!
//! The header checksum covers version and length, so a damaged length is
//! reported as corruption instead of being mistaken for a frame that runs past
//! the end of the file. Only a short read behind a verified header, or a
//! header that is itself incomplete, counts as a torn write.

use std::io::{ErrorKind, Read, Write};

use crc32fast::Hasher;
use serde::{de::DeserializeOwned, Serialize};

use crate::storage::traits::StorageError;

/// Current frame version.
pub const CODEC_VERSION: u8 = 1;

/// Magic bytes opening every refsel log.
pub const MAGIC: [u8; 4] = *b"RSEL";

/// Header length in bytes: magic plus version.
pub const HEADER_LEN: u64 = 5;

/// Frame header length: version, payload length and header checksum.
pub const FRAME_HEADER_LEN: usize = 9;

/// Upper bound on a single frame payload.
const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Outcome of reading one frame.
#[derive(Debug)]
pub enum Frame<T> {
    /// A complete, verified record.
    Record(T),
    /// Clean end of stream.
    End,
    /// The stream ended partway through a frame.
    Torn,
}

fn io_err(e: &std::io::Error) -> StorageError {
    StorageError::Io(e.to_string())
}

fn checksum(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Builds the verified header for a payload of `len` bytes.
#[must_use]
pub fn frame_header(len: u32) -> [u8; FRAME_HEADER_LEN] {
    let mut head = [0u8; FRAME_HEADER_LEN];
    head[0] = CODEC_VERSION;
    head[1..5].copy_from_slice(&len.to_le_bytes());
    let crc = checksum(&head[..5]);
    head[5..].copy_from_slice(&crc.to_le_bytes());
    head
}

/// Serializes a value into one checksummed frame.
///
/// # Errors
/// `Serialization` if the value cannot be encoded or is too large.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    let data = serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
    if data.len() > MAX_FRAME_SIZE {
        return Err(StorageError::Serialization(format!(
            "frame of {} bytes exceeds maximum {MAX_FRAME_SIZE}",
            data.len()
        )));
    }

    #[allow(clippy::cast_possible_truncation)]
    let len = data.len() as u32;

    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + data.len() + 4);
    out.extend_from_slice(&frame_header(len));
    out.extend_from_slice(&data);
    out.extend_from_slice(&checksum(&data).to_le_bytes());
    Ok(out)
}

/// Reads as many bytes as are available up to `buf.len()`.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize, StorageError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(io_err(&e)),
        }
    }
    Ok(filled)
}

/// Reads and verifies the next frame.
///
/// # Errors
/// `Corrupted` on a header checksum mismatch, an unknown version, an
/// oversized length, a payload checksum mismatch or undecodable JSON; `Io` on
/// read failure.
pub fn decode<T: DeserializeOwned>(reader: &mut impl Read) -> Result<Frame<T>, StorageError> {
    let mut head = [0u8; FRAME_HEADER_LEN];
    match fill(reader, &mut head)? {
        0 => return Ok(Frame::End),
        n if n < head.len() => return Ok(Frame::Torn),
        _ => {}
    }

    let stored = u32::from_le_bytes([head[5], head[6], head[7], head[8]]);
    let computed = checksum(&head[..5]);
    if stored != computed {
        return Err(StorageError::Corrupted(format!(
            "frame header CRC mismatch: stored={stored:08x}, computed={computed:08x}"
        )));
    }

    if head[0] != CODEC_VERSION {
        return Err(StorageError::Corrupted(format!(
            "unsupported frame version {} (expected {CODEC_VERSION})",
            head[0]
        )));
    }

    let len = u32::from_le_bytes([head[1], head[2], head[3], head[4]]) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(StorageError::Corrupted(format!(
            "frame length {len} exceeds maximum {MAX_FRAME_SIZE}"
        )));
    }

    let mut data = vec![0u8; len];
    if fill(reader, &mut data)? < len {
        return Ok(Frame::Torn);
    }

    let mut crc_bytes = [0u8; 4];
    if fill(reader, &mut crc_bytes)? < crc_bytes.len() {
        return Ok(Frame::Torn);
    }
    let stored = u32::from_le_bytes(crc_bytes);
    let computed = checksum(&data);
    if stored != computed {
        return Err(StorageError::Corrupted(format!(
            "CRC mismatch: stored={stored:08x}, computed={computed:08x}"
        )));
    }

    serde_json::from_slice(&data)
        .map(Frame::Record)
        .map_err(|e| StorageError::Corrupted(format!("undecodable record: {e}")))
}

/// Writes the log header.
///
/// # Errors
/// `Io` on write failure.
pub fn write_header(writer: &mut impl Write) -> Result<(), StorageError> {
    writer.write_all(&MAGIC).map_err(|e| io_err(&e))?;
    writer.write_all(&[CODEC_VERSION]).map_err(|e| io_err(&e))
}

/// Reads and validates the log header.
///
/// # Errors
/// `Corrupted` on wrong magic or version; `Io` on read failure.
pub fn read_header(reader: &mut impl Read) -> Result<(), StorageError> {
    let mut header = [0u8; 5];
    if fill(reader, &mut header)? < header.len() {
        return Err(StorageError::Corrupted("log header is truncated".to_string()));
    }
    if header[..4] != MAGIC {
        return Err(StorageError::Corrupted(format!(
            "invalid magic bytes: expected {MAGIC:?}, got {:?}",
            &header[..4]
        )));
    }
    if header[4] != CODEC_VERSION {
        return Err(StorageError::Corrupted(format!(
            "unsupported log version {} (expected {CODEC_VERSION})",
            header[4]
        )));
    }
    Ok(())
}
