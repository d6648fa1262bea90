//! Frame format of the file store's append-only log.
//!
//! ```text
//! | magic "CRKB" (4) | payload_len u32 LE (4) | payload | crc32 LE (4) |
//!
//! payload := count u32 LE, then `count` ops:
//!   put    := 0x01 | klen u32 | key | vlen u32 | value
//!   delete := 0x02 | klen u32 | key
//! ```
//!
//! The CRC covers header and payload. Every write, single or batched, is
//! exactly one frame, so a torn write loses a whole frame and never part of
//! one.

use crate::error::{StorageError, StorageResult};
use crate::store::BatchOp;
use std::io::{self, Read};

/// Frame magic bytes.
pub(crate) const FRAME_MAGIC: [u8; 4] = *b"CRKB";

/// magic (4) + payload length (4)
pub(crate) const HEADER_SIZE: usize = 8;

const CRC_SIZE: usize = 4;

const OP_PUT: u8 = 1;
const OP_DELETE: u8 = 2;

/// One operation decoded from a frame.
///
/// Values are not copied out; `value_at` is the value's offset from the
/// start of the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FrameEntry {
    Put {
        key: Vec<u8>,
        value_at: usize,
        value_len: usize,
    },
    Delete {
        key: Vec<u8>,
    },
}

/// A complete frame.
#[derive(Debug)]
pub(crate) struct Frame {
    /// Total encoded length including header and CRC.
    pub(crate) len: usize,
    pub(crate) entries: Vec<FrameEntry>,
}

/// Result of reading one frame from the log.
#[derive(Debug)]
pub(crate) enum ReadOutcome {
    /// A frame passed its checksum.
    Frame(Frame),
    /// Clean end of log.
    End,
    /// The bytes at this position do not form a valid frame.
    Damaged(String),
}

/// Encodes `ops` as a single frame.
///
/// # Errors
///
/// Returns `TooLarge` if any length does not fit its `u32` field; nothing
/// is encoded in that case.
pub(crate) fn encode_frame(ops: &[BatchOp]) -> StorageResult<EncodedFrame> {
    let mut payload = Vec::new();
    let mut entries = Vec::with_capacity(ops.len());
    payload.extend_from_slice(&len_u32("batch", ops.len())?.to_le_bytes());

    for op in ops {
        match op {
            BatchOp::Put { key, value } => {
                payload.push(OP_PUT);
                put_bytes(&mut payload, "key", key)?;
                payload.extend_from_slice(&len_u32("value", value.len())?.to_le_bytes());
                entries.push(FrameEntry::Put {
                    key: key.clone(),
                    value_at: HEADER_SIZE + payload.len(),
                    value_len: value.len(),
                });
                payload.extend_from_slice(value);
            }
            BatchOp::Delete { key } => {
                payload.push(OP_DELETE);
                put_bytes(&mut payload, "key", key)?;
                entries.push(FrameEntry::Delete { key: key.clone() });
            }
        }
    }

    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    bytes.extend_from_slice(&FRAME_MAGIC);
    bytes.extend_from_slice(&len_u32("batch payload", payload.len())?.to_le_bytes());
    bytes.extend_from_slice(&payload);
    let crc = compute_crc32(&bytes);
    bytes.extend_from_slice(&crc.to_le_bytes());

    Ok(EncodedFrame {
        frame: Frame {
            len: bytes.len(),
            entries,
        },
        bytes,
    })
}

/// An encoded frame together with its decoded view.
#[derive(Debug)]
pub(crate) struct EncodedFrame {
    pub(crate) frame: Frame,
    pub(crate) bytes: Vec<u8>,
}

fn put_bytes(buf: &mut Vec<u8>, what: &'static str, bytes: &[u8]) -> StorageResult<()> {
    buf.extend_from_slice(&len_u32(what, bytes.len())?.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Narrows a length to its on-disk `u32` field.
fn len_u32(what: &'static str, len: usize) -> StorageResult<u32> {
    u32::try_from(len).map_err(|_| StorageError::TooLarge { what, len })
}

/// Reads the next frame from `reader`.
///
/// `remaining` is the number of log bytes left from the reader's position;
/// a length field pointing past it marks the frame as damaged without
/// allocating for it.
///
/// # Errors
///
/// Returns an I/O error only for failed reads. Malformed bytes are reported
/// as [`ReadOutcome::Damaged`].
pub(crate) fn read_frame<R: Read>(reader: &mut R, remaining: u64) -> io::Result<ReadOutcome> {
    if remaining == 0 {
        return Ok(ReadOutcome::End);
    }
    if remaining < (HEADER_SIZE + CRC_SIZE) as u64 {
        return Ok(ReadOutcome::Damaged("truncated frame header".to_string()));
    }

    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;
    if header[..4] != FRAME_MAGIC {
        return Ok(ReadOutcome::Damaged("invalid frame magic".to_string()));
    }

    let payload_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    let total_len = HEADER_SIZE + payload_len + CRC_SIZE;
    if total_len as u64 > remaining {
        return Ok(ReadOutcome::Damaged("truncated frame body".to_string()));
    }

    let mut body = vec![0u8; payload_len + CRC_SIZE];
    reader.read_exact(&mut body)?;
    let (payload, crc) = body.split_at(payload_len);

    let stored_crc = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
    let computed_crc = crc32_update(crc32_update(0xFFFF_FFFF, &header), payload) ^ 0xFFFF_FFFF;
    if stored_crc != computed_crc {
        return Ok(ReadOutcome::Damaged(format!(
            "checksum mismatch: expected {stored_crc:08x}, got {computed_crc:08x}"
        )));
    }

    match decode_payload(payload) {
        Ok(entries) => Ok(ReadOutcome::Frame(Frame {
            len: total_len,
            entries,
        })),
        Err(message) => Ok(ReadOutcome::Damaged(message)),
    }
}

fn decode_payload(payload: &[u8]) -> Result<Vec<FrameEntry>, String> {
    let mut pos = 0;
    let count = read_u32(payload, &mut pos)? as usize;
    // Each op is at least tag + key length
    if count > payload.len() / 5 {
        return Err(format!("implausible op count {count}"));
    }

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let tag = *payload.get(pos).ok_or("truncated op tag")?;
        pos += 1;
        let key = read_bytes(payload, &mut pos)?.to_vec();
        match tag {
            OP_PUT => {
                let value_len = read_u32(payload, &mut pos)? as usize;
                let value_at = pos;
                if payload.len() - pos < value_len {
                    return Err("truncated value".to_string());
                }
                pos += value_len;
                entries.push(FrameEntry::Put {
                    key,
                    value_at: HEADER_SIZE + value_at,
                    value_len,
                });
            }
            OP_DELETE => entries.push(FrameEntry::Delete { key }),
            other => return Err(format!("unknown op tag {other}")),
        }
    }

    if pos != payload.len() {
        return Err("trailing bytes in frame payload".to_string());
    }
    Ok(entries)
}

fn read_u32(buf: &[u8], pos: &mut usize) -> Result<u32, String> {
    let bytes = buf
        .get(*pos..*pos + 4)
        .ok_or_else(|| "truncated length field".to_string())?;
    *pos += 4;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_bytes<'a>(buf: &'a [u8], pos: &mut usize) -> Result<&'a [u8], String> {
    let len = read_u32(buf, pos)? as usize;
    let bytes = buf
        .get(*pos..*pos + len)
        .ok_or_else(|| "truncated key".to_string())?;
    *pos += len;
    Ok(bytes)
}

const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

fn crc32_update(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    crc
}

/// CRC32 (IEEE) of `data`.
pub(crate) fn compute_crc32(data: &[u8]) -> u32 {
    !crc32_update(0xFFFF_FFFF, data)
}
