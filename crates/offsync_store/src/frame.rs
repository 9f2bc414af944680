//! Log frame format.
//!
//! Every mutating store call is written as exactly one frame:
//!
//! ```text
//! magic "OSLG" (4) | version u16 (2) | kind u8 (1) | len u32 (4) | CBOR payload (len) | crc32 (4)
//! ```
//!
//! All integers are little-endian. The CRC covers every byte before it.

use crate::error::{StoreError, StoreResult};
use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Magic bytes opening every frame.
pub const FRAME_MAGIC: [u8; 4] = *b"OSLG";

/// Current frame format version.
pub const FRAME_VERSION: u16 = 1;

const HEADER_SIZE: usize = 11;
const CRC_SIZE: usize = 4;

/// One logged store mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogEntry {
    /// Schema after an upgrade.
    Schema(Schema),
    /// Full record written under `key` (insert or replace).
    Put {
        /// Target collection.
        collection: String,
        /// Primary key.
        key: String,
        /// The whole record.
        record: Value,
    },
    /// Record removed.
    Delete {
        /// Target collection.
        collection: String,
        /// Primary key.
        key: String,
    },
    /// Every record in a collection removed.
    Clear {
        /// Target collection.
        collection: String,
    },
}

impl LogEntry {
    fn kind(&self) -> u8 {
        match self {
            Self::Schema(_) => 1,
            Self::Put { .. } => 2,
            Self::Delete { .. } => 3,
            Self::Clear { .. } => 4,
        }
    }
}

/// Encodes an entry as a complete frame.
pub fn encode_frame(entry: &LogEntry) -> StoreResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(entry, &mut payload).map_err(|e| StoreError::Codec(e.to_string()))?;

    let len = u32::try_from(payload.len())
        .map_err(|_| StoreError::Codec(format!("frame payload too large: {}", payload.len())))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    frame.extend_from_slice(&FRAME_MAGIC);
    frame.extend_from_slice(&FRAME_VERSION.to_le_bytes());
    frame.push(entry.kind());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    let crc = crc32(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Outcome of scanning a raw log.
#[derive(Debug, Default)]
pub struct Scan {
    /// Decoded entries with the offset of their frame.
    pub entries: Vec<(u64, LogEntry)>,
    /// Length of the prefix made of complete frames.
    pub valid_len: u64,
    /// True if an incomplete frame followed the valid prefix.
    pub torn_tail: bool,
}

/// Decodes every complete frame in `bytes`.
///
/// An incomplete trailing frame is reported through [`Scan::torn_tail`]
/// rather than as an error: it is the expected shape of a crash mid-append.
/// A complete frame with a bad CRC, magic or version is corruption.
pub fn scan(bytes: &[u8]) -> StoreResult<Scan> {
    let mut out = Scan::default();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let offset = pos as u64;
        if bytes.len() - pos < HEADER_SIZE {
            out.torn_tail = true;
            break;
        }

        let header = &bytes[pos..pos + HEADER_SIZE];
        if header[0..4] != FRAME_MAGIC {
            return Err(StoreError::corrupted(offset, "bad frame magic"));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != FRAME_VERSION {
            return Err(StoreError::corrupted(
                offset,
                format!("unsupported frame version {version}"),
            ));
        }
        let kind = header[6];
        let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;

        let frame_end = pos + HEADER_SIZE + len + CRC_SIZE;
        if frame_end > bytes.len() {
            out.torn_tail = true;
            break;
        }

        let body_end = pos + HEADER_SIZE + len;
        let stored_crc = u32::from_le_bytes([
            bytes[body_end],
            bytes[body_end + 1],
            bytes[body_end + 2],
            bytes[body_end + 3],
        ]);
        let actual_crc = crc32(&bytes[pos..body_end]);
        if stored_crc != actual_crc {
            return Err(StoreError::corrupted(
                offset,
                format!("checksum mismatch: expected {stored_crc:08x}, got {actual_crc:08x}"),
            ));
        }

        let entry: LogEntry = ciborium::from_reader(&bytes[pos + HEADER_SIZE..body_end])
            .map_err(|e| StoreError::corrupted(offset, format!("undecodable payload: {e}")))?;
        if entry.kind() != kind {
            return Err(StoreError::corrupted(
                offset,
                format!("frame kind {kind} does not match payload"),
            ));
        }

        out.entries.push((offset, entry));
        pos = frame_end;
        out.valid_len = pos as u64;
    }

    Ok(out)
}

/// CRC-32 (IEEE polynomial).
pub fn crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut c = i as u32;
            let mut bit = 0;
            while bit < 8 {
                c = if c & 1 != 0 { (c >> 1) ^ 0xEDB8_8320 } else { c >> 1 };
                bit += 1;
            }
            table[i] = c;
            i += 1;
        }
        table
    };

    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8)
    })
}
