//! Fixed-layout WAD header.
//!
//! ```text
//! offset  size  field
//!      0     2  magic "RW"
//!      2     1  version_major
//!      3     1  version_minor
//!      4   83|256  signature / padding (256 when major >= 3)
//!      …     8  header checksum           (major >= 2 only)
//!      …     4  entry_count
//! ```
//!
//! Every field after the version bytes is positioned by the version that was
//! just read; there is no other length or offset information in the header.

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use std::io::{self, Cursor};
use thiserror::Error;

pub const MAGIC: &[u8; 2] = b"RW";

/// Signature region length for `version_major >= 3`.
pub const PADDING_LEN_V3:     usize = 256;
/// Signature region length for every older version.
pub const PADDING_LEN_LEGACY: usize = 83;

/// Structural failures while reading the header or the chunk table.
/// None of these can be recovered from; parsing stops at the first one.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Invalid magic: expected \"RW\", found {found:02x?}")]
    BadMagic { found: [u8; 2] },
    #[error("Truncated archive: needed {needed} bytes, only {available} available")]
    Truncated { needed: usize, available: usize },
    #[error("Chunk {index} ends at byte {end}, past the end of the archive ({len} bytes)")]
    ChunkOutOfBounds { index: u32, end: u64, len: usize },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArchiveHeader {
    pub magic:         [u8; 2],
    pub version_major: u8,
    pub version_minor: u8,
    /// Present only when `version_major >= 2`.
    pub checksum:      Option<u64>,
    pub entry_count:   u32,
}

impl ArchiveHeader {
    pub fn read(buf: &[u8]) -> Result<Self, FormatError> {
        let magic: [u8; 2] = match buf.get(..2) {
            Some(m) => [m[0], m[1]],
            None    => return Err(truncated(2, buf.len())),
        };
        if &magic != MAGIC {
            return Err(FormatError::BadMagic { found: magic });
        }
        if buf.len() < 4 {
            return Err(truncated(4, buf.len()));
        }
        let version_major = buf[2];
        let version_minor = buf[3];

        let needed = header_len(version_major);
        if buf.len() < needed {
            return Err(truncated(needed, buf.len()));
        }

        let mut cur = Cursor::new(&buf[4 + padding_len(version_major)..needed]);
        let checksum = if has_checksum(version_major) {
            Some(cur.read_u64::<LittleEndian>()?)
        } else {
            None
        };
        let entry_count = cur.read_u32::<LittleEndian>()?;

        Ok(Self {
            magic,
            version_major,
            version_minor,
            checksum,
            entry_count,
        })
    }

    #[inline]
    pub fn version(&self) -> (u8, u8) {
        (self.version_major, self.version_minor)
    }

    /// Bytes consumed by the header; the chunk table starts here.
    #[inline]
    pub fn header_len(&self) -> usize {
        header_len(self.version_major)
    }

    /// Size of one chunk table record for this version.
    #[inline]
    pub fn record_len(&self) -> usize {
        if has_checksum(self.version_major) { 32 } else { 24 }
    }

    #[inline]
    pub fn has_chunk_checksums(&self) -> bool {
        has_checksum(self.version_major)
    }
}

#[inline]
fn padding_len(major: u8) -> usize {
    if major >= 3 { PADDING_LEN_V3 } else { PADDING_LEN_LEGACY }
}

#[inline]
fn has_checksum(major: u8) -> bool {
    major >= 2
}

fn header_len(major: u8) -> usize {
    let checksum = if has_checksum(major) { 8 } else { 0 };
    4 + padding_len(major) + checksum + 4
}

pub(crate) fn truncated(needed: usize, available: usize) -> FormatError {
    FormatError::Truncated { needed, available }
}
