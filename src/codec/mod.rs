//! Chunk decompression, dispatched on the chunk's codec tag.
//!
//! | tag | codec          | behaviour on bad input                  |
//! |-----|----------------|-----------------------------------------|
//! | 0   | raw            | identity copy                           |
//! | 1   | gzip           | `CodecError::Decompression`             |
//! | 2   | satellite      | always `CodecError::UnsupportedCodec`   |
//! | 3   | zstd           | logged, stored bytes returned unchanged |
//! | 4   | zstd (chunked) | logged, stored bytes returned unchanged |
//! | *   | -              | `CodecError::UnknownCodec(tag)`         |
//!
//! Decoded output must be exactly the chunk's declared `size`.  A stream that
//! decodes to any other length counts as bad input: an error for gzip, the
//! stored-bytes fallback for Zstandard.
//!
//! The Zstandard fallback is deliberate: a content sweep over a whole archive
//! has to keep going past one malformed chunk, and an undecoded payload simply
//! fails every signature test downstream.

use flate2::read::GzDecoder;
use std::io::{self, Read};
use thiserror::Error;
use tracing::warn;

use crate::chunk::{ChunkCodec, ChunkDescriptor};

/// Leading bytes of every Zstandard frame.
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

const MAX_RESERVE_RATIO: usize = 16;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Unknown codec tag {0}")]
    UnknownCodec(u8),
    #[error("Satellite chunks reference external data and cannot be decoded")]
    UnsupportedCodec,
    #[error("Decompression error: {0}")]
    Decompression(String),
    /// The descriptor's range lies outside the archive buffer.  Structural,
    /// not a property of the payload.
    #[error("Chunk {index} range {start}..{end} lies outside the archive ({len} bytes)")]
    OutOfBounds { index: u32, start: usize, end: usize, len: usize },
}

impl CodecError {
    /// True for errors that say the archive itself is inconsistent rather
    /// than that one payload could not be decoded.
    pub fn is_structural(&self) -> bool {
        matches!(self, CodecError::OutOfBounds { .. })
    }
}

// ── Decoder seam ─────────────────────────────────────────────────────────────

/// Turns one chunk's stored bytes into its decoded payload.
///
/// [`WadDecoder`] is the real implementation; the locator is generic over
/// this trait so alternative decoders can be substituted.
pub trait ChunkDecoder: Send + Sync {
    fn decode(&self, chunk: &ChunkDescriptor, archive: &[u8]) -> Result<Vec<u8>, CodecError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WadDecoder;

impl ChunkDecoder for WadDecoder {
    fn decode(&self, chunk: &ChunkDescriptor, archive: &[u8]) -> Result<Vec<u8>, CodecError> {
        decompress(chunk, archive)
    }
}

// ── Dispatch ─────────────────────────────────────────────────────────────────

/// Decode `chunk` from the full archive buffer.
pub fn decompress(chunk: &ChunkDescriptor, archive: &[u8]) -> Result<Vec<u8>, CodecError> {
    let data = chunk.stored(archive).ok_or_else(|| {
        let range = chunk.data_range();
        CodecError::OutOfBounds {
            index: chunk.index,
            start: range.start,
            end:   range.end,
            len:   archive.len(),
        }
    })?;
    let size = chunk.size as usize;

    match chunk.codec {
        ChunkCodec::Raw         => Ok(data.to_vec()),
        ChunkCodec::Gzip        => inflate_gzip(data, size),
        ChunkCodec::Satellite   => Err(CodecError::UnsupportedCodec),
        ChunkCodec::Zstd        => Ok(zstd_or_stored(chunk, data, decode_zstd(data, size))),
        ChunkCodec::ZstdChunked => Ok(zstd_or_stored(chunk, data, decode_zstd_chunked(data, size))),
        ChunkCodec::Other(tag)  => Err(CodecError::UnknownCodec(tag)),
    }
}

fn inflate_gzip(data: &[u8], size: usize) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(reserve(size, data.len()));
    read_declared(GzDecoder::new(data), &mut out, size)
        .map_err(|e| CodecError::Decompression(e.to_string()))?;
    Ok(out)
}

fn decode_zstd(data: &[u8], size: usize) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(reserve(size, data.len()));
    read_declared(zstd::stream::read::Decoder::new(data)?, &mut out, size)?;
    Ok(out)
}

/// Chunked entries may carry uncompressed bytes ahead of the first frame;
/// those are copied through as-is and every frame after them is decoded.
/// `size` covers the prefix and the decoded frames together.
fn decode_zstd_chunked(data: &[u8], size: usize) -> io::Result<Vec<u8>> {
    let start = data
        .windows(ZSTD_MAGIC.len())
        .position(|w| w == ZSTD_MAGIC)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no zstd frame found"))?;
    let remaining = size.checked_sub(start).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("raw prefix of {start} bytes exceeds declared size {size}"),
        )
    })?;

    let mut out = Vec::with_capacity(reserve(size, data.len()));
    out.extend_from_slice(&data[..start]);
    read_declared(zstd::stream::read::Decoder::new(&data[start..])?, &mut out, remaining)?;
    Ok(out)
}

/// Capacity reserved ahead of a decode.  The declared size comes straight
/// from the table, so it is capped relative to the stored length.
#[inline]
fn reserve(size: usize, stored_len: usize) -> usize {
    size.min(stored_len.saturating_mul(MAX_RESERVE_RATIO))
}

/// Append exactly `size` decoded bytes from `reader` to `out`.  Reads at most
/// one byte past `size`, so an oversized stream is rejected without being
/// inflated in full.
fn read_declared<R: Read>(reader: R, out: &mut Vec<u8>, size: usize) -> io::Result<()> {
    let before = out.len();
    reader.take(size as u64 + 1).read_to_end(out)?;
    let got = out.len() - before;
    if got != size {
        let got = if got > size { format!("more than {size}") } else { got.to_string() };
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("decoded {got} bytes, table declares {size}"),
        ));
    }
    Ok(())
}

fn zstd_or_stored(chunk: &ChunkDescriptor, stored: &[u8], decoded: io::Result<Vec<u8>>) -> Vec<u8> {
    match decoded {
        Ok(out) => out,
        Err(e) => {
            warn!(
                chunk = chunk.index,
                hash = %chunk.path_hash,
                error = %e,
                "zstd decode failed; passing stored bytes through"
            );
            stored.to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{ArchiveHeader, MAGIC};
    use byteorder::{LittleEndian, WriteBytesExt};
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    /// Single-chunk v3 archive with `stored` as the chunk data.
    fn archive(type_byte: u8, stored: &[u8], size: u32) -> (Vec<u8>, ChunkDescriptor) {
        let header = ArchiveHeader {
            magic: *MAGIC,
            version_major: 3,
            version_minor: 0,
            checksum: Some(0),
            entry_count: 1,
        };
        let data_start = (header.header_len() + header.record_len()) as u32;
        let mut buf = vec![0u8; header.header_len()];
        buf.write_u64::<LittleEndian>(42).unwrap();
        buf.write_u32::<LittleEndian>(data_start).unwrap();
        buf.write_u32::<LittleEndian>(stored.len() as u32).unwrap();
        buf.write_u32::<LittleEndian>(size).unwrap();
        buf.write_u8(type_byte).unwrap();
        buf.write_u8(0).unwrap();
        buf.write_u16::<LittleEndian>(0).unwrap();
        buf.write_u64::<LittleEndian>(0).unwrap();
        buf.extend_from_slice(stored);
        let chunk = crate::chunk::read_table(&buf, &header).unwrap().remove(0);
        (buf, chunk)
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn raw_is_identity() {
        let (buf, chunk) = archive(0, b"plain bytes", 11);
        assert_eq!(decompress(&chunk, &buf).unwrap(), b"plain bytes");
    }

    #[test]
    fn gzip_inflates() {
        let payload = b"gzip payload gzip payload gzip payload".to_vec();
        let (buf, chunk) = archive(1, &gzip(&payload), payload.len() as u32);
        assert_eq!(decompress(&chunk, &buf).unwrap(), payload);
    }

    #[test]
    fn bad_gzip_is_an_error() {
        let (buf, chunk) = archive(1, b"not gzip", 8);
        assert!(matches!(decompress(&chunk, &buf), Err(CodecError::Decompression(_))));
    }

    #[test]
    fn satellite_is_unsupported() {
        let (buf, chunk) = archive(2, b"anything", 8);
        assert!(matches!(decompress(&chunk, &buf), Err(CodecError::UnsupportedCodec)));
        let (buf, chunk) = archive(2, b"", 0);
        assert!(matches!(decompress(&chunk, &buf), Err(CodecError::UnsupportedCodec)));
    }

    #[test]
    fn unknown_tag_is_reported() {
        let (buf, chunk) = archive(0x27, b"x", 1);
        assert_eq!(chunk.subchunk_count, 2);
        assert!(matches!(decompress(&chunk, &buf), Err(CodecError::UnknownCodec(7))));
    }

    #[test]
    fn zstd_roundtrip() {
        let payload = vec![7u8; 4096];
        let stored = zstd::encode_all(&payload[..], 3).unwrap();
        let (buf, chunk) = archive(3, &stored, payload.len() as u32);
        assert_eq!(decompress(&chunk, &buf).unwrap(), payload);
    }

    #[test]
    fn malformed_zstd_passes_through() {
        let stored = b"\x28\xb5\x2f\xfdgarbage that is not a frame";
        let (buf, chunk) = archive(3, stored, 100);
        assert_eq!(decompress(&chunk, &buf).unwrap(), stored.to_vec());
    }

    #[test]
    fn chunked_zstd_keeps_raw_prefix() {
        let mut stored = b"PREFIX".to_vec();
        stored.extend(zstd::encode_all(&b"first frame "[..], 1).unwrap());
        stored.extend(zstd::encode_all(&b"second frame"[..], 1).unwrap());
        let (buf, chunk) = archive(0x24, &stored, 30);
        assert_eq!(decompress(&chunk, &buf).unwrap(), b"PREFIXfirst frame second frame");
    }

    #[test]
    fn chunked_zstd_without_frame_passes_through() {
        let (buf, chunk) = archive(4, b"no frame here", 13);
        assert_eq!(decompress(&chunk, &buf).unwrap(), b"no frame here");
    }

    #[test]
    fn gzip_longer_than_declared_is_rejected() {
        let (buf, chunk) = archive(1, &gzip(&vec![0u8; 1_000_000]), 16);
        match decompress(&chunk, &buf) {
            Err(CodecError::Decompression(msg)) => assert!(msg.contains("more than 16")),
            other => panic!("expected Decompression, got {other:?}"),
        }
    }

    #[test]
    fn gzip_shorter_than_declared_is_rejected() {
        let (buf, chunk) = archive(1, &gzip(b"short"), 64);
        assert!(matches!(decompress(&chunk, &buf), Err(CodecError::Decompression(_))));
    }

    #[test]
    fn zstd_size_mismatch_passes_stored_through() {
        let stored = zstd::encode_all(&vec![1u8; 100_000][..], 3).unwrap();
        let (buf, chunk) = archive(3, &stored, 16);
        assert_eq!(decompress(&chunk, &buf).unwrap(), stored);

        let (buf, chunk) = archive(0x14, &stored, 16);
        assert_eq!(decompress(&chunk, &buf).unwrap(), stored);
    }

    #[test]
    fn huge_declared_size_is_not_reserved_up_front() {
        assert_eq!(reserve(u32::MAX as usize, 10), 160);
        assert_eq!(reserve(20, 10), 20);
    }

    #[test]
    fn range_outside_buffer_is_structural() {
        let (buf, chunk) = archive(0, b"abcdef", 6);
        let err = decompress(&chunk, &buf[..buf.len() - 3]).unwrap_err();
        assert!(err.is_structural());
    }
}
