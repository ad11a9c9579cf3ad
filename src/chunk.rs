use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Cursor;
use std::ops::Range;
use std::sync::OnceLock;
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

use crate::hash::PathHash;
use crate::header::{truncated, ArchiveHeader, FormatError};

/// Compression applied to one chunk.  Stored in the low nibble of the
/// record's type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkCodec {
    Raw,
    Gzip,
    /// Points at data in another archive.  Never decodable here.
    Satellite,
    Zstd,
    ZstdChunked,
    /// Tag outside the known range; decoding it fails.
    Other(u8),
}

impl ChunkCodec {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            0 => ChunkCodec::Raw,
            1 => ChunkCodec::Gzip,
            2 => ChunkCodec::Satellite,
            3 => ChunkCodec::Zstd,
            4 => ChunkCodec::ZstdChunked,
            t => ChunkCodec::Other(t),
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            ChunkCodec::Raw         => 0,
            ChunkCodec::Gzip        => 1,
            ChunkCodec::Satellite   => 2,
            ChunkCodec::Zstd        => 3,
            ChunkCodec::ZstdChunked => 4,
            ChunkCodec::Other(t)    => t,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChunkCodec::Raw         => "raw",
            ChunkCodec::Gzip        => "gzip",
            ChunkCodec::Satellite   => "satellite",
            ChunkCodec::Zstd        => "zstd",
            ChunkCodec::ZstdChunked => "zstd-chunked",
            ChunkCodec::Other(_)    => "unknown",
        }
    }
}

/// One chunk table record.
///
/// Everything except the two cache slots is fixed at parse time.  The cache
/// slots are filled at most once, after a successful decode, so one
/// locate-then-extract pass never decompresses the same chunk twice.
#[derive(Debug, Clone)]
pub struct ChunkDescriptor {
    /// Position in the chunk table.
    pub index:           u32,
    pub path_hash:       PathHash,
    pub offset:          u32,
    pub compressed_size: u32,
    pub size:            u32,
    pub codec:           ChunkCodec,
    /// High nibble of the type byte.
    pub subchunk_count:  u8,
    pub is_duplicate:    bool,
    pub subchunk_start:  u16,
    /// Zero when the archive version carries no per-chunk checksum.
    pub checksum:        u64,

    payload:   OnceLock<Vec<u8>>,
    extension: OnceLock<&'static str>,
}

impl ChunkDescriptor {
    fn read(cur: &mut Cursor<&[u8]>, index: u32, with_checksum: bool) -> std::io::Result<Self> {
        let path_hash       = PathHash(cur.read_u64::<LittleEndian>()?);
        let offset          = cur.read_u32::<LittleEndian>()?;
        let compressed_size = cur.read_u32::<LittleEndian>()?;
        let size            = cur.read_u32::<LittleEndian>()?;
        let type_byte       = cur.read_u8()?;
        let is_duplicate    = cur.read_u8()? != 0;
        let subchunk_start  = cur.read_u16::<LittleEndian>()?;
        let checksum = if with_checksum { cur.read_u64::<LittleEndian>()? } else { 0 };

        Ok(Self {
            index,
            path_hash,
            offset,
            compressed_size,
            size,
            codec:          ChunkCodec::from_tag(type_byte & 0x0F),
            subchunk_count: type_byte >> 4,
            is_duplicate,
            subchunk_start,
            checksum,
            payload:   OnceLock::new(),
            extension: OnceLock::new(),
        })
    }

    /// Byte range of the stored (compressed) data inside the archive.
    #[inline]
    pub fn data_range(&self) -> Range<usize> {
        let start = self.offset as usize;
        start..start + self.compressed_size as usize
    }

    #[inline]
    fn end(&self) -> u64 {
        self.offset as u64 + self.compressed_size as u64
    }

    /// Stored bytes of this chunk, or `None` if the range lies outside `archive`.
    pub fn stored<'a>(&self, archive: &'a [u8]) -> Option<&'a [u8]> {
        archive.get(self.data_range())
    }

    /// Decoded bytes, if a previous decode cached them.
    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.get().map(Vec::as_slice)
    }

    pub fn extension(&self) -> Option<&'static str> {
        self.extension.get().copied()
    }

    /// Returns `false` if a payload was already cached; the first one wins.
    pub(crate) fn cache_payload(&self, bytes: Vec<u8>) -> bool {
        self.payload.set(bytes).is_ok()
    }

    pub(crate) fn cache_extension(&self, ext: &'static str) -> bool {
        self.extension.set(ext).is_ok()
    }

    /// Check the stored bytes against the record checksum.
    ///
    /// Only version 3+ archives use XXH3-64 over the stored bytes; for older
    /// versions (no checksum, or a digest this reader does not compute) the
    /// result is `None`.
    pub fn verify_checksum(&self, header: &ArchiveHeader, archive: &[u8]) -> Option<bool> {
        if header.version_major < 3 {
            return None;
        }
        let data = self.stored(archive)?;
        Some(xxh3_64(data) == self.checksum)
    }

    pub fn summary(&self) -> ChunkSummary {
        ChunkSummary {
            index:           self.index,
            path_hash:       self.path_hash,
            offset:          self.offset,
            compressed_size: self.compressed_size,
            size:            self.size,
            codec:           self.codec.name(),
            subchunk_count:  self.subchunk_count,
            is_duplicate:    self.is_duplicate,
        }
    }
}

/// Flat, serializable view of a descriptor for listings.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkSummary {
    pub index:           u32,
    pub path_hash:       PathHash,
    pub offset:          u32,
    pub compressed_size: u32,
    pub size:            u32,
    pub codec:           &'static str,
    pub subchunk_count:  u8,
    pub is_duplicate:    bool,
}

/// Read the chunk table that immediately follows `header` in `buf`.
///
/// Returns exactly `header.entry_count` descriptors in table order.
pub fn read_table(buf: &[u8], header: &ArchiveHeader) -> Result<Vec<ChunkDescriptor>, FormatError> {
    let start      = header.header_len();
    let record_len = header.record_len();
    let count      = header.entry_count as usize;

    let table_len = count
        .checked_mul(record_len)
        .ok_or_else(|| truncated(usize::MAX, buf.len()))?;
    let needed = start + table_len;
    if buf.len() < needed {
        return Err(truncated(needed, buf.len()));
    }

    let mut cur = Cursor::new(&buf[start..needed]);
    let mut chunks = Vec::with_capacity(count);
    for index in 0..header.entry_count {
        let chunk = ChunkDescriptor::read(&mut cur, index, header.has_chunk_checksums())?;
        if chunk.end() > buf.len() as u64 {
            return Err(FormatError::ChunkOutOfBounds {
                index,
                end: chunk.end(),
                len: buf.len(),
            });
        }
        chunks.push(chunk);
    }

    debug!(
        version = ?header.version(),
        entries = chunks.len(),
        "read chunk table"
    );
    Ok(chunks)
}

/// Path hash to table position.
pub type HashIndex = HashMap<PathHash, usize>;

/// Index `chunks` by path hash.  Duplicate hashes keep their first position.
pub fn index_by_hash(chunks: &[ChunkDescriptor]) -> HashIndex {
    let mut index = HashMap::with_capacity(chunks.len());
    for (i, c) in chunks.iter().enumerate() {
        index.entry(c.path_hash).or_insert(i);
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn header(major: u8, entry_count: u32) -> ArchiveHeader {
        ArchiveHeader {
            magic: *crate::header::MAGIC,
            version_major: major,
            version_minor: 0,
            checksum: if major >= 2 { Some(0) } else { None },
            entry_count,
        }
    }

    fn record(buf: &mut Vec<u8>, hash: u64, offset: u32, len: u32, type_byte: u8, checksum: Option<u64>) {
        buf.write_u64::<LittleEndian>(hash).unwrap();
        buf.write_u32::<LittleEndian>(offset).unwrap();
        buf.write_u32::<LittleEndian>(len).unwrap();
        buf.write_u32::<LittleEndian>(len * 2).unwrap();
        buf.write_u8(type_byte).unwrap();
        buf.write_u8(1).unwrap();
        buf.write_u16::<LittleEndian>(9).unwrap();
        if let Some(c) = checksum {
            buf.write_u64::<LittleEndian>(c).unwrap();
        }
    }

    #[test]
    fn splits_type_byte() {
        let h = header(3, 1);
        let mut buf = vec![0u8; h.header_len()];
        record(&mut buf, 0xdead_beef, 0, 4, 0x53, Some(77));
        let chunks = read_table(&buf, &h).unwrap();
        assert_eq!(chunks.len(), 1);
        let c = &chunks[0];
        assert_eq!(c.codec, ChunkCodec::Zstd);
        assert_eq!(c.subchunk_count, 5);
        assert_eq!(c.path_hash.to_hex(), "00000000deadbeef");
        assert!(c.is_duplicate);
        assert_eq!(c.subchunk_start, 9);
        assert_eq!(c.checksum, 77);
        assert_eq!(c.size, 8);
    }

    #[test]
    fn v1_records_have_no_checksum() {
        let h = header(1, 2);
        let mut buf = vec![0u8; h.header_len()];
        record(&mut buf, 1, 0, 1, 0x00, None);
        record(&mut buf, 2, 1, 1, 0x01, None);
        let chunks = read_table(&buf, &h).unwrap();
        assert_eq!(chunks[1].index, 1);
        assert_eq!(chunks[1].codec, ChunkCodec::Gzip);
        assert_eq!(chunks[1].checksum, 0);
    }

    #[test]
    fn short_table_is_truncated() {
        let h = header(3, 2);
        let mut buf = vec![0u8; h.header_len()];
        record(&mut buf, 1, 0, 0, 0, Some(0));
        assert!(matches!(read_table(&buf, &h), Err(FormatError::Truncated { .. })));
    }

    #[test]
    fn range_past_end_is_rejected() {
        let h = header(3, 1);
        let mut buf = vec![0u8; h.header_len()];
        record(&mut buf, 1, 10, 1_000_000, 0, Some(0));
        assert!(matches!(
            read_table(&buf, &h),
            Err(FormatError::ChunkOutOfBounds { index: 0, .. })
        ));
    }

    #[test]
    fn unknown_tag_is_kept() {
        assert_eq!(ChunkCodec::from_tag(9), ChunkCodec::Other(9));
        assert_eq!(ChunkCodec::from_tag(9).tag(), 9);
    }

    #[test]
    fn hash_index_keeps_first_duplicate() {
        let h = header(3, 3);
        let mut buf = vec![0u8; h.header_len()];
        record(&mut buf, 5, 0, 0, 0, Some(0));
        record(&mut buf, 6, 0, 0, 0, Some(0));
        record(&mut buf, 5, 0, 0, 0, Some(0));
        let index = index_by_hash(&read_table(&buf, &h).unwrap());
        assert_eq!(index.len(), 2);
        assert_eq!(index[&PathHash(5)], 0);
        assert_eq!(index[&PathHash(6)], 1);
    }

    #[test]
    fn cache_slots_fill_once() {
        let h = header(3, 1);
        let mut buf = vec![0u8; h.header_len()];
        record(&mut buf, 1, 0, 0, 0, Some(0));
        let c = read_table(&buf, &h).unwrap().remove(0);
        assert!(c.payload().is_none());
        assert!(c.cache_payload(vec![1, 2]));
        assert!(!c.cache_payload(vec![3]));
        assert_eq!(c.payload(), Some(&[1u8, 2][..]));
        assert!(c.cache_extension("tex"));
        assert_eq!(c.extension(), Some("tex"));
    }
}
