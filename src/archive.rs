//! High-level [`WadArchive`] API, the primary embedding surface.
//!
//! ```no_run
//! use wadtex::archive::WadArchive;
//! use wadtex::locate::LocateOptions;
//!
//! let wad = WadArchive::open("Ahri.wad.client")?;
//! println!("{} chunks", wad.chunks().len());
//!
//! let opts = LocateOptions::with_hint("Ahri");
//! if let Some(path) = wad.extract_portrait(&opts, std::env::temp_dir())? {
//!     println!("portrait written to {}", path.display());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::chunk::{index_by_hash, read_table, ChunkDescriptor, HashIndex};
use crate::codec::{decompress, CodecError, WadDecoder};
use crate::extract::{extract_payload, FALLBACK_EXTENSION};
use crate::hash::{hash_path, PathHash};
use crate::header::{ArchiveHeader, FormatError};
use crate::locate::{AssetLocator, LocateError, LocateOptions, Located};
use crate::tex::sniff_extension;

// ── Reports ──────────────────────────────────────────────────────────────────

/// Outcome of [`WadArchive::unpack_all`].
#[derive(Debug, Clone, Default)]
pub struct UnpackReport {
    pub written: usize,
    /// Chunks that failed to decode, by table index.
    pub skipped: Vec<u32>,
}

/// Outcome of [`WadArchive::verify_checksums`].
#[derive(Debug, Clone, Default)]
pub struct ChecksumReport {
    pub checked:    usize,
    pub mismatched: Vec<u32>,
    /// Set when the archive version has no checksum this reader can compute.
    pub unsupported: bool,
}

impl ChecksumReport {
    pub fn is_clean(&self) -> bool {
        !self.unsupported && self.mismatched.is_empty()
    }
}

// ── WadArchive ───────────────────────────────────────────────────────────────

pub struct WadArchive {
    data:    Vec<u8>,
    header:  ArchiveHeader,
    chunks:  Vec<ChunkDescriptor>,
    by_hash: HashIndex,
}

impl WadArchive {
    // ── Constructors ─────────────────────────────────────────────────────────

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FormatError> {
        Self::from_bytes(fs::read(path)?)
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Self, FormatError> {
        let header = ArchiveHeader::read(&data)?;
        let chunks = read_table(&data, &header)?;
        let by_hash = index_by_hash(&chunks);
        Ok(Self { data, header, chunks, by_hash })
    }

    // ── Metadata ─────────────────────────────────────────────────────────────

    pub fn header(&self) -> &ArchiveHeader { &self.header }

    pub fn chunks(&self) -> &[ChunkDescriptor] { &self.chunks }

    pub fn bytes(&self) -> &[u8] { &self.data }

    /// First chunk with this hash, in table order.
    pub fn chunk_by_hash(&self, hash: PathHash) -> Option<&ChunkDescriptor> {
        self.by_hash.get(&hash).map(|&i| &self.chunks[i])
    }

    pub fn chunk_by_path(&self, path: &str) -> Option<&ChunkDescriptor> {
        self.chunk_by_hash(hash_path(path))
    }

    // ── Read ─────────────────────────────────────────────────────────────────

    /// Decoded bytes of `chunk`, served from its cache slot when filled.
    pub fn decode(&self, chunk: &ChunkDescriptor) -> Result<Vec<u8>, CodecError> {
        match chunk.payload() {
            Some(cached) => Ok(cached.to_vec()),
            None         => decompress(chunk, &self.data),
        }
    }

    pub fn locator(&self) -> AssetLocator<'_> {
        AssetLocator::with_index(&self.data, &self.chunks, &self.by_hash, WadDecoder)
    }

    pub fn locate(&self, opts: &LocateOptions) -> Result<Option<Located<'_>>, LocateError> {
        self.locator().locate(opts)
    }

    /// Locate the portrait and write it into `scratch_dir`.
    ///
    /// `Ok(None)` when the archive has no portrait.
    pub fn extract_portrait<P: AsRef<Path>>(
        &self,
        opts: &LocateOptions,
        scratch_dir: P,
    ) -> io::Result<Option<PathBuf>> {
        let found = self
            .locate(opts)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        match found {
            Some(located) => {
                info!(
                    chunk = located.chunk.index,
                    hash = %located.chunk.path_hash,
                    strategy = ?located.strategy,
                    "portrait located"
                );
                extract_payload(located.chunk, scratch_dir.as_ref()).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Decode every chunk into `dest` as `<hash>.<ext>`.  A chunk that does
    /// not decode is logged and recorded in the report; it does not stop
    /// the unpack.
    pub fn unpack_all<P: AsRef<Path>>(&self, dest: P) -> io::Result<UnpackReport> {
        let dest = dest.as_ref();
        fs::create_dir_all(dest)?;

        let mut report = UnpackReport::default();
        for chunk in &self.chunks {
            let data = match self.decode(chunk) {
                Ok(d)  => d,
                Err(e) if e.is_structural() => {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, e));
                }
                Err(e) => {
                    warn!(chunk = chunk.index, hash = %chunk.path_hash, error = %e, "not unpacked");
                    report.skipped.push(chunk.index);
                    continue;
                }
            };
            let ext = sniff_extension(&data).unwrap_or(FALLBACK_EXTENSION);
            fs::write(dest.join(format!("{}.{}", chunk.path_hash, ext)), &data)?;
            report.written += 1;
        }
        debug!(written = report.written, skipped = report.skipped.len(), "unpack finished");
        Ok(report)
    }

    pub fn verify_checksums(&self) -> ChecksumReport {
        let mut report = ChecksumReport {
            unsupported: self.header.version_major < 3,
            ..ChecksumReport::default()
        };
        if report.unsupported {
            return report;
        }
        for chunk in &self.chunks {
            // ranges were bounds-checked at parse time
            if let Some(ok) = chunk.verify_checksum(&self.header, &self.data) {
                report.checked += 1;
                if !ok {
                    report.mismatched.push(chunk.index);
                }
            }
        }
        report
    }
}
