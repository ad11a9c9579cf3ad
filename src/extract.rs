use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::chunk::ChunkDescriptor;

/// Extension used when nothing was detected for a payload.
pub const FALLBACK_EXTENSION: &str = "bin";

/// Scratch file name for a chunk: `<path hash>.<extension>`.
pub fn scratch_name(chunk: &ChunkDescriptor) -> String {
    format!("{}.{}", chunk.path_hash, chunk.extension().unwrap_or(FALLBACK_EXTENSION))
}

/// Write a located chunk's cached payload into `scratch_dir`, creating the
/// directory if needed, and return the written path.
///
/// The chunk must already hold decoded bytes (see `AssetLocator`); otherwise
/// this fails with `InvalidInput`.  Disk errors are returned as-is.
pub fn extract_payload(chunk: &ChunkDescriptor, scratch_dir: &Path) -> io::Result<PathBuf> {
    let payload = chunk.payload().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("chunk {} has no decoded payload", chunk.path_hash),
        )
    })?;

    fs::create_dir_all(scratch_dir)?;
    let path = scratch_dir.join(scratch_name(chunk));
    fs::write(&path, payload)?;
    debug!(path = %path.display(), bytes = payload.len(), "wrote payload");
    Ok(path)
}
