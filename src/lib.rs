pub mod header;
pub mod chunk;
pub mod hash;
pub mod codec;
pub mod tex;
pub mod locate;
pub mod extract;
pub mod archive;

pub use header::{ArchiveHeader, FormatError};
pub use chunk::{ChunkCodec, ChunkDescriptor, read_table};
pub use hash::{PathHash, hash_path, hash_path_hex};
pub use codec::{ChunkDecoder, CodecError, WadDecoder, decompress};
pub use tex::{TexHeader, is_tex};
pub use locate::{AssetLocator, LocateOptions, Located, LocateError, Strategy};
pub use extract::extract_payload;
pub use archive::WadArchive;
