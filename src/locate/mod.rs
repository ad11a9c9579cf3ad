//! Loading-screen portrait locator.
//!
//! Two strategies, tried in order:
//!
//! 1. **Path-hash prediction.**  The caller's naming hint is substituted into
//!    the known portrait path templates, each candidate is hashed, and the
//!    first candidate whose hash appears in the chunk table is decoded and
//!    checked for the texture signature.  At most one chunk is decoded, and
//!    the lookup goes through a hash index rather than the table.
//! 2. **Content scan.**  Every chunk is decoded in table order and the first
//!    texture whose dimensions equal the portrait size wins.  Other textures
//!    are ignored even when they are otherwise valid, and no further
//!    ranking is attempted between candidates.  A chunk already rejected by
//!    prediction is not decoded again.
//!
//! A chunk that fails to decode is logged and skipped; it never stops the
//! scan.  Only structural errors (a chunk range outside the buffer) abort.
//! "Not found" is `Ok(None)`.
//!
//! With the `parallel` feature the content scan decodes chunks on the rayon
//! pool.  The selected chunk is still the first match in table order, and
//! cache slots are only written afterwards, on the calling thread.

use std::borrow::Cow;
use thiserror::Error;
use tracing::{debug, warn};

use crate::chunk::{index_by_hash, ChunkDescriptor, HashIndex};
use crate::codec::{ChunkDecoder, CodecError, WadDecoder};
use crate::hash::{hash_path, PathHash};
use crate::tex::{sniff_extension, TexHeader};

/// Portrait size used by this format family.
pub const PORTRAIT_WIDTH:  u16 = 308;
pub const PORTRAIT_HEIGHT: u16 = 560;

/// Placeholders: `{name}` (hint), `{skin}` (skin number), `{skin02}` (skin
/// number, two digits).  Templates that mention a skin placeholder are only
/// used when a skin number is given.
pub const DEFAULT_TEMPLATES: &[&str] = &[
    "ASSETS/Characters/{name}/Skins/Base/{name}LoadScreen.tex",
    "ASSETS/Characters/{name}/Skins/Base/{name}LoadScreen_0.tex",
    "ASSETS/Characters/{name}/Skins/Skin{skin02}/{name}LoadScreen_{skin}.tex",
    "ASSETS/Characters/{name}/Skins/Skin{skin}/{name}LoadScreen_{skin}.tex",
];

// ── Options ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LocateOptions {
    /// Character name used to predict portrait paths.  `None` skips straight
    /// to the content scan.
    pub hint:          Option<String>,
    pub skin:          Option<u32>,
    pub target_width:  u16,
    pub target_height: u16,
    pub templates:     Vec<String>,
}

impl Default for LocateOptions {
    fn default() -> Self {
        Self {
            hint:          None,
            skin:          None,
            target_width:  PORTRAIT_WIDTH,
            target_height: PORTRAIT_HEIGHT,
            templates:     DEFAULT_TEMPLATES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl LocateOptions {
    pub fn with_hint(hint: impl Into<String>) -> Self {
        Self { hint: Some(hint.into()), ..Self::default() }
    }

    /// Candidate portrait paths with their hashes, in template order.
    ///
    /// The hint is substituted as given and lowercased; the hash is
    /// case-insensitive, so variants that hash identically appear once.
    pub fn candidates(&self) -> Vec<(String, PathHash)> {
        let Some(hint) = self.hint.as_deref() else {
            return Vec::new();
        };
        let lower = hint.to_lowercase();
        let mut names = vec![hint];
        if lower != hint {
            names.push(&lower);
        }

        let mut out: Vec<(String, PathHash)> = Vec::new();
        for template in &self.templates {
            for name in &names {
                let Some(path) = render(template, name, self.skin) else { continue };
                let hash = hash_path(&path);
                if !out.iter().any(|(_, h)| *h == hash) {
                    out.push((path, hash));
                }
            }
        }
        out
    }
}

fn render(template: &str, name: &str, skin: Option<u32>) -> Option<String> {
    let path = template.replace("{name}", name);
    if !path.contains("{skin") {
        return Some(path);
    }
    let skin = skin?;
    Some(
        path.replace("{skin02}", &format!("{skin:02}"))
            .replace("{skin}", &skin.to_string()),
    )
}

// ── Results ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    PathHash,
    ContentScan,
}

/// A located portrait.  The chunk's payload and extension slots are filled.
#[derive(Debug, Clone)]
pub struct Located<'a> {
    pub chunk:    &'a ChunkDescriptor,
    pub tex:      TexHeader,
    pub strategy: Strategy,
    /// The predicted path that matched, for [`Strategy::PathHash`].
    pub path:     Option<String>,
}

#[derive(Error, Debug)]
pub enum LocateError {
    #[error("archive structure is inconsistent: {0}")]
    Structural(#[source] CodecError),
}

/// Outcome of path-hash prediction.
enum Prediction<'a> {
    Found(Located<'a>),
    /// A predicted chunk was present but failed to decode or is not a texture.
    Rejected(u32),
    Miss,
}

struct Probe<'a> {
    chunk:   &'a ChunkDescriptor,
    payload: Cow<'a, [u8]>,
    tex:     TexHeader,
}

// ── Locator ──────────────────────────────────────────────────────────────────

pub struct AssetLocator<'a, D = WadDecoder> {
    archive: &'a [u8],
    chunks:  &'a [ChunkDescriptor],
    index:   Cow<'a, HashIndex>,
    decoder: D,
}

impl<'a> AssetLocator<'a, WadDecoder> {
    pub fn new(archive: &'a [u8], chunks: &'a [ChunkDescriptor]) -> Self {
        Self::with_decoder(archive, chunks, WadDecoder)
    }
}

impl<'a, D: ChunkDecoder> AssetLocator<'a, D> {
    pub fn with_decoder(archive: &'a [u8], chunks: &'a [ChunkDescriptor], decoder: D) -> Self {
        let index = Cow::Owned(index_by_hash(chunks));
        Self { archive, chunks, index, decoder }
    }

    /// Like [`with_decoder`](Self::with_decoder), reusing an index already
    /// built over `chunks` with [`index_by_hash`].
    pub fn with_index(
        archive: &'a [u8],
        chunks:  &'a [ChunkDescriptor],
        index:   &'a HashIndex,
        decoder: D,
    ) -> Self {
        Self { archive, chunks, index: Cow::Borrowed(index), decoder }
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// Path-hash prediction when a hint is given, then the content scan.
    pub fn locate(&self, opts: &LocateOptions) -> Result<Option<Located<'a>>, LocateError> {
        let mut rejected = None;
        if opts.hint.is_some() {
            match self.predict(opts)? {
                Prediction::Found(found) => return Ok(Some(found)),
                Prediction::Rejected(index) => rejected = Some(index),
                Prediction::Miss => {}
            }
            debug!("no predicted portrait path matched; scanning content");
        }
        self.scan(opts, rejected)
    }

    pub fn by_path_hash(&self, opts: &LocateOptions) -> Result<Option<Located<'a>>, LocateError> {
        match self.predict(opts)? {
            Prediction::Found(found) => Ok(Some(found)),
            Prediction::Rejected(_) | Prediction::Miss => Ok(None),
        }
    }

    pub fn by_content(&self, opts: &LocateOptions) -> Result<Option<Located<'a>>, LocateError> {
        self.scan(opts, None)
    }

    fn predict(&self, opts: &LocateOptions) -> Result<Prediction<'a>, LocateError> {
        for (path, hash) in opts.candidates() {
            let Some(chunk) = self.index.get(&hash).and_then(|&i| self.chunks.get(i)) else {
                continue;
            };
            debug!(%path, chunk = chunk.index, "predicted path present");

            let Some(payload) = self.payload(chunk)? else {
                return Ok(Prediction::Rejected(chunk.index));
            };
            let Some(tex) = TexHeader::parse(&payload) else {
                warn!(%path, chunk = chunk.index, "predicted chunk is not a texture");
                return Ok(Prediction::Rejected(chunk.index));
            };
            adopt(chunk, payload);
            return Ok(Prediction::Found(Located {
                chunk,
                tex,
                strategy: Strategy::PathHash,
                path: Some(path),
            }));
        }
        Ok(Prediction::Miss)
    }

    /// Content scan.  `skip` is a chunk that prediction already decoded and
    /// rejected; it cannot match here either.
    fn scan(&self, opts: &LocateOptions, skip: Option<u32>) -> Result<Option<Located<'a>>, LocateError> {
        let target = (opts.target_width, opts.target_height);
        let Some(Probe { chunk, payload, tex }) = self.sweep(target, skip)? else {
            debug!(width = target.0, height = target.1, "no texture of the target size");
            return Ok(None);
        };
        debug!(chunk = chunk.index, hash = %chunk.path_hash, "content scan matched");
        adopt(chunk, payload);
        Ok(Some(Located {
            chunk,
            tex,
            strategy: Strategy::ContentScan,
            path: None,
        }))
    }

    #[cfg(feature = "parallel")]
    fn sweep(&self, target: (u16, u16), skip: Option<u32>) -> Result<Option<Probe<'a>>, LocateError> {
        use rayon::prelude::*;

        self.chunks
            .par_iter()
            .filter(|c| Some(c.index) != skip)
            .map(|c| self.probe(c, target))
            .find_first(|r| !matches!(r, Ok(None)))
            .transpose()
            .map(Option::flatten)
    }

    #[cfg(not(feature = "parallel"))]
    fn sweep(&self, target: (u16, u16), skip: Option<u32>) -> Result<Option<Probe<'a>>, LocateError> {
        self.chunks
            .iter()
            .filter(|c| Some(c.index) != skip)
            .map(|c| self.probe(c, target))
            .find(|r| !matches!(r, Ok(None)))
            .transpose()
            .map(Option::flatten)
    }

    fn probe(&self, chunk: &'a ChunkDescriptor, target: (u16, u16)) -> Result<Option<Probe<'a>>, LocateError> {
        let Some(payload) = self.payload(chunk)? else {
            return Ok(None);
        };
        match TexHeader::parse(&payload) {
            Some(tex) if tex.dimensions() == target => Ok(Some(Probe { chunk, payload, tex })),
            _ => Ok(None),
        }
    }

    /// Cached payload, or a fresh decode.  Non-structural decode failures
    /// are logged and reported as `Ok(None)`.
    fn payload(&self, chunk: &'a ChunkDescriptor) -> Result<Option<Cow<'a, [u8]>>, LocateError> {
        if let Some(cached) = chunk.payload() {
            return Ok(Some(Cow::Borrowed(cached)));
        }
        match self.decoder.decode(chunk, self.archive) {
            Ok(bytes) => Ok(Some(Cow::Owned(bytes))),
            Err(e) if e.is_structural() => Err(LocateError::Structural(e)),
            Err(e) => {
                warn!(chunk = chunk.index, hash = %chunk.path_hash, error = %e, "skipping undecodable chunk");
                Ok(None)
            }
        }
    }
}

/// Fill the chunk's cache slots from a matched payload.
fn adopt(chunk: &ChunkDescriptor, payload: Cow<'_, [u8]>) {
    if let Some(ext) = sniff_extension(&payload) {
        chunk.cache_extension(ext);
    }
    if let Cow::Owned(bytes) = payload {
        chunk.cache_payload(bytes);
    }
}
