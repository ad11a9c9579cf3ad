//! Texture resource sniffing and payload type detection.
//!
//! A texture payload starts with a small fixed header:
//!
//! ```text
//! offset  size  field
//!      0     4  signature "TEX\0"
//!      4     2  width   (u16 LE)
//!      6     2  height  (u16 LE)
//!      8     1  reserved
//!      9     1  pixel format tag
//! ```

use byteorder::{ByteOrder, LittleEndian};

/// `"TEX\0"` read as a little-endian u32.
pub const TEX_MAGIC:      u32      = 0x0058_4554;
/// Some encoders do not write the trailing NUL; the ASCII prefix alone is accepted.
pub const TEX_PREFIX:     &[u8; 3] = b"TEX";
/// Bytes needed to read every header field.
pub const TEX_HEADER_LEN: usize    = 10;

/// The one signature test used wherever a payload is checked for being a
/// texture resource.
#[inline]
pub fn is_tex(data: &[u8]) -> bool {
    match data.get(..4) {
        Some(head) => LittleEndian::read_u32(head) == TEX_MAGIC || head.starts_with(TEX_PREFIX),
        None       => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexHeader {
    pub width:  u16,
    pub height: u16,
    pub format: u8,
}

impl TexHeader {
    /// Read the header of a signed texture payload.  `None` if the signature
    /// does not match or the payload is too short to hold the header.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if !is_tex(data) || data.len() < TEX_HEADER_LEN {
            return None;
        }
        Some(Self {
            width:  LittleEndian::read_u16(&data[4..6]),
            height: LittleEndian::read_u16(&data[6..8]),
            format: data[9],
        })
    }

    #[inline]
    pub fn dimensions(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    /// Display name of the pixel format (diagnostics only).
    pub fn format_name(&self) -> &'static str {
        match self.format {
            1  => "etc1",
            2  => "etc2-eac",
            3  => "etc2",
            10 => "bc1",
            12 => "bc3",
            20 => "bgra8",
            _  => "unknown",
        }
    }
}

// ── Extension sniffing ───────────────────────────────────────────────────────

/// Leading-byte signatures of payload types commonly found in skin archives.
/// Order matters only where one signature is a prefix of another.
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"DDS ",              "dds"),
    (b"\x89PNG\r\n\x1a\n", "png"),
    (b"\xff\xd8\xff",      "jpg"),
    (b"PROP",              "bin"),
    (b"PTCH",              "bin"),
    (b"\x33\x22\x11\x00",  "skn"),
    (b"r3d2Mesh",          "scb"),
    (b"r3d2anmd",          "anm"),
    (b"r3d2canm",          "anm"),
    (b"r3d2sklt",          "skl"),
    (b"[ObjectBegin]",     "sco"),
    (b"BKHD",              "bnk"),
    (b"r3d2",              "wpk"),
    (b"OEGM",              "mapgeo"),
    (b"\x1bLuaQ",          "luaobj"),
    (b"PreLoad",           "preload"),
];

/// Guess a file extension from a decoded payload's leading bytes.
pub fn sniff_extension(data: &[u8]) -> Option<&'static str> {
    if is_tex(data) {
        return Some("tex");
    }
    SIGNATURES
        .iter()
        .find(|(sig, _)| data.starts_with(sig))
        .map(|&(_, ext)| ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tex(width: u16, height: u16, format: u8) -> Vec<u8> {
        let mut v = b"TEX\0".to_vec();
        v.extend_from_slice(&width.to_le_bytes());
        v.extend_from_slice(&height.to_le_bytes());
        v.push(0);
        v.push(format);
        v
    }

    #[test]
    fn signature_accepts_both_forms() {
        assert!(is_tex(b"TEX\0rest"));
        assert!(is_tex(b"TEXxrest"));
        assert!(is_tex(&TEX_MAGIC.to_le_bytes()));
        assert!(!is_tex(b"TEX"));
        assert!(!is_tex(b"DDS |"));
    }

    #[test]
    fn reads_header_fields() {
        let h = TexHeader::parse(&tex(308, 560, 10)).unwrap();
        assert_eq!(h.dimensions(), (308, 560));
        assert_eq!(h.format, 10);
        assert_eq!(h.format_name(), "bc1");
    }

    #[test]
    fn short_payload_has_no_header() {
        assert_eq!(TexHeader::parse(&tex(1, 1, 1)[..9]), None);
    }

    #[test]
    fn sniffs_extensions() {
        assert_eq!(sniff_extension(&tex(4, 4, 1)), Some("tex"));
        assert_eq!(sniff_extension(b"DDS |...."), Some("dds"));
        assert_eq!(sniff_extension(b"r3d2Mesh...."), Some("scb"));
        assert_eq!(sniff_extension(b"r3d2\x01\x00\x00\x00"), Some("wpk"));
        assert_eq!(sniff_extension(&[0x33, 0x22, 0x11, 0x00, 1, 0]), Some("skn"));
        assert_eq!(sniff_extension(b"junk"), None);
        assert_eq!(sniff_extension(b""), None);
    }
}
