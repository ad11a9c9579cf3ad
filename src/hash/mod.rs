//! Path hashing: the WAD identifies every chunk by the XXH64 (seed 0) digest
//! of its lowercased virtual path.
//!
//! The digest is an interoperability contract with existing archives; it is
//! verified only by golden vectors and must never be swapped for another
//! function.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use xxhash_rust::xxh64::xxh64;

const SEED: u64 = 0;

/// Canonical chunk identifier.  Renders as 16 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "String")]
pub struct PathHash(pub u64);

impl PathHash {
    #[inline]
    pub fn to_hex(self) -> String {
        format!("{:016x}", self.0)
    }
}

impl fmt::Display for PathHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<PathHash> for String {
    fn from(h: PathHash) -> String {
        h.to_hex()
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid path hash {0:?}: expected 1-16 hex digits")]
pub struct ParseHashError(pub String);

impl FromStr for PathHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.is_empty() || digits.len() > 16 {
            return Err(ParseHashError(s.to_owned()));
        }
        u64::from_str_radix(digits, 16)
            .map(PathHash)
            .map_err(|_| ParseHashError(s.to_owned()))
    }
}

/// Hash a forward-slash virtual path.  Case-insensitive.
pub fn hash_path(path: &str) -> PathHash {
    PathHash(xxh64(path.to_lowercase().as_bytes(), SEED))
}

/// [`hash_path`] rendered as the canonical 16-character identifier.
pub fn hash_path_hex(path: &str) -> String {
    hash_path(path).to_hex()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn golden_vectors() {
        assert_eq!(hash_path_hex(""), "ef46db3751d8e999");
        assert_eq!(hash_path_hex("abc"), "44bc2cf5ad770999");
    }

    #[test]
    fn ignores_case() {
        assert_eq!(hash_path("Assets/X.tex"), hash_path("assets/x.tex"));
        assert_eq!(hash_path_hex("ABC"), "44bc2cf5ad770999");
    }

    #[test]
    fn hex_is_fixed_width() {
        assert_eq!(PathHash(0x1f).to_hex(), "000000000000001f");
        assert_eq!(PathHash(0x1f).to_string().len(), 16);
    }

    #[test]
    fn parses_hex() {
        assert_eq!("000000000000001f".parse::<PathHash>(), Ok(PathHash(0x1f)));
        assert_eq!("0xABCDEF".parse::<PathHash>(), Ok(PathHash(0xabcdef)));
        assert!("".parse::<PathHash>().is_err());
        assert!("12345678123456781".parse::<PathHash>().is_err());
        assert!("zz".parse::<PathHash>().is_err());
    }

    proptest! {
        #[test]
        fn case_insensitive(path in "[A-Za-z0-9_/.]{0,64}") {
            prop_assert_eq!(hash_path(&path), hash_path(&path.to_ascii_uppercase()));
            prop_assert_eq!(hash_path(&path), hash_path(&path.to_ascii_lowercase()));
        }

        #[test]
        fn hex_roundtrips(v: u64) {
            prop_assert_eq!(PathHash(v).to_hex().parse::<PathHash>(), Ok(PathHash(v)));
        }
    }
}
