//! Content fingerprints for detecting real source changes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 128-bit XXH3 fingerprint of a source's contents.
///
/// The analysis context records the fingerprint of the last contents it saw
/// for every source. A change notification whose fingerprint matches the
/// recorded one carries no new information and does not invalidate anything.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Fingerprints a byte slice using XXH3-128.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = xxhash_rust::xxh3::xxh3_128(data);
        Self(hash.to_le_bytes())
    }

    /// Fingerprints source text.
    pub fn of_text(text: &str) -> Self {
        Self::from_bytes(text.as_bytes())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_same_fingerprint() {
        assert_eq!(
            ContentHash::of_text("library a;"),
            ContentHash::of_text("library a;")
        );
    }

    #[test]
    fn single_character_edit_changes_fingerprint() {
        assert_ne!(
            ContentHash::of_text("library a;"),
            ContentHash::of_text("library b;")
        );
    }

    #[test]
    fn text_and_bytes_agree() {
        assert_eq!(
            ContentHash::of_text("part of a;"),
            ContentHash::from_bytes(b"part of a;")
        );
    }

    #[test]
    fn display_is_32_hex_chars() {
        let s = ContentHash::of_text("x").to_string();
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn serde_roundtrip() {
        let h = ContentHash::of_text("main() {}");
        let json = serde_json::to_string(&h).unwrap();
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(h, back);
    }
}
