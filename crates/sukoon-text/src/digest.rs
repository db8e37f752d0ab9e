//! Config digests.
//!
//! Routing decisions are only auditable if a decision can be tied to the exact
//! term lists, templates and concept table that produced it. Every loaded
//! configuration snapshot carries a digest over the bytes it was built from:
//!
//! - algorithm: **FNV-1a 64-bit**
//! - output: `"fnv1a64:<16 lowercase hex digits>"`
//!
//! This is an identity tool, not a security primitive.

/// Prefix used in serialized digests.
pub const DIGEST_V1_PREFIX: &str = "fnv1a64:";

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x00000100000001b3;

/// Incremental FNV-1a 64-bit hasher for multi-file snapshots.
#[derive(Debug, Clone, Copy)]
pub struct Fnv1a64 {
    hash: u64,
}

impl Default for Fnv1a64 {
    fn default() -> Self {
        Self::new()
    }
}

impl Fnv1a64 {
    pub fn new() -> Self {
        Self {
            hash: FNV_OFFSET_BASIS,
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.hash ^= (*b) as u64;
            self.hash = self.hash.wrapping_mul(FNV_PRIME);
        }
    }

    /// Feed a labelled section; the label keeps `("a", "bc")` distinct from
    /// `("ab", "c")`.
    pub fn update_section(&mut self, label: &str, bytes: &[u8]) {
        self.update(label.as_bytes());
        self.update(&[0]);
        self.update(&(bytes.len() as u64).to_le_bytes());
        self.update(bytes);
    }

    pub fn finish(&self) -> String {
        format!("{DIGEST_V1_PREFIX}{:016x}", self.hash)
    }
}

/// Digest of a single byte string.
pub fn fnv1a64_digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Fnv1a64::new();
    hasher.update(bytes);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_offset_basis() {
        assert_eq!(fnv1a64_digest_bytes(b""), "fnv1a64:cbf29ce484222325");
    }

    #[test]
    fn known_vector() {
        // Reference value for "a" from the FNV test suite.
        assert_eq!(fnv1a64_digest_bytes(b"a"), "fnv1a64:af63dc4c8601ec8c");
    }

    #[test]
    fn sections_are_length_delimited() {
        let mut a = Fnv1a64::new();
        a.update_section("x", b"ab");
        a.update_section("y", b"c");
        let mut b = Fnv1a64::new();
        b.update_section("x", b"a");
        b.update_section("y", b"bc");
        assert_ne!(a.finish(), b.finish());
    }
}
