// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Deterministic change-detection hashing for the file watchers.
//!
//! SHA-256 is used for its availability and collision resistance, not for
//! any security property — any well-mixing hash with the same sequence
//! framing would be correct here.

use sha2::{Digest, Sha256};

/// Hex digest of a single string.
pub fn hash(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hex digest over an ordered sequence of parts, each framed as
/// `len(part) || ':' || part || '\0'` so that `["ab", "c"]` and `["a",
/// "bc"]` never collide.
pub fn hash_parts<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for part in parts {
        let part = part.as_ref();
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(b":");
        hasher.update(part.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash("hello"), hash("hello"));
        assert_ne!(hash("hello"), hash("world"));
    }

    #[test]
    fn hash_parts_defeats_concatenation_ambiguity() {
        let a = hash_parts(["ab", "c"]);
        let b = hash_parts(["a", "bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn hash_parts_is_order_sensitive() {
        let a = hash_parts(["x", "y"]);
        let b = hash_parts(["y", "x"]);
        assert_ne!(a, b);
    }

    #[test]
    fn hash_parts_identical_sequences_match() {
        let a = hash_parts(["file.json".to_string(), "{}".to_string()]);
        let b = hash_parts(["file.json".to_string(), "{}".to_string()]);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_sequence_is_stable() {
        let empty: Vec<&str> = vec![];
        assert_eq!(hash_parts(empty.clone()), hash_parts(empty));
    }
}
