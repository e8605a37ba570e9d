// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! ID field validation: `sessionId`, `agentId`, `toolCallId`.

/// Maximum length for any ID field.
pub const MAX_ID_LEN: usize = 256;

/// `true` if `s` is a non-empty run of `[A-Za-z0-9._-]` of at most
/// [`MAX_ID_LEN`] characters.
pub fn valid_id(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_ID_LEN
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_ids() {
        assert!(valid_id("session-1_abc.2"));
    }

    #[test]
    fn rejects_empty() {
        assert!(!valid_id(""));
    }

    #[test]
    fn rejects_too_long() {
        let s = "a".repeat(MAX_ID_LEN + 1);
        assert!(!valid_id(&s));
    }

    #[test]
    fn accepts_exactly_max_len() {
        let s = "a".repeat(MAX_ID_LEN);
        assert!(valid_id(&s));
    }

    #[test]
    fn rejects_disallowed_characters() {
        assert!(!valid_id("session/1"));
        assert!(!valid_id("session 1"));
        assert!(!valid_id("session;drop"));
    }
}
