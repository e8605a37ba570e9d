// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Leaf primitives shared by the event receiver, the broadcast hub, and the
//! three file watchers: secret redaction, path containment, payload
//! bounding, rate limiting, and change-detection hashing.

mod bounder;
mod error;
mod hasher;
mod path_validator;
mod rate_limiter;
mod redactor;

pub use bounder::{read_capped, truncate_field, BODY_CAP, FIELD_TRUNCATE_CAP};
pub use error::CoreError;
pub use hasher::{hash, hash_parts};
pub use path_validator::{normalize, within, within_any};
pub use rate_limiter::{Decision, RateLimiter};
pub use redactor::{is_idempotent as redact_is_idempotent, redact, MARKER as REDACTED_MARKER};

/// Run a textual field through the bounder then the redactor, in that
/// order — bounding first keeps the redactor's worst case bounded.
pub fn sanitize(field: &str) -> String {
    redact(&truncate_field(field))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_bounds_then_redacts() {
        let mut huge_secret = "API_KEY=sk_live_".to_string();
        huge_secret.push_str(&"a".repeat(FIELD_TRUNCATE_CAP));
        let out = sanitize(&huge_secret);
        assert!(out.len() <= FIELD_TRUNCATE_CAP + "\n... [truncated]".len() + REDACTED_MARKER.len());
    }
}
