// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Two independent size caps: per-field truncation and streaming body caps.

use crate::error::CoreError;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Cap for a single textual event field (`input`, `output`, `content`,
/// `workingDirectory`) before it is broadcast.
pub const FIELD_TRUNCATE_CAP: usize = 10 * 1024;

/// Cap for an inbound HTTP request body.
pub const BODY_CAP: usize = 5 * 1024 * 1024;

const TRUNCATE_MARKER: &str = "\n... [truncated]";

/// Truncate `s` to [`FIELD_TRUNCATE_CAP`] bytes, appending a visible marker
/// if truncation occurred. No-op for inputs already within the cap.
pub fn truncate_field(s: &str) -> String {
    if s.len() <= FIELD_TRUNCATE_CAP {
        return s.to_string();
    }
    let mut cut = FIELD_TRUNCATE_CAP;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut out = String::with_capacity(cut + TRUNCATE_MARKER.len());
    out.push_str(&s[..cut]);
    out.push_str(TRUNCATE_MARKER);
    out
}

/// Read `reader` to completion, failing fast (without buffering past the
/// cap) if the body exceeds `cap` bytes. The reader is dropped on the error
/// path, which ends the underlying stream.
pub async fn read_capped<R>(mut reader: R, cap: usize) -> Result<Vec<u8>, CoreError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(cap.min(64 * 1024));
    let mut chunk = [0u8; 8 * 1024];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        if buf.len() + n > cap {
            return Err(CoreError::BodyTooLarge { limit: cap });
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(buf)
}
