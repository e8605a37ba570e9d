// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
/// Errors raised by the leaf primitives (path validation, body reading).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("request body exceeded {limit} bytes")]
    BodyTooLarge { limit: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
