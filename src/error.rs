// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

/// Errors produced by the synchronization engine.
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    /// A side adapter call failed (network, auth, rate limit, ...).
    #[error("adapter error: {0}")]
    Adapter(String),

    /// A converter rejected or could not translate an item.
    #[error("conversion error: {0}")]
    Convert(String),

    /// An insert would give an id two correspondence partners.
    ///
    /// This indicates corrupted state or a programming error and is never
    /// recovered from within a run.
    #[error("correspondence bijection violated by id {0:?}")]
    BijectionViolation(String),

    /// An item is missing a field the engine needs (usually the identity field).
    #[error("item is missing required field {0:?}")]
    MissingField(String),

    /// Persisted state could not be read or written.
    #[error("state error: {0}")]
    State(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        Self::State(e.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::State(e.to_string())
    }
}
