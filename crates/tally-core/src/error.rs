// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Tally usage meter.

use std::path::PathBuf;

use thiserror::Error;

/// The primary error type returned by metering, budget, and store operations.
#[derive(Debug, Error)]
pub enum TallyError {
    /// A usage event failed boundary validation (negative token counts,
    /// empty tool name). Nothing was mutated.
    #[error("invalid usage event: {message}")]
    InvalidEvent { message: String },

    /// The backing store exists but could not be parsed into the expected schema.
    #[error("usage store at {} is corrupt: {source}", path.display())]
    CorruptStore {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Writing, syncing, renaming, or locking the backing store failed.
    /// The update was not committed, neither on disk nor in memory.
    #[error("failed to persist usage store at {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration errors (malformed budget limits, invalid price table).
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TallyError {
    /// Shorthand for an [`TallyError::InvalidEvent`] with the given message.
    pub fn invalid_event(message: impl Into<String>) -> Self {
        Self::InvalidEvent {
            message: message.into(),
        }
    }

    /// Wrap an I/O or lock failure on `path` as a persistence failure.
    pub fn persistence(
        path: impl Into<PathBuf>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Persistence {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Wrap a parse failure on `path` as a corrupt store.
    pub fn corrupt(
        path: impl Into<PathBuf>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::CorruptStore {
            path: path.into(),
            source: source.into(),
        }
    }
}
