//! Error types for turns and conversation storage

use std::time::Duration;
use thiserror::Error;

/// Failure that ends a turn. Tool failures never show up here; they are
/// recorded as result data instead.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("completion provider failed: {0}")]
    Provider(#[source] anyhow::Error),

    #[error("no provider event within {0:?}")]
    Timeout(Duration),

    #[error("turn exceeded {0} tool-calling rounds")]
    RoundLimit(usize),

    #[error("conversation store rejected the turn: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("conversation {id} changed underneath (expected version {expected}, found {found})")]
    VersionConflict { id: String, expected: u64, found: u64 },
}
