// Copyright 2026 TiKV Project Authors. Licensed under Apache-2.0.

use std::fmt;

use thiserror::Error;

/// A lock observed by a read or by a conflicting prewrite.
///
/// Carries everything the client needs to drive lock resolution: the locked
/// key, the transaction's primary key, its start timestamp and the lock TTL.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LockedError {
    pub key: Vec<u8>,
    pub primary: Vec<u8>,
    pub start_ts: u64,
    pub ttl: u64,
}

impl fmt::Display for LockedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "key_len={}, primary_len={}, start_ts={}, ttl={}",
            self.key.len(),
            self.primary.len(),
            self.start_ts,
            self.ttl
        )
    }
}

/// A newer commit was found where a prewrite wanted to install its lock.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WriteConflictError {
    pub start_ts: u64,
    pub conflict_commit_ts: u64,
    pub key: Vec<u8>,
}

impl fmt::Display for WriteConflictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "start_ts={}, conflict_commit_ts={}, key_len={}",
            self.start_ts,
            self.conflict_commit_ts,
            self.key.len()
        )
    }
}

/// An error produced by the MVCC store or the dispatch layer.
///
/// The variants map onto the client-facing key-error channels: `KeyIsLocked`
/// becomes a `locked` error, `WriteConflict`, `Retryable` and
/// `AlreadyRolledBack` become `retryable`, everything else becomes `abort`.
/// `AlreadyCommitted` never reaches the encoder: `Cleanup` surfaces it
/// through the response's `commit_version` field and the rollback paths
/// treat the committed key as a no-op.
#[derive(Debug, Error)]
pub enum Error {
    /// Another transaction holds a lock on the key.
    #[error("key is locked: {0}")]
    KeyIsLocked(LockedError),
    /// A commit newer than the prewrite's start timestamp already exists.
    #[error("write conflict: {0}")]
    WriteConflict(WriteConflictError),
    /// A transient failure; the client retries the same request.
    #[error("retryable: {message}")]
    Retryable { message: String },
    /// The transaction was already committed at `commit_ts`.
    #[error("txn already committed @{commit_ts}")]
    AlreadyCommitted { commit_ts: u64 },
    /// The transaction was already rolled back.
    #[error("txn already rolled back (start_ts={start_ts})")]
    AlreadyRolledBack { start_ts: u64 },
    /// Commit found neither a matching lock nor a commit record.
    #[error("txn lock not found (start_ts={start_ts})")]
    TxnLockNotFound { start_ts: u64 },
    /// The coprocessor was asked for a request type it does not serve.
    #[error("unsupported coprocessor request type {tp}")]
    UnsupportedCopType { tp: i64 },
    /// A non-retryable store failure; the client aborts the transaction.
    #[error("abort: {message}")]
    Abort { message: String },
}

impl Error {
    pub fn retryable(message: impl Into<String>) -> Error {
        Error::Retryable {
            message: message.into(),
        }
    }

    pub fn abort(message: impl Into<String>) -> Error {
        Error::Abort {
            message: message.into(),
        }
    }
}

/// A result holding an [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
