//! Runtime error types, one enum per layer.

use std::path::PathBuf;

use ledger_kernel::error::KernelError;

use crate::store::DocKey;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document {0} changed since it was read")]
    Conflict(DocKey),
    #[error("read of {0} after the transaction started writing")]
    ReadAfterWrite(DocKey),
    #[error("transaction abandoned after {attempts} conflicting attempts")]
    Contention { attempts: u32 },
    #[error("document {key} is malformed")]
    Malformed {
        key: DocKey,
        #[source]
        source: serde_json::Error,
    },
    #[error("document {key} could not be encoded")]
    Encode {
        key: DocKey,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("journal I/O failed on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sequence violation in journal: expected {expected}, got {actual}")]
    Sequence { expected: u64, actual: u64 },
    #[error("invalid frame length {len} at offset {offset}")]
    FrameLength { len: usize, offset: u64 },
    #[error("truncated frame at offset {offset}")]
    Truncated { offset: u64 },
    #[error("protobuf decode error at offset {offset}")]
    Decode {
        offset: u64,
        #[source]
        source: prost::DecodeError,
    },
    #[error("journal frame {sequence} is invalid: {reason}")]
    InvalidFrame { sequence: u64, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors surfaced by callable operations and the change handlers.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Kernel(#[from] KernelError),
    #[error(transparent)]
    Journal(#[from] JournalError),
}
