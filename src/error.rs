//! Error types for the reference layer.

use crate::types::{StoreFileMeta, StoreFileType};
use thiserror::Error;

/// Main error type for reference operations.
///
/// Construction-time variants are fatal for the reference being built and
/// carry the offending metadata as diagnostic payload. Item variants are
/// expected, caller-recoverable conditions.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store file context is not ok: {}", .meta.id)]
    ContextNotOk { meta: Box<StoreFileMeta> },

    #[error("store file context has no metadata")]
    MetaMissing,

    #[error("store file type mismatch for {}: expected {expected:?}, found {found:?}", .meta.id)]
    TypeMismatch {
        expected: StoreFileType,
        found: StoreFileType,
        meta: Box<StoreFileMeta>,
    },

    #[error("file format version {} of {} is newer than supported {supported}", .meta.fv, .meta.id)]
    VersionIncompatible {
        meta: Box<StoreFileMeta>,
        supported: u32,
    },

    #[error("collection item not found: {0}")]
    ItemNotFound(String),

    #[error("collection item already exists: {0}")]
    ItemExists(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Deserialization(e.to_string())
    }
}

/// Result type for reference operations.
pub type Result<T> = std::result::Result<T, StoreError>;
