//! Error type for `aifs-engine`.
//!
//! Every variant maps to one [`ErrorKind`] so a transport layer can turn it
//! into a status code without matching on messages.

use aifs_core::AssetId;
use strum::{AsRefStr, Display};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("not found: {0}")]
  NotFound(String),

  /// Stored content no longer matches its address, or failed to decrypt.
  #[error("integrity check failed for {id}: {reason}")]
  Integrity { id: String, reason: String },

  #[error("snapshot {snapshot_id}: signature does not verify")]
  SignatureInvalid { snapshot_id: Uuid },

  /// The assets a snapshot names no longer rebuild its recorded root.
  #[error(
    "snapshot {snapshot_id}: root mismatch (recorded {expected}, recomputed {actual}, {} \
     missing or corrupt)",
    missing.len()
  )]
  RootMismatch {
    snapshot_id: Uuid,
    expected:    String,
    actual:      String,
    missing:     Vec<AssetId>,
  },

  #[error("embedding has {actual} dimensions, index expects {expected}")]
  DimensionMismatch { expected: usize, actual: usize },

  #[error("invalid embedding: {0}")]
  InvalidEmbedding(String),

  #[error("edge {parent} -> {child} would create a cycle")]
  CycleDetected { parent: AssetId, child: AssetId },

  #[error("assets not found: {}", join_ids(missing))]
  AssetNotFound { missing: Vec<AssetId> },

  #[error("vector backend {backend} unavailable: {reason}")]
  BackendUnavailable { backend: String, reason: String },

  /// A multi-step operation failed part way; completed steps were rolled
  /// back.
  #[error("{operation} failed and was rolled back: {source}")]
  TransactionFailed {
    operation: &'static str,
    #[source]
    source:    Box<Error>,
  },

  #[error("{operation} exceeded its deadline")]
  Timeout { operation: &'static str },

  #[error("invalid input: {0}")]
  InvalidInput(String),

  #[error("configuration error: {0}")]
  Configuration(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("core error: {0}")]
  Core(#[from] aifs_core::Error),

  #[error("metadata store error: {0}")]
  Metadata(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn join_ids(ids: &[AssetId]) -> String {
  ids.iter().map(AssetId::as_str).collect::<Vec<_>>().join(", ")
}

/// The caller-facing category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
  NotFound,
  Integrity,
  SignatureInvalid,
  RootMismatch,
  DimensionMismatch,
  InvalidEmbedding,
  CycleDetected,
  AssetNotFound,
  BackendUnavailable,
  TransactionFailed,
  Timeout,
  InvalidInput,
  Configuration,
  Io,
  Metadata,
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Error::NotFound(_) => ErrorKind::NotFound,
      Error::Integrity { .. } => ErrorKind::Integrity,
      Error::SignatureInvalid { .. } => ErrorKind::SignatureInvalid,
      Error::RootMismatch { .. } => ErrorKind::RootMismatch,
      Error::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
      Error::InvalidEmbedding(_) => ErrorKind::InvalidEmbedding,
      Error::CycleDetected { .. } => ErrorKind::CycleDetected,
      Error::AssetNotFound { .. } => ErrorKind::AssetNotFound,
      Error::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
      Error::TransactionFailed { .. } => ErrorKind::TransactionFailed,
      Error::Timeout { .. } => ErrorKind::Timeout,
      Error::InvalidInput(_) | Error::Core(_) => ErrorKind::InvalidInput,
      Error::Configuration(_) => ErrorKind::Configuration,
      Error::Io(_) | Error::Json(_) => ErrorKind::Io,
      Error::Metadata(_) => ErrorKind::Metadata,
    }
  }

  /// Hash, decryption, signature and root failures. These are never retried.
  pub fn is_integrity(&self) -> bool {
    matches!(
      self.kind(),
      ErrorKind::Integrity | ErrorKind::SignatureInvalid | ErrorKind::RootMismatch
    )
  }

  /// The innermost error beneath any `TransactionFailed` wrappers.
  pub fn root_cause(&self) -> &Error {
    match self {
      Error::TransactionFailed { source, .. } => source.root_cause(),
      other => other,
    }
  }

  pub(crate) fn metadata<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Error::Metadata(Box::new(e))
  }

  pub(crate) fn integrity(id: impl Into<String>, reason: impl Into<String>) -> Self {
    Error::Integrity { id: id.into(), reason: reason.into() }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kinds_are_distinct_for_snapshot_failures() {
    let sig = Error::SignatureInvalid { snapshot_id: Uuid::nil() };
    let root = Error::RootMismatch {
      snapshot_id: Uuid::nil(),
      expected:    "a".into(),
      actual:      "b".into(),
      missing:     vec![],
    };
    assert_ne!(sig.kind(), root.kind());
    assert!(sig.is_integrity() && root.is_integrity());
  }

  #[test]
  fn root_cause_unwraps_transactions() {
    let err = Error::TransactionFailed {
      operation: "put_asset",
      source:    Box::new(Error::DimensionMismatch { expected: 3, actual: 2 }),
    };
    assert_eq!(err.kind(), ErrorKind::TransactionFailed);
    assert_eq!(err.root_cause().kind(), ErrorKind::DimensionMismatch);
    assert_eq!(ErrorKind::AssetNotFound.to_string(), "asset_not_found");
  }

  #[test]
  fn asset_not_found_lists_every_id() {
    let a = aifs_core::HashAlgorithm::Sha256.content_id(b"a");
    let b = aifs_core::HashAlgorithm::Sha256.content_id(b"b");
    let msg = Error::AssetNotFound { missing: vec![a.clone(), b.clone()] }.to_string();
    assert!(msg.contains(a.as_str()) && msg.contains(b.as_str()));
  }
}
