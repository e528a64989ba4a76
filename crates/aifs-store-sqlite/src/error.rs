//! Error type for `aifs-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] aifs_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored column could not be decoded back into its domain type.
  #[error("corrupt column {column}: {reason}")]
  Corrupt { column: &'static str, reason: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
