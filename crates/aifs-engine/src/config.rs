//! Engine configuration, deserialised from `aifs.toml` and `AIFS__*`
//! environment variables.

use std::{
  fmt,
  path::{Path, PathBuf},
};

use aifs_core::HashAlgorithm;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, vector::BackendPolicy};

/// Environment variable prefix; nested keys use `__`, e.g.
/// `AIFS__VECTOR__DIMENSION=384`.
pub const ENV_PREFIX: &str = "AIFS";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub storage_root:   PathBuf,
  pub hash_algorithm: HashAlgorithm,
  /// Directory levels of two hex characters each under `objects/`.
  pub shard_depth:    usize,
  pub compression:    CompressionConfig,
  pub encryption:     EncryptionConfig,
  pub signing:        SigningConfig,
  pub vector:         VectorConfig,
  pub cache:          CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
  pub enabled: bool,
  /// zstd level.
  pub level:   i32,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
  pub enabled:    bool,
  /// 32-byte master key, hex.
  pub key_hex:    Option<String>,
  /// Stretched with Argon2id when `key_hex` is absent.
  pub passphrase: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
  /// Defaults to `<storage_root>/keys/signing.key`.
  pub key_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
  pub dimension: usize,
  pub backend:   BackendPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Byte budget of the blob cache; 0 disables it.
  pub max_bytes: usize,
}

// ─── Defaults ────────────────────────────────────────────────────────────────

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      storage_root:   PathBuf::from("./aifs-data"),
      hash_algorithm: HashAlgorithm::default(),
      shard_depth:    2,
      compression:    CompressionConfig::default(),
      encryption:     EncryptionConfig::default(),
      signing:        SigningConfig::default(),
      vector:         VectorConfig::default(),
      cache:          CacheConfig::default(),
    }
  }
}

impl Default for CompressionConfig {
  fn default() -> Self { Self { enabled: false, level: 3 } }
}

impl Default for VectorConfig {
  fn default() -> Self { Self { dimension: 1536, backend: BackendPolicy::Auto } }
}

impl Default for CacheConfig {
  fn default() -> Self { Self { max_bytes: 32 * 1024 * 1024 } }
}

impl fmt::Debug for EncryptionConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EncryptionConfig")
      .field("enabled", &self.enabled)
      .field("key_hex", &self.key_hex.as_ref().map(|_| "<redacted>"))
      .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
      .finish()
  }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

impl EngineConfig {
  /// Defaults rooted at `root`.
  pub fn for_root(root: impl Into<PathBuf>) -> Self {
    Self { storage_root: root.into(), ..Self::default() }
  }

  /// Layer an optional TOML file and the environment over the defaults.
  pub fn load(file: Option<&Path>) -> Result<Self> {
    let mut builder = config::Config::builder();
    if let Some(path) = file {
      builder = builder.add_source(config::File::from(path).required(false));
    }
    let settings = builder
      .add_source(
        config::Environment::with_prefix(ENV_PREFIX)
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .map_err(|e| Error::Configuration(e.to_string()))?;

    let cfg: Self = settings
      .try_deserialize()
      .map_err(|e| Error::Configuration(e.to_string()))?;
    cfg.validate()?;
    Ok(cfg)
  }

  pub fn validate(&self) -> Result<()> {
    if self.vector.dimension == 0 {
      return Err(Error::Configuration("vector.dimension must be positive".into()));
    }
    if self.shard_depth > 4 {
      return Err(Error::Configuration(format!(
        "shard_depth {} exceeds the maximum of 4",
        self.shard_depth
      )));
    }
    if !(1..=22).contains(&self.compression.level) {
      return Err(Error::Configuration(format!(
        "compression.level {} is outside 1..=22",
        self.compression.level
      )));
    }
    let enc = &self.encryption;
    if enc.enabled && enc.key_hex.is_none() && enc.passphrase.is_none() {
      return Err(Error::Configuration(
        "encryption.enabled requires encryption.key_hex or encryption.passphrase".into(),
      ));
    }
    Ok(())
  }

  pub fn signing_key_path(&self) -> PathBuf {
    self
      .signing
      .key_path
      .clone()
      .unwrap_or_else(|| self.storage_root.join("keys").join("signing.key"))
  }

  pub fn metadata_path(&self) -> PathBuf { self.storage_root.join("metadata.db") }

  pub fn vectors_dir(&self) -> PathBuf { self.storage_root.join("vectors") }
}
