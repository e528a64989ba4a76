//! `<root>/aifs.json`: the store-level manifest.
//!
//! Written once when a storage root is first opened. It pins the on-disk
//! format version and holds the salt for passphrase-derived keys, so the same
//! passphrase always yields the same master key for this store.

use std::{fs, path::Path};

use aifs_core::HashAlgorithm;
use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, cas::write_atomic};

pub const MANIFEST_FILE: &str = "aifs.json";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreManifest {
  pub format_version: u32,
  /// Algorithm configured when the store was created. Objects carry their
  /// own, so this is informational.
  pub hash_algorithm: HashAlgorithm,
  /// Hex; 16 random bytes.
  pub kdf_salt:       String,
  pub created_at:     DateTime<Utc>,
}

impl StoreManifest {
  pub fn load_or_create(root: &Path, hash_algorithm: HashAlgorithm) -> Result<Self> {
    let path = root.join(MANIFEST_FILE);
    match fs::read(&path) {
      Ok(bytes) => {
        let manifest: Self = serde_json::from_slice(&bytes)?;
        if manifest.format_version != FORMAT_VERSION {
          return Err(Error::Configuration(format!(
            "{} has format version {}, this build supports {}",
            path.display(),
            manifest.format_version,
            FORMAT_VERSION
          )));
        }
        if manifest.hash_algorithm != hash_algorithm {
          tracing::info!(
            created_with = %manifest.hash_algorithm,
            configured = %hash_algorithm,
            "hash algorithm differs from the one the store was created with"
          );
        }
        Ok(manifest)
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);
        let manifest = Self {
          format_version: FORMAT_VERSION,
          hash_algorithm,
          kdf_salt: hex::encode(salt),
          created_at: Utc::now(),
        };
        fs::create_dir_all(root)?;
        write_atomic(&path, &serde_json::to_vec_pretty(&manifest)?)?;
        tracing::info!(root = %root.display(), "initialised storage root");
        Ok(manifest)
      }
      Err(e) => Err(e.into()),
    }
  }

  pub fn salt_bytes(&self) -> Result<Vec<u8>> {
    hex::decode(&self.kdf_salt)
      .map_err(|e| Error::Configuration(format!("corrupt kdf_salt in {MANIFEST_FILE}: {e}")))
  }
}
