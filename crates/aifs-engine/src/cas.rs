//! Content-addressed object storage.
//!
//! Objects live at `<root>/objects/ab/cd/<id>` (one directory level per two
//! hex characters, `shard_depth` levels). Each file is a small header
//! followed by the payload:
//!
//! ```text
//! "AIFS" | version u8 | flags u8 | hash algorithm u8 | payload
//! ```
//!
//! Flag bit 0 marks a zstd-compressed payload, bit 1 an encrypted one
//! (`nonce || ciphertext+tag`, id as associated data). Compression happens
//! before encryption. The id is always the hash of the original plaintext.

use std::{
  fs, io,
  path::{Path, PathBuf},
  sync::Arc,
};

use aifs_core::{AssetId, HashAlgorithm};
use bytes::Bytes;
use uuid::Uuid;

use crate::{
  Error, Result,
  cache::BlobCache,
  crypto::PayloadCipher,
  retry::with_retry,
};

const MAGIC: &[u8; 4] = b"AIFS";
const OBJECT_VERSION: u8 = 1;
const HEADER_LEN: usize = 7;

const FLAG_COMPRESSED: u8 = 0b01;
const FLAG_ENCRYPTED: u8 = 0b10;
const KNOWN_FLAGS: u8 = FLAG_COMPRESSED | FLAG_ENCRYPTED;

/// Result of [`ContentStore::put`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
  pub id:            AssetId,
  /// `false` when an object with this id was already present.
  pub newly_written: bool,
}

/// Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct ContentStore {
  inner: Arc<Inner>,
}

struct Inner {
  objects:     PathBuf,
  algorithm:   HashAlgorithm,
  shard_depth: usize,
  compression: Option<i32>,
  cipher:      Option<Arc<PayloadCipher>>,
  cache:       Option<Arc<BlobCache>>,
}

/// Options for [`ContentStore::open`].
#[derive(Default)]
pub struct ContentStoreOptions {
  pub algorithm:   HashAlgorithm,
  pub shard_depth: usize,
  /// zstd level; `None` stores payloads uncompressed.
  pub compression: Option<i32>,
  pub cipher:      Option<Arc<PayloadCipher>>,
  pub cache:       Option<Arc<BlobCache>>,
}

impl ContentStore {
  /// Open (creating if needed) the object tree under `<root>/objects`.
  pub fn open(root: &Path, options: ContentStoreOptions) -> Result<Self> {
    let objects = root.join("objects");
    fs::create_dir_all(&objects)?;
    Ok(Self {
      inner: Arc::new(Inner {
        objects,
        algorithm: options.algorithm,
        shard_depth: options.shard_depth,
        compression: options.compression,
        cipher: options.cipher,
        cache: options.cache,
      }),
    })
  }

  pub fn algorithm(&self) -> HashAlgorithm { self.inner.algorithm }

  pub fn is_encrypted(&self) -> bool { self.inner.cipher.is_some() }

  pub fn is_compressed(&self) -> bool { self.inner.compression.is_some() }

  /// Where the object for `id` lives, whether or not it exists.
  pub fn object_path(&self, id: &AssetId) -> PathBuf {
    let hex = id.as_str();
    let mut path = self.inner.objects.clone();
    for level in 0..self.inner.shard_depth {
      path.push(&hex[level * 2..level * 2 + 2]);
    }
    path.push(hex);
    path
  }

  // ── Async API ─────────────────────────────────────────────────────────────

  pub async fn put(&self, data: Bytes) -> Result<PutOutcome> {
    let this = self.clone();
    blocking(move || this.put_blocking(&data)).await
  }

  pub async fn get(&self, id: &AssetId) -> Result<Bytes> {
    if let Some(hit) = self.inner.cache.as_ref().and_then(|c| c.get(id)) {
      return Ok(hit);
    }
    let epoch = self.inner.cache.as_ref().map(|c| c.epoch());
    let this = self.clone();
    let id = id.clone();
    blocking(move || {
      let data = Bytes::from(this.read_verified(&id)?);
      if let (Some(cache), Some(epoch)) = (&this.inner.cache, epoch) {
        cache.fill(id, data.clone(), epoch);
      }
      Ok(data)
    })
    .await
  }

  pub async fn exists(&self, id: &AssetId) -> Result<bool> {
    let path = self.object_path(id);
    blocking(move || Ok(path.try_exists()?)).await
  }

  /// Unlink the object, then evict it. Reads that raced the unlink cannot
  /// refill the cache afterwards.
  pub async fn delete(&self, id: &AssetId) -> Result<()> {
    let path = self.object_path(id);
    let owned = id.clone();
    let removed = blocking(move || match with_retry("remove object", || fs::remove_file(&path)) {
      Ok(()) => {
        tracing::debug!(asset_id = %owned, "content object removed");
        Ok(())
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        Err(Error::NotFound(format!("content {owned}")))
      }
      Err(e) => Err(e.into()),
    })
    .await;
    if let Some(cache) = &self.inner.cache {
      cache.remove(id);
    }
    removed
  }

  /// Full integrity check, bypassing the cache. `Ok(false)` means the object
  /// exists but is corrupt.
  pub async fn verify(&self, id: &AssetId) -> Result<bool> {
    let this = self.clone();
    let id = id.clone();
    blocking(move || match this.read_verified(&id) {
      Ok(_) => Ok(true),
      Err(Error::Integrity { reason, .. }) => {
        tracing::warn!(asset_id = %id, %reason, "content failed verification");
        Ok(false)
      }
      Err(e) => Err(e),
    })
    .await
  }

  // ── Blocking internals ────────────────────────────────────────────────────

  fn put_blocking(&self, data: &[u8]) -> Result<PutOutcome> {
    let id = self.inner.algorithm.content_id(data);
    let path = self.object_path(&id);
    if path.try_exists()? {
      return Ok(PutOutcome { id, newly_written: false });
    }

    let encoded = self.encode(&id, data)?;
    if let Some(dir) = path.parent() {
      with_retry("create shard", || fs::create_dir_all(dir))?;
    }
    write_atomic(&path, &encoded)?;
    tracing::debug!(
      asset_id = %id,
      size = data.len(),
      stored = encoded.len(),
      "content object written"
    );
    Ok(PutOutcome { id, newly_written: true })
  }

  fn read_verified(&self, id: &AssetId) -> Result<Vec<u8>> {
    let path = self.object_path(id);
    let raw = match with_retry("read object", || fs::read(&path)) {
      Ok(raw) => raw,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        return Err(Error::NotFound(format!("content {id}")));
      }
      Err(e) => return Err(e.into()),
    };
    self.decode(id, &raw)
  }

  fn encode(&self, id: &AssetId, data: &[u8]) -> Result<Vec<u8>> {
    let mut flags = 0u8;
    let mut payload = match self.inner.compression {
      Some(level) => {
        let compressed = zstd::encode_all(data, level)?;
        // Incompressible data is stored as is.
        if compressed.len() < data.len() {
          flags |= FLAG_COMPRESSED;
          compressed
        } else {
          data.to_vec()
        }
      }
      None => data.to_vec(),
    };
    if let Some(cipher) = &self.inner.cipher {
      payload = cipher.seal(&payload, id.as_str().as_bytes())?;
      flags |= FLAG_ENCRYPTED;
    }

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    out.push(OBJECT_VERSION);
    out.push(flags);
    out.push(self.inner.algorithm.code());
    out.extend_from_slice(&payload);
    Ok(out)
  }

  fn decode(&self, id: &AssetId, raw: &[u8]) -> Result<Vec<u8>> {
    if raw.len() < HEADER_LEN || &raw[..4] != MAGIC {
      return Err(Error::integrity(id.as_str(), "unrecognised object header"));
    }
    if raw[4] != OBJECT_VERSION {
      return Err(Error::integrity(
        id.as_str(),
        format!("unsupported object version {}", raw[4]),
      ));
    }
    let flags = raw[5];
    if flags & !KNOWN_FLAGS != 0 {
      return Err(Error::integrity(id.as_str(), format!("unknown flags {flags:#04x}")));
    }
    let algorithm = HashAlgorithm::from_code(raw[6]).ok_or_else(|| {
      Error::integrity(id.as_str(), format!("unknown hash algorithm code {}", raw[6]))
    })?;

    let mut payload = raw[HEADER_LEN..].to_vec();
    if flags & FLAG_ENCRYPTED != 0 {
      let cipher = self.inner.cipher.as_ref().ok_or_else(|| {
        Error::Configuration(format!("object {id} is encrypted but no key is configured"))
      })?;
      payload = cipher
        .open(&payload, id.as_str().as_bytes())
        .ok_or_else(|| Error::integrity(id.as_str(), "decryption failed"))?;
    }
    if flags & FLAG_COMPRESSED != 0 {
      payload = zstd::decode_all(payload.as_slice())
        .map_err(|e| Error::integrity(id.as_str(), format!("decompression failed: {e}")))?;
    }

    if algorithm.content_id(&payload) != *id {
      return Err(Error::integrity(id.as_str(), "content hash mismatch"));
    }
    Ok(payload)
  }
}

/// Write `bytes` to `path` via a sibling temp file and a rename, so readers
/// see either the old state or the complete new file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
  let dir = path
    .parent()
    .ok_or_else(|| Error::InvalidInput(format!("{} has no parent directory", path.display())))?;
  let tmp = dir.join(format!(".tmp-{}", Uuid::new_v4().simple()));

  let written = with_retry("write temp file", || {
    let mut file = fs::File::create(&tmp)?;
    io::Write::write_all(&mut file, bytes)?;
    file.sync_all()
  })
  .and_then(|()| with_retry("rename temp file", || fs::rename(&tmp, path)));

  if let Err(e) = written {
    let _ = fs::remove_file(&tmp);
    return Err(e.into());
  }
  Ok(())
}

/// Run filesystem work off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T>
where
  F: FnOnce() -> Result<T> + Send + 'static,
  T: Send + 'static,
{
  tokio::task::spawn_blocking(f)
    .await
    .map_err(|e| Error::Io(io::Error::other(e)))?
}
