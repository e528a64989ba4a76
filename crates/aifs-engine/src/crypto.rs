//! Signing keys, snapshot signatures, and payload encryption.
//!
//! # Signed message
//!
//! ```text
//! "aifs.snapshot.v1" || u32be(len ns) || ns || u32be(len root) || root || i64be(micros)
//! ```
//!
//! Every field is length-prefixed or fixed width, so no two distinct
//! `(namespace, root, timestamp)` triples encode to the same bytes.
//!
//! # Payload nonces
//!
//! XChaCha20-Poly1305 nonces are a 16-byte random salt chosen once per
//! process followed by a 64-bit big-endian counter. The counter never wraps;
//! exhausting it is an error.

use std::{
  fs,
  io::Write as _,
  path::Path,
  sync::atomic::{AtomicU64, Ordering},
};

use argon2::Argon2;
use chacha20poly1305::{
  Key, KeyInit, XChaCha20Poly1305, XNonce,
  aead::{Aead, Payload},
};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};
use rand_core::{OsRng, RngCore};

use crate::{Error, Result};

const SNAPSHOT_DOMAIN: &[u8] = b"aifs.snapshot.v1";
const PAYLOAD_KEY_CONTEXT: &str = "aifs 2024-06-01 payload encryption v1";

pub const NONCE_LEN: usize = 24;
const SALT_LEN: usize = 16;

// ─── Signing ─────────────────────────────────────────────────────────────────

/// The bytes covered by a snapshot signature.
pub fn snapshot_message(root: &[u8], timestamp: DateTime<Utc>, namespace: &str) -> Vec<u8> {
  let mut msg = Vec::with_capacity(SNAPSHOT_DOMAIN.len() + 16 + namespace.len() + root.len());
  msg.extend_from_slice(SNAPSHOT_DOMAIN);
  msg.extend_from_slice(&(namespace.len() as u32).to_be_bytes());
  msg.extend_from_slice(namespace.as_bytes());
  msg.extend_from_slice(&(root.len() as u32).to_be_bytes());
  msg.extend_from_slice(root);
  msg.extend_from_slice(&timestamp.timestamp_micros().to_be_bytes());
  msg
}

/// Check a snapshot signature against an explicit public key.
pub fn verify(
  signature: &Signature,
  root: &[u8],
  timestamp: DateTime<Utc>,
  namespace: &str,
  public_key: &VerifyingKey,
) -> bool {
  let msg = snapshot_message(root, timestamp, namespace);
  public_key.verify_strict(&msg, signature).is_ok()
}

pub fn parse_public_key(hex_key: &str) -> Result<VerifyingKey> {
  let bytes: [u8; 32] = decode_hex_array(hex_key, "public key")?;
  VerifyingKey::from_bytes(&bytes)
    .map_err(|e| Error::InvalidInput(format!("invalid public key: {e}")))
}

pub fn parse_signature(hex_sig: &str) -> Result<Signature> {
  let bytes: [u8; 64] = decode_hex_array(hex_sig, "signature")?;
  Ok(Signature::from_bytes(&bytes))
}

fn decode_hex_array<const N: usize>(s: &str, what: &str) -> Result<[u8; N]> {
  let mut out = [0u8; N];
  hex::decode_to_slice(s.trim(), &mut out)
    .map_err(|e| Error::InvalidInput(format!("invalid {what} hex: {e}")))?;
  Ok(out)
}

/// Read a hex-encoded Ed25519 seed. A missing file is a configuration error;
/// keys are never generated implicitly.
pub fn load_signing_key(path: &Path) -> Result<SigningKey> {
  let text = match fs::read_to_string(path) {
    Ok(t) => t,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      return Err(Error::Configuration(format!(
        "signing key not found at {}; run `aifs keygen` to create one",
        path.display()
      )));
    }
    Err(e) => return Err(e.into()),
  };
  let seed: [u8; 32] = decode_hex_array(&text, "signing key")
    .map_err(|_| Error::Configuration(format!("{} is not a hex Ed25519 seed", path.display())))?;
  Ok(SigningKey::from_bytes(&seed))
}

/// Create a fresh signing key at `path`. Refuses to overwrite.
pub fn generate_signing_key(path: &Path) -> Result<VerifyingKey> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent)?;
  }
  let key = SigningKey::generate(&mut OsRng);

  let mut opts = fs::OpenOptions::new();
  opts.write(true).create_new(true);
  #[cfg(unix)]
  {
    use std::os::unix::fs::OpenOptionsExt as _;
    opts.mode(0o600);
  }
  let mut file = opts.open(path).map_err(|e| match e.kind() {
    std::io::ErrorKind::AlreadyExists => Error::Configuration(format!(
      "refusing to overwrite existing signing key at {}",
      path.display()
    )),
    _ => e.into(),
  })?;
  writeln!(file, "{}", hex::encode(key.to_bytes()))?;
  file.sync_all()?;

  tracing::info!(path = %path.display(), "generated signing key");
  Ok(key.verifying_key())
}

// ─── Payload encryption ──────────────────────────────────────────────────────

/// 32 bytes of master key material. Never used directly as a cipher key.
pub struct MasterKey([u8; 32]);

impl MasterKey {
  pub fn from_hex(s: &str) -> Result<Self> {
    decode_hex_array(s, "encryption key")
      .map(Self)
      .map_err(|_| Error::Configuration("encryption.key_hex must be 64 hex characters".into()))
  }

  /// Argon2id over a per-store salt.
  pub fn from_passphrase(passphrase: &str, salt: &[u8]) -> Result<Self> {
    let mut out = [0u8; 32];
    Argon2::default()
      .hash_password_into(passphrase.as_bytes(), salt, &mut out)
      .map_err(|e| Error::Configuration(format!("argon2 error: {e}")))?;
    Ok(Self(out))
  }

  /// Purpose-bound sub-key via the BLAKE3 KDF.
  fn derive(&self, context: &str) -> [u8; 32] { blake3::derive_key(context, &self.0) }
}

/// AEAD for stored objects with structurally unique nonces.
pub struct PayloadCipher {
  cipher:  XChaCha20Poly1305,
  salt:    [u8; SALT_LEN],
  counter: AtomicU64,
}

impl PayloadCipher {
  pub fn new(master: &MasterKey) -> Self {
    let key = master.derive(PAYLOAD_KEY_CONTEXT);
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    Self {
      cipher: XChaCha20Poly1305::new(Key::from_slice(&key)),
      salt,
      counter: AtomicU64::new(0),
    }
  }

  fn next_nonce(&self) -> Result<[u8; NONCE_LEN]> {
    let n = self
      .counter
      .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
      .map_err(|_| {
        Error::Configuration("payload nonce counter exhausted; restart to reseed".into())
      })?;
    let mut nonce = [0u8; NONCE_LEN];
    nonce[..SALT_LEN].copy_from_slice(&self.salt);
    nonce[SALT_LEN..].copy_from_slice(&n.to_be_bytes());
    Ok(nonce)
  }

  /// `nonce || ciphertext+tag`, with `aad` authenticated but not stored.
  pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let nonce = self.next_nonce()?;
    let ciphertext = self
      .cipher
      .encrypt(XNonce::from_slice(&nonce), Payload { msg: plaintext, aad })
      .map_err(|_| Error::InvalidInput("payload too large to encrypt".into()))?;
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
  }

  /// Returns `None` on any authentication failure.
  pub fn open(&self, sealed: &[u8], aad: &[u8]) -> Option<Vec<u8>> {
    if sealed.len() < NONCE_LEN {
      return None;
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    self
      .cipher
      .decrypt(XNonce::from_slice(nonce), Payload { msg: ciphertext, aad })
      .ok()
  }
}

// ─── Manager ─────────────────────────────────────────────────────────────────

/// Process-wide signing identity plus the optional payload cipher.
pub struct CryptoManager {
  signing: SigningKey,
  cipher:  Option<std::sync::Arc<PayloadCipher>>,
}

impl CryptoManager {
  pub fn new(signing: SigningKey, cipher: Option<PayloadCipher>) -> Self {
    Self { signing, cipher: cipher.map(std::sync::Arc::new) }
  }

  /// Deterministic for fixed inputs and key.
  pub fn sign(&self, root: &[u8], timestamp: DateTime<Utc>, namespace: &str) -> Signature {
    self.signing.sign(&snapshot_message(root, timestamp, namespace))
  }

  pub fn public_key(&self) -> VerifyingKey { self.signing.verifying_key() }

  pub fn public_key_hex(&self) -> String { hex::encode(self.public_key().to_bytes()) }

  pub fn payload_cipher(&self) -> Option<std::sync::Arc<PayloadCipher>> { self.cipher.clone() }
}
