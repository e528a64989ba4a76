//! The AIFS storage engine.
//!
//! [`AssetManager`] coordinates the content-addressed object store, the
//! vector index, the provenance graph, and signed Merkle snapshots over a
//! [`aifs_core::store::MetadataStore`]. The pieces are public for callers
//! that only need one of them, such as verifying a proof offline.
//!
//! # Opening an engine
//!
//! ```rust,ignore
//! let config = EngineConfig::load(Some(Path::new("aifs.toml")))?;
//! let manager = AssetManager::open(config).await?;
//! let asset = manager.put_asset(NewAsset::new(&b"hello"[..], "blob")).await?;
//! ```

pub mod cache;
pub mod cas;
pub mod config;
pub mod crypto;
pub mod deadline;
pub mod error;
pub mod lineage;
pub mod locks;
pub mod manager;
pub mod manifest;
pub mod merkle;
pub mod vector;

mod retry;

pub use config::EngineConfig;
pub use deadline::Deadline;
pub use error::{Error, ErrorKind, Result};
pub use manager::{
  AssetManager, AssetManagerBuilder, DeleteOutcome, EngineStats, LineageEntry, SearchHit,
};
pub use merkle::{MerkleProof, MerkleTree, verify_proof};

#[cfg(test)]
mod tests;
