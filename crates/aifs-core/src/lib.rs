//! Core types and trait definitions for the AIFS storage core.
//!
//! This crate is deliberately free of filesystem and database dependencies.
//! Every other crate depends on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod asset;
pub mod error;
pub mod hash;
pub mod lineage;
pub mod snapshot;
pub mod store;

pub use asset::{Asset, AssetId, AssetKind, Metadata, NewAsset, ParentLink};
pub use error::{Error, Result};
pub use hash::HashAlgorithm;
pub use lineage::{LineageDirection, Relationship, RelationshipKind, Transform};
pub use snapshot::Snapshot;
