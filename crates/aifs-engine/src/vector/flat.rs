//! Exact brute-force cosine index. Always available; the reference the HNSW
//! backend is checked against.

use std::{collections::HashMap, fs, path::Path};

use aifs_core::AssetId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{
  BackendKind, FilterFields, VectorIndex, VectorMatch, matches_filter, normalize, rank, validate,
};
use crate::{Error, Result, cas::write_atomic};

pub const DATA_FILE: &str = "flat.json";

pub struct FlatIndex {
  dimension: usize,
  entries:   RwLock<HashMap<AssetId, Entry>>,
}

struct Entry {
  unit:   Vec<f32>,
  fields: FilterFields,
}

#[derive(Serialize, Deserialize)]
struct StoredEntry {
  asset_id: AssetId,
  vector:   Vec<f32>,
  #[serde(default)]
  fields:   FilterFields,
}

impl FlatIndex {
  pub fn new(dimension: usize) -> Self {
    Self { dimension, entries: RwLock::new(HashMap::new()) }
  }

  pub fn load(dir: &Path, dimension: usize) -> Result<Self> {
    let bytes = fs::read(dir.join(DATA_FILE))?;
    let stored: Vec<StoredEntry> = serde_json::from_slice(&bytes)?;
    let index = Self::new(dimension);
    {
      let mut entries = index.entries.write();
      for s in stored {
        validate(&s.vector, dimension)?;
        entries.insert(s.asset_id, Entry { unit: s.vector, fields: s.fields });
      }
    }
    Ok(index)
  }
}

fn dot(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

impl VectorIndex for FlatIndex {
  fn backend(&self) -> BackendKind { BackendKind::Flat }

  fn dimension(&self) -> usize { self.dimension }

  fn len(&self) -> usize { self.entries.read().len() }

  fn add_with_fields(&self, id: &AssetId, embedding: &[f32], fields: FilterFields) -> Result<()> {
    validate(embedding, self.dimension)?;
    let entry = Entry { unit: normalize(embedding), fields };
    self.entries.write().insert(id.clone(), entry);
    Ok(())
  }

  fn search(
    &self,
    query: &[f32],
    k: usize,
    filter: Option<&FilterFields>,
  ) -> Result<Vec<VectorMatch>> {
    validate(query, self.dimension)?;
    if k == 0 {
      return Ok(Vec::new());
    }
    let q = normalize(query);
    let entries = self.entries.read();
    let hits = entries
      .iter()
      .filter(|(_, e)| matches_filter(&e.fields, filter))
      .map(|(id, e)| VectorMatch { asset_id: id.clone(), score: dot(&q, &e.unit) })
      .collect();
    Ok(rank(hits, k))
  }

  fn delete(&self, id: &AssetId) -> Result<bool> { Ok(self.entries.write().remove(id).is_some()) }

  fn save(&self, dir: &Path) -> Result<()> {
    let stored: Vec<StoredEntry> = {
      let entries = self.entries.read();
      entries
        .iter()
        .map(|(id, e)| StoredEntry {
          asset_id: id.clone(),
          vector:   e.unit.clone(),
          fields:   e.fields.clone(),
        })
        .collect()
    };
    let bytes = serde_json::to_vec(&stored).map_err(Error::from)?;
    write_atomic(&dir.join(DATA_FILE), &bytes)
  }
}
