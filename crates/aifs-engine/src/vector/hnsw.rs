//! HNSW backend over `usearch`.
//!
//! usearch addresses vectors by `u64` key, so the index keeps a bidirectional
//! key map next to the graph. Keys are never reused. Vectors are normalised
//! before insertion and the graph uses the cosine metric; a usearch distance
//! `d` is reported as similarity `1 - d`.

use std::{collections::HashMap, fs, path::Path};

use aifs_core::AssetId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use super::{
  BackendKind, FilterFields, VectorIndex, VectorMatch, matches_filter, normalize, rank, validate,
};
use crate::{Error, Result, cas::write_atomic};

pub const GRAPH_FILE: &str = "hnsw.usearch";
pub const KEYS_FILE: &str = "hnsw.keys.json";

const INITIAL_CAPACITY: usize = 1024;
const CONNECTIVITY: usize = 16;
const EXPANSION_ADD: usize = 128;
const EXPANSION_SEARCH: usize = 64;

pub struct HnswIndex {
  dimension: usize,
  state:     RwLock<State>,
}

struct State {
  graph:     Index,
  id_to_key: HashMap<AssetId, u64>,
  key_to_id: HashMap<u64, AssetId>,
  fields:    HashMap<AssetId, FilterFields>,
  next_key:  u64,
}

#[derive(Serialize, Deserialize)]
struct StoredKeys {
  next_key: u64,
  entries:  Vec<StoredKey>,
}

#[derive(Serialize, Deserialize)]
struct StoredKey {
  key:      u64,
  asset_id: AssetId,
  #[serde(default)]
  fields:   FilterFields,
}

fn backend_err(op: &str, e: impl std::fmt::Display) -> Error {
  Error::Io(std::io::Error::other(format!("usearch {op} failed: {e}")))
}

fn new_graph(dimension: usize) -> Result<Index> {
  let options = IndexOptions {
    dimensions: dimension,
    metric: MetricKind::Cos,
    quantization: ScalarKind::F32,
    connectivity: CONNECTIVITY,
    expansion_add: EXPANSION_ADD,
    expansion_search: EXPANSION_SEARCH,
    ..Default::default()
  };
  Index::new(&options).map_err(|e| backend_err("create", e))
}

/// Construct and size a throwaway graph to confirm the native library works.
pub(crate) fn probe() -> std::result::Result<(), String> {
  let graph = new_graph(2).map_err(|e| e.to_string())?;
  graph.reserve(1).map_err(|e| e.to_string())
}

fn path_str(path: &Path) -> Result<&str> {
  path
    .to_str()
    .ok_or_else(|| Error::InvalidInput(format!("{} is not valid UTF-8", path.display())))
}

impl HnswIndex {
  pub fn new(dimension: usize) -> Result<Self> {
    let graph = new_graph(dimension)?;
    graph.reserve(INITIAL_CAPACITY).map_err(|e| backend_err("reserve", e))?;
    Ok(Self {
      dimension,
      state: RwLock::new(State {
        graph,
        id_to_key: HashMap::new(),
        key_to_id: HashMap::new(),
        fields: HashMap::new(),
        next_key: 0,
      }),
    })
  }

  pub fn load(dir: &Path, dimension: usize) -> Result<Self> {
    let keys: StoredKeys = serde_json::from_slice(&fs::read(dir.join(KEYS_FILE))?)?;
    let graph = new_graph(dimension)?;
    graph
      .load(path_str(&dir.join(GRAPH_FILE))?)
      .map_err(|e| backend_err("load", e))?;
    if graph.dimensions() != dimension {
      return Err(Error::DimensionMismatch { expected: dimension, actual: graph.dimensions() });
    }

    let mut state = State {
      graph,
      id_to_key: HashMap::with_capacity(keys.entries.len()),
      key_to_id: HashMap::with_capacity(keys.entries.len()),
      fields: HashMap::with_capacity(keys.entries.len()),
      next_key: keys.next_key,
    };
    for k in keys.entries {
      state.id_to_key.insert(k.asset_id.clone(), k.key);
      state.key_to_id.insert(k.key, k.asset_id.clone());
      state.fields.insert(k.asset_id, k.fields);
    }
    Ok(Self { dimension, state: RwLock::new(state) })
  }
}

impl VectorIndex for HnswIndex {
  fn backend(&self) -> BackendKind { BackendKind::Usearch }

  fn dimension(&self) -> usize { self.dimension }

  fn len(&self) -> usize { self.state.read().id_to_key.len() }

  fn add_with_fields(&self, id: &AssetId, embedding: &[f32], fields: FilterFields) -> Result<()> {
    validate(embedding, self.dimension)?;
    let unit = normalize(embedding);

    let mut state = self.state.write();
    if let Some(old) = state.id_to_key.remove(id) {
      state.key_to_id.remove(&old);
      state.graph.remove(old).map_err(|e| backend_err("remove", e))?;
    }

    let (size, capacity) = (state.graph.size(), state.graph.capacity());
    if size >= capacity {
      let grown = (capacity * 2).max(INITIAL_CAPACITY);
      state.graph.reserve(grown).map_err(|e| backend_err("reserve", e))?;
    }

    let key = state.next_key;
    state.graph.add(key, unit.as_slice()).map_err(|e| backend_err("add", e))?;
    state.next_key += 1;
    state.id_to_key.insert(id.clone(), key);
    state.key_to_id.insert(key, id.clone());
    state.fields.insert(id.clone(), fields);
    Ok(())
  }

  fn search(
    &self,
    query: &[f32],
    k: usize,
    filter: Option<&FilterFields>,
  ) -> Result<Vec<VectorMatch>> {
    validate(query, self.dimension)?;
    let state = self.state.read();
    let active = state.key_to_id.len();
    if k == 0 || active == 0 {
      return Ok(Vec::new());
    }

    // Filtered searches scan every candidate; unfiltered ones over-fetch a
    // little so ties at the cut are ranked consistently.
    let request = match filter {
      Some(_) => state.graph.size(),
      None => (k * 2).min(state.graph.size()).max(k.min(active)),
    };
    let matches = state
      .graph
      .search(normalize(query).as_slice(), request)
      .map_err(|e| backend_err("search", e))?;

    let hits = matches
      .keys
      .iter()
      .zip(matches.distances.iter())
      .filter_map(|(key, distance)| {
        let id = state.key_to_id.get(key)?;
        let fields = state.fields.get(id)?;
        matches_filter(fields, filter)
          .then(|| VectorMatch { asset_id: id.clone(), score: 1.0 - distance })
      })
      .collect();
    Ok(rank(hits, k))
  }

  fn delete(&self, id: &AssetId) -> Result<bool> {
    let mut state = self.state.write();
    let Some(key) = state.id_to_key.remove(id) else { return Ok(false) };
    state.key_to_id.remove(&key);
    state.fields.remove(id);
    state.graph.remove(key).map_err(|e| backend_err("remove", e))?;
    Ok(true)
  }

  fn save(&self, dir: &Path) -> Result<()> {
    let state = self.state.read();
    state
      .graph
      .save(path_str(&dir.join(GRAPH_FILE))?)
      .map_err(|e| backend_err("save", e))?;

    let keys = StoredKeys {
      next_key: state.next_key,
      entries:  state
        .id_to_key
        .iter()
        .map(|(id, key)| StoredKey {
          key:      *key,
          asset_id: id.clone(),
          fields:   state.fields.get(id).cloned().unwrap_or_default(),
        })
        .collect(),
    };
    write_atomic(&dir.join(KEYS_FILE), &serde_json::to_vec(&keys)?)
  }
}
