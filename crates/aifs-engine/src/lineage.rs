//! In-memory provenance graph.
//!
//! Nodes are dense indices into an arena; edges live in one vector and each
//! node keeps the indices of its incoming and outgoing edges. Removed edges
//! leave a `None` slot so indices stay stable. The metadata store is the
//! source of truth; this graph is rebuilt from it on open.

use std::collections::{HashMap, HashSet, VecDeque};

use aifs_core::{AssetId, LineageDirection, Relationship};
use parking_lot::{RwLock, RwLockReadGuard};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Default)]
pub struct LineageGraph {
  arena: RwLock<Arena>,
}

#[derive(Default)]
pub struct Arena {
  index: HashMap<AssetId, usize>,
  nodes: Vec<Node>,
  edges: Vec<Option<Relationship>>,
  by_id: HashMap<Uuid, usize>,
  live:  usize,
}

#[derive(Default)]
struct Node {
  incoming: Vec<usize>,
  outgoing: Vec<usize>,
}

impl LineageGraph {
  pub fn new() -> Self { Self::default() }

  /// Trusts `edges` to be acyclic, as they were checked when first added.
  pub fn from_edges(edges: impl IntoIterator<Item = Relationship>) -> Self {
    let mut arena = Arena::default();
    for edge in edges {
      arena.insert(edge);
    }
    Self { arena: RwLock::new(arena) }
  }

  /// Shared access for walks. Holds the read lock until dropped.
  pub fn read(&self) -> RwLockReadGuard<'_, Arena> { self.arena.read() }

  pub fn would_cycle(&self, parent: &AssetId, child: &AssetId) -> bool {
    self.arena.read().would_cycle(parent, child)
  }

  /// Insert `edge` unless it would close a cycle, in which case the graph is
  /// left untouched.
  pub fn add_relationship(&self, edge: Relationship) -> Result<()> {
    let mut arena = self.arena.write();
    if arena.would_cycle(&edge.parent_id, &edge.child_id) {
      return Err(Error::CycleDetected { parent: edge.parent_id, child: edge.child_id });
    }
    arena.insert(edge);
    Ok(())
  }

  /// Insert several edges as a unit: either all are added or none.
  pub fn add_relationships(&self, edges: &[Relationship]) -> Result<()> {
    let mut arena = self.arena.write();
    let mut added = Vec::with_capacity(edges.len());
    for edge in edges {
      if arena.would_cycle(&edge.parent_id, &edge.child_id) {
        for id in added {
          arena.remove_edge(id);
        }
        return Err(Error::CycleDetected {
          parent: edge.parent_id.clone(),
          child:  edge.child_id.clone(),
        });
      }
      arena.insert(edge.clone());
      added.push(edge.relationship_id);
    }
    Ok(())
  }

  pub fn remove_relationship(&self, relationship_id: Uuid) -> bool {
    self.arena.write().remove_edge(relationship_id)
  }

  /// Drop every edge touching `id`. Returns how many were removed.
  pub fn remove_asset(&self, id: &AssetId) -> usize {
    let mut arena = self.arena.write();
    let Some(&node) = arena.index.get(id) else { return 0 };
    let touching: Vec<Uuid> = arena.nodes[node]
      .incoming
      .iter()
      .chain(&arena.nodes[node].outgoing)
      .filter_map(|&e| arena.edges[e].as_ref().map(|r| r.relationship_id))
      .collect();
    touching.into_iter().filter(|rid| arena.remove_edge(*rid)).count()
  }

  pub fn edge_count(&self) -> usize { self.arena.read().live }
}

impl Arena {
  fn node(&mut self, id: &AssetId) -> usize {
    if let Some(&n) = self.index.get(id) {
      return n;
    }
    let n = self.nodes.len();
    self.nodes.push(Node::default());
    self.index.insert(id.clone(), n);
    n
  }

  fn insert(&mut self, edge: Relationship) {
    let parent = self.node(&edge.parent_id);
    let child = self.node(&edge.child_id);
    let e = self.edges.len();
    self.nodes[parent].outgoing.push(e);
    self.nodes[child].incoming.push(e);
    self.by_id.insert(edge.relationship_id, e);
    self.edges.push(Some(edge));
    self.live += 1;
  }

  fn remove_edge(&mut self, relationship_id: Uuid) -> bool {
    let Some(e) = self.by_id.remove(&relationship_id) else { return false };
    let Some(edge) = self.edges[e].take() else { return false };
    if let Some(&p) = self.index.get(&edge.parent_id) {
      self.nodes[p].outgoing.retain(|&x| x != e);
    }
    if let Some(&c) = self.index.get(&edge.child_id) {
      self.nodes[c].incoming.retain(|&x| x != e);
    }
    self.live -= 1;
    true
  }

  /// Whether `parent -> child` would close a cycle: true when they are the
  /// same asset or `child` already reaches `parent`.
  pub fn would_cycle(&self, parent: &AssetId, child: &AssetId) -> bool {
    if parent == child {
      return true;
    }
    self
      .walk(child, LineageDirection::Descendants, usize::MAX)
      .any(|step| &step.edge.child_id == parent)
  }

  pub fn ancestors(&self, id: &AssetId, depth: usize) -> LineageWalk<'_> {
    self.walk(id, LineageDirection::Ancestors, depth)
  }

  pub fn descendants(&self, id: &AssetId, depth: usize) -> LineageWalk<'_> {
    self.walk(id, LineageDirection::Descendants, depth)
  }

  pub fn walk(&self, id: &AssetId, direction: LineageDirection, depth: usize) -> LineageWalk<'_> {
    let mut walk = LineageWalk {
      arena: self,
      direction,
      max_depth: depth,
      queue: VecDeque::new(),
      pending: VecDeque::new(),
      seen: HashSet::new(),
    };
    if let Some(&start) = self.index.get(id) {
      walk.seen.insert(start);
      walk.queue.push_back((start, 0));
    }
    walk
  }
}

// ─── Walks ───────────────────────────────────────────────────────────────────

/// One edge reached by a walk, `depth` hops from the start.
#[derive(Debug, Clone, Copy)]
pub struct LineageStep<'a> {
  pub edge:  &'a Relationship,
  pub depth: usize,
}

/// Breadth-first walk over edges. Each node is expanded once, so each edge
/// is yielded once. A clone continues independently from the same position,
/// so cloning a fresh walk restarts it.
#[derive(Clone)]
pub struct LineageWalk<'a> {
  arena:     &'a Arena,
  direction: LineageDirection,
  max_depth: usize,
  queue:     VecDeque<(usize, usize)>,
  pending:   VecDeque<(usize, usize)>,
  seen:      HashSet<usize>,
}

impl<'a> Iterator for LineageWalk<'a> {
  type Item = LineageStep<'a>;

  fn next(&mut self) -> Option<Self::Item> {
    let arena: &'a Arena = self.arena;
    loop {
      if let Some((e, depth)) = self.pending.pop_front() {
        let Some(edge) = arena.edges[e].as_ref() else { continue };
        let far = match self.direction {
          LineageDirection::Ancestors => &edge.parent_id,
          LineageDirection::Descendants => &edge.child_id,
        };
        if let Some(&n) = arena.index.get(far)
          && self.seen.insert(n)
        {
          self.queue.push_back((n, depth));
        }
        return Some(LineageStep { edge, depth });
      }

      let (node, depth) = self.queue.pop_front()?;
      if depth >= self.max_depth {
        continue;
      }
      let node = &arena.nodes[node];
      let edges = match self.direction {
        LineageDirection::Ancestors => &node.incoming,
        LineageDirection::Descendants => &node.outgoing,
      };
      self.pending.extend(edges.iter().map(|&e| (e, depth + 1)));
    }
  }
}
