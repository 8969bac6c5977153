//! Node storage collaborators
//!
//! Every read returns owned copies, so a compilation works on a private
//! snapshot and never observes a concurrent write half-way through.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::StoreError;
use crate::models::Node;

/// Read-only node access used by the compiler
pub trait NodeStore: Send + Sync {
    /// Nodes for the given ids, in the order of `ids`; unknown ids are skipped
    fn list_by_ids(&self, ids: &[u64]) -> Result<Vec<Node>, StoreError>;

    /// Nodes belonging to `group`, in store order
    fn list_by_group(&self, group: &str) -> Result<Vec<Node>, StoreError>;
}

#[derive(Debug, Clone, Default)]
struct NodeTable {
    nodes: Vec<Node>,
    index: HashMap<u64, usize>,
}

impl NodeTable {
    fn upsert(&mut self, node: Node) {
        match self.index.get(&node.id) {
            Some(&pos) => self.nodes[pos] = node,
            None => {
                self.index.insert(node.id, self.nodes.len());
                self.nodes.push(node);
            }
        }
    }

    fn remove(&mut self, id: u64) -> bool {
        if self.index.remove(&id).is_none() {
            return false;
        }
        self.nodes.retain(|n| n.id != id);
        self.index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(pos, n)| (n.id, pos))
            .collect();
        true
    }

    fn get(&self, id: u64) -> Option<&Node> {
        self.index.get(&id).map(|&pos| &self.nodes[pos])
    }
}

/// In-memory node store with copy-on-write snapshots
#[derive(Debug, Default)]
pub struct MemoryNodeStore {
    table: RwLock<Arc<NodeTable>>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let store = Self::new();
        for node in nodes {
            store.upsert(node);
        }
        store
    }

    fn snapshot(&self) -> Result<Arc<NodeTable>, StoreError> {
        self.table
            .read()
            .map(|guard| Arc::clone(&*guard))
            .map_err(|_| StoreError::Poisoned)
    }

    /// Insert or replace a node. Readers holding an older snapshot are unaffected.
    pub fn upsert(&self, node: Node) {
        if let Ok(mut guard) = self.table.write() {
            Arc::make_mut(&mut *guard).upsert(node);
        }
    }

    pub fn remove(&self, id: u64) -> bool {
        match self.table.write() {
            Ok(mut guard) => Arc::make_mut(&mut *guard).remove(id),
            Err(_) => false,
        }
    }

    pub fn get(&self, id: u64) -> Option<Node> {
        self.snapshot().ok()?.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot().map(|t| t.nodes.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NodeStore for MemoryNodeStore {
    fn list_by_ids(&self, ids: &[u64]) -> Result<Vec<Node>, StoreError> {
        let table = self.snapshot()?;
        Ok(ids.iter().filter_map(|id| table.get(*id).cloned()).collect())
    }

    fn list_by_group(&self, group: &str) -> Result<Vec<Node>, StoreError> {
        let table = self.snapshot()?;
        Ok(table
            .nodes
            .iter()
            .filter(|n| n.group == group)
            .cloned()
            .collect())
    }
}

/// Read-through view over a persisted store.
///
/// Consistency contract: a read returns the latest value written through
/// this view, or the persisted value on a miss.
pub struct ReadThroughNodeStore<P: NodeStore> {
    persisted: P,
    overlay: MemoryNodeStore,
}

impl<P: NodeStore> ReadThroughNodeStore<P> {
    pub fn new(persisted: P) -> Self {
        Self {
            persisted,
            overlay: MemoryNodeStore::new(),
        }
    }

    /// Record a value that takes precedence over the persisted one
    pub fn write_through(&self, node: Node) {
        self.overlay.upsert(node);
    }

    /// Drop the overlay entry so reads fall back to the persisted value
    pub fn invalidate(&self, id: u64) {
        self.overlay.remove(id);
    }
}

impl<P: NodeStore> NodeStore for ReadThroughNodeStore<P> {
    fn list_by_ids(&self, ids: &[u64]) -> Result<Vec<Node>, StoreError> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match self.overlay.get(*id) {
                Some(node) => out.push(node),
                None => out.extend(self.persisted.list_by_ids(&[*id])?),
            }
        }
        Ok(out)
    }

    fn list_by_group(&self, group: &str) -> Result<Vec<Node>, StoreError> {
        let mut out = Vec::new();
        for node in self.persisted.list_by_group(group)? {
            match self.overlay.get(node.id) {
                Some(fresh) if fresh.group == group => out.push(fresh),
                // Moved to another group by a newer write
                Some(_) => {}
                None => out.push(node),
            }
        }
        // Nodes written into this group that the persisted side does not know yet
        for node in self.overlay.list_by_group(group)? {
            if !out.iter().any(|n| n.id == node.id) {
                out.push(node);
            }
        }
        Ok(out)
    }
}
