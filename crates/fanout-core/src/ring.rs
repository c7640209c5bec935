// crates/fanout-core/src/ring.rs
//
// Consistent-hash ring with virtual nodes.
//
// Each physical node contributes `virtual_nodes` positions on a 32-bit ring,
// derived by hashing "{node_id}-v{i}" with FNV-1a. A key is owned by the first
// ring entry whose hash is >= the key's hash, wrapping to the first entry.
// Membership changes rebuild the ring in full and then re-run the lookup for
// every tracked key, reporting which keys changed owner.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{FanoutError, Result};
use crate::hash::fnv1a_32;

/// Virtual nodes per physical node when none is configured.
pub const DEFAULT_VIRTUAL_NODES: u32 = 10;

/// One virtual-node position on the ring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingEntry {
    pub hash: u32,
    pub node_id: String,
    pub virtual_index: u32,
}

/// A key tracked by the ring, with its current owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAssignment {
    pub id: String,
    pub hash: u32,
    /// `None` only while the ring has no nodes.
    pub assigned_node_id: Option<String>,
}

/// A key whose owner changed during a rebalance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMove {
    pub key: String,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Outcome of a membership change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceReport {
    pub moved: Vec<KeyMove>,
    /// Number of tracked keys at the time of the rebalance.
    pub total_keys: usize,
}

impl RebalanceReport {
    pub fn moved_count(&self) -> usize {
        self.moved.len()
    }

    /// Fraction of tracked keys that changed owner, in `[0, 1]`.
    pub fn moved_fraction(&self) -> f64 {
        if self.total_keys == 0 {
            return 0.0;
        }
        self.moved.len() as f64 / self.total_keys as f64
    }
}

/// Ring-management commands, one per operation of the ring interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RingCommand {
    AddNode(String),
    RemoveNode(String),
    AssignKey(String),
    SetVirtualNodes(u32),
}

/// Reply to a [`RingCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RingReply {
    Rebalanced(RebalanceReport),
    Assigned(Option<String>),
}

/// A consistent-hash ring over string node ids.
#[derive(Debug, Clone)]
pub struct HashRing {
    virtual_nodes: u32,
    /// Physical nodes in insertion order.
    nodes: Vec<String>,
    /// Sorted by `hash`.
    entries: Vec<RingEntry>,
    keys: BTreeMap<String, KeyAssignment>,
}

impl HashRing {
    /// Create an empty ring with `virtual_nodes` positions per node.
    ///
    /// # Errors
    /// Returns `FanoutError::InvalidConfig` if `virtual_nodes` is 0.
    pub fn new(virtual_nodes: u32) -> Result<Self> {
        if virtual_nodes == 0 {
            return Err(FanoutError::InvalidConfig(
                "virtual node count must be > 0".to_string(),
            ));
        }
        Ok(Self {
            virtual_nodes,
            nodes: Vec::new(),
            entries: Vec::new(),
            keys: BTreeMap::new(),
        })
    }

    /// Create a ring pre-populated with `nodes`. Duplicates are ignored.
    pub fn with_nodes<I, S>(virtual_nodes: u32, nodes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ring = Self::new(virtual_nodes)?;
        for node in nodes {
            let node = node.into();
            if !ring.nodes.contains(&node) {
                ring.nodes.push(node);
            }
        }
        ring.rebuild();
        Ok(ring)
    }

    /// Identifier hashed for the `index`-th virtual node of `node_id`.
    pub fn virtual_node_id(node_id: &str, index: u32) -> String {
        format!("{}-v{}", node_id, index)
    }

    /// Add a node, ignoring the call if the node is already present.
    pub fn add_node(&mut self, node_id: &str) -> RebalanceReport {
        match self.try_add_node(node_id) {
            Ok(report) => report,
            Err(_) => {
                tracing::debug!("Ignoring duplicate ring node {}", node_id);
                RebalanceReport {
                    moved: Vec::new(),
                    total_keys: self.keys.len(),
                }
            }
        }
    }

    /// Add a node, rebuild the ring, and reassign every tracked key.
    ///
    /// # Errors
    /// Returns `FanoutError::DuplicateNode` if the node is already present.
    pub fn try_add_node(&mut self, node_id: &str) -> Result<RebalanceReport> {
        if self.contains_node(node_id) {
            return Err(FanoutError::DuplicateNode(node_id.to_string()));
        }
        self.nodes.push(node_id.to_string());
        self.rebuild();
        Ok(self.rebalance())
    }

    /// Remove a node, ignoring the call if the node is absent.
    pub fn remove_node(&mut self, node_id: &str) -> RebalanceReport {
        match self.try_remove_node(node_id) {
            Ok(report) => report,
            Err(_) => {
                tracing::debug!("Ignoring removal of unknown ring node {}", node_id);
                RebalanceReport {
                    moved: Vec::new(),
                    total_keys: self.keys.len(),
                }
            }
        }
    }

    /// Remove a node, rebuild the ring, and reassign every tracked key.
    ///
    /// # Errors
    /// Returns `FanoutError::UnknownNode` if the node is not present.
    pub fn try_remove_node(&mut self, node_id: &str) -> Result<RebalanceReport> {
        let before = self.nodes.len();
        self.nodes.retain(|n| n != node_id);
        if self.nodes.len() == before {
            return Err(FanoutError::UnknownNode(node_id.to_string()));
        }
        self.rebuild();
        Ok(self.rebalance())
    }

    /// Change the number of virtual nodes per physical node.
    ///
    /// Triggers a full rebuild and key reassignment.
    pub fn set_virtual_node_count(&mut self, virtual_nodes: u32) -> Result<RebalanceReport> {
        if virtual_nodes == 0 {
            return Err(FanoutError::InvalidConfig(
                "virtual node count must be > 0".to_string(),
            ));
        }
        self.virtual_nodes = virtual_nodes;
        self.rebuild();
        Ok(self.rebalance())
    }

    /// Assign a key to its owner and start tracking it for rebalances.
    ///
    /// Returns `None` when the ring has no nodes.
    pub fn assign_key(&mut self, key_id: &str) -> Option<String> {
        let hash = fnv1a_32(key_id);
        let owner = self.lookup(hash).map(str::to_string);
        self.keys.insert(
            key_id.to_string(),
            KeyAssignment {
                id: key_id.to_string(),
                hash,
                assigned_node_id: owner.clone(),
            },
        );
        owner
    }

    /// Owner of `key_id` without tracking the key.
    pub fn node_for(&self, key_id: &str) -> Option<&str> {
        self.lookup(fnv1a_32(key_id))
    }

    /// Owner of the ring position `hash`: the first entry with
    /// `entry.hash >= hash`, wrapping to the first entry.
    pub fn lookup(&self, hash: u32) -> Option<&str> {
        let idx = self.entries.partition_point(|e| e.hash < hash);
        self.entries
            .get(idx)
            .or_else(|| self.entries.first())
            .map(|e| e.node_id.as_str())
    }

    /// Execute a ring command.
    pub fn apply(&mut self, command: RingCommand) -> Result<RingReply> {
        match command {
            RingCommand::AddNode(node_id) => Ok(RingReply::Rebalanced(self.add_node(&node_id))),
            RingCommand::RemoveNode(node_id) => {
                Ok(RingReply::Rebalanced(self.remove_node(&node_id)))
            }
            RingCommand::AssignKey(key_id) => Ok(RingReply::Assigned(self.assign_key(&key_id))),
            RingCommand::SetVirtualNodes(v) => {
                Ok(RingReply::Rebalanced(self.set_virtual_node_count(v)?))
            }
        }
    }

    pub fn contains_node(&self, node_id: &str) -> bool {
        self.nodes.iter().any(|n| n == node_id)
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn entries(&self) -> &[RingEntry] {
        &self.entries
    }

    pub fn virtual_nodes(&self) -> u32 {
        self.virtual_nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Tracked keys, ordered by key id.
    pub fn keys(&self) -> impl Iterator<Item = &KeyAssignment> {
        self.keys.values()
    }

    pub fn key(&self, key_id: &str) -> Option<&KeyAssignment> {
        self.keys.get(key_id)
    }

    /// Number of tracked keys owned by each node (nodes with no keys included).
    pub fn distribution(&self) -> BTreeMap<String, usize> {
        let mut counts: BTreeMap<String, usize> =
            self.nodes.iter().map(|n| (n.clone(), 0)).collect();
        for key in self.keys.values() {
            if let Some(owner) = &key.assigned_node_id {
                *counts.entry(owner.clone()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Fraction of the 32-bit hash space owned by each node.
    ///
    /// Entry `i` owns the arc `(entries[i-1].hash, entries[i].hash]`; the first
    /// entry also owns the wrap-around arc past the last entry.
    pub fn ownership(&self) -> BTreeMap<String, f64> {
        const SPACE: u64 = 1 << 32;
        let mut spans: BTreeMap<String, u64> =
            self.nodes.iter().map(|n| (n.clone(), 0)).collect();
        let n = self.entries.len();
        for (i, entry) in self.entries.iter().enumerate() {
            let current = entry.hash as u64;
            let span = if i == 0 {
                let last = self.entries[n - 1].hash as u64;
                SPACE - last + current
            } else {
                current - self.entries[i - 1].hash as u64
            };
            *spans.entry(entry.node_id.clone()).or_insert(0) += span;
        }
        spans
            .into_iter()
            .map(|(node, span)| (node, span as f64 / SPACE as f64))
            .collect()
    }

    /// Regenerate every virtual-node entry from the current node set.
    fn rebuild(&mut self) {
        self.entries.clear();
        for node_id in &self.nodes {
            for i in 0..self.virtual_nodes {
                self.entries.push(RingEntry {
                    hash: fnv1a_32(&Self::virtual_node_id(node_id, i)),
                    node_id: node_id.clone(),
                    virtual_index: i,
                });
            }
        }
        // Stable sort: equal hashes keep node insertion order.
        self.entries.sort_by_key(|e| e.hash);
        tracing::debug!(
            "Rebuilt hash ring: {} nodes, {} entries",
            self.nodes.len(),
            self.entries.len()
        );
    }

    /// Re-run the lookup for every tracked key and report owner changes.
    fn rebalance(&mut self) -> RebalanceReport {
        let mut moved = Vec::new();
        let total_keys = self.keys.len();
        let owners: Vec<(String, Option<String>)> = self
            .keys
            .values()
            .map(|k| (k.id.clone(), self.lookup(k.hash).map(str::to_string)))
            .collect();
        for (key_id, owner) in owners {
            if let Some(assignment) = self.keys.get_mut(&key_id) {
                if assignment.assigned_node_id != owner {
                    moved.push(KeyMove {
                        key: key_id.clone(),
                        from: assignment.assigned_node_id.clone(),
                        to: owner.clone(),
                    });
                    assignment.assigned_node_id = owner;
                }
            }
        }
        if !moved.is_empty() {
            tracing::debug!("Rebalance moved {}/{} keys", moved.len(), total_keys);
        }
        RebalanceReport { moved, total_keys }
    }
}

impl Default for HashRing {
    fn default() -> Self {
        Self {
            virtual_nodes: DEFAULT_VIRTUAL_NODES,
            nodes: Vec::new(),
            entries: Vec::new(),
            keys: BTreeMap::new(),
        }
    }
}
