use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::NodeAddress;

/// Destination → next hop, rebuilt wholesale whenever the topology changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingTable {
    entries: BTreeMap<NodeAddress, RouteEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub destination: NodeAddress,
    pub next_hop: NodeAddress,
    /// Hop count along the shortest path.
    pub metric: u32,
}

impl ForwardingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_route(&mut self, entry: RouteEntry) {
        self.entries.insert(entry.destination, entry);
    }

    pub fn get_route(&self, destination: &NodeAddress) -> Option<&RouteEntry> {
        self.entries.get(destination)
    }

    pub fn next_hop(&self, destination: &NodeAddress) -> Option<NodeAddress> {
        self.entries.get(destination).map(|entry| entry.next_hop)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.values()
    }

    /// Plain destination → next-hop view.
    pub fn next_hops(&self) -> BTreeMap<NodeAddress, NodeAddress> {
        self.entries
            .values()
            .map(|entry| (entry.destination, entry.next_hop))
            .collect()
    }
}
