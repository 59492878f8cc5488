use log::{info, warn};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::network::TopologyStore;
use crate::types::NodeAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    pub address: NodeAddress,
    pub last_hello: Option<Instant>,
    /// A Hello or Ack must arrive before this instant for the neighbor to stay alive.
    pub deadline: Instant,
}

/// Hello-driven liveness of the direct neighbors.
///
/// The alive/dead flag itself lives in the [`TopologyStore`]; this only tracks
/// refresh deadlines and decides when the flag flips.
#[derive(Debug)]
pub struct NeighborManager {
    neighbors: BTreeMap<NodeAddress, Neighbor>,
    hold_down: Duration,
}

impl NeighborManager {
    pub fn new<I>(neighbors: I, hold_down: Duration, now: Instant) -> Self
    where
        I: IntoIterator<Item = NodeAddress>,
    {
        let neighbors = neighbors
            .into_iter()
            .map(|address| {
                let neighbor = Neighbor {
                    address,
                    last_hello: None,
                    deadline: now + hold_down,
                };
                (address, neighbor)
            })
            .collect();

        Self {
            neighbors,
            hold_down,
        }
    }

    pub fn is_neighbor(&self, address: &NodeAddress) -> bool {
        self.neighbors.contains_key(address)
    }

    pub fn get_neighbor(&self, address: &NodeAddress) -> Option<&Neighbor> {
        self.neighbors.get(address)
    }

    pub fn addresses(&self) -> impl Iterator<Item = NodeAddress> + '_ {
        self.neighbors.keys().copied()
    }

    /// Refreshes `from` after a Hello or Ack. Returns true if it came back to life.
    pub fn record_hello(
        &mut self,
        from: &NodeAddress,
        now: Instant,
        topology: &mut TopologyStore,
    ) -> bool {
        let Some(neighbor) = self.neighbors.get_mut(from) else {
            return false;
        };

        neighbor.last_hello = Some(now);
        neighbor.deadline = now + self.hold_down;

        let revived = topology.set_alive(from, true);
        if revived {
            info!("Neighbor {} is now ALIVE", from);
        }
        revived
    }

    /// Marks dead every alive neighbor whose deadline has passed and pushes its
    /// deadline one hold-down forward. Returns the neighbors that went down.
    pub fn check_dead_neighbors(
        &mut self,
        now: Instant,
        topology: &mut TopologyStore,
    ) -> Vec<NodeAddress> {
        let mut dead_neighbors = Vec::new();

        for (address, neighbor) in &mut self.neighbors {
            if !topology.is_alive(address) || now <= neighbor.deadline {
                continue;
            }

            neighbor.deadline = now + self.hold_down;
            if topology.set_alive(address, false) {
                warn!("Neighbor {} is DEAD (no hello since {:?})", address, neighbor.last_hello.map(|t| now - t));
                dead_neighbors.push(*address);
            }
        }

        dead_neighbors
    }

    /// Earliest deadline among neighbors currently believed alive.
    pub fn next_deadline(&self, topology: &TopologyStore) -> Option<Instant> {
        self.neighbors
            .values()
            .filter(|neighbor| topology.is_alive(&neighbor.address))
            .map(|neighbor| neighbor.deadline)
            .min()
    }
}
