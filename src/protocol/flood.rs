//! Sequence-numbered, TTL-bounded flooding of link-state packets.

use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};

use super::Outbound;
use super::packet::{Packet, PacketType};
use crate::error::ProtocolError;
use crate::network::TopologyStore;
use crate::types::NodeAddress;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FloodOutcome {
    /// Stale, duplicate, or our own advertisement coming back.
    Dropped,
    Accepted {
        topology_changed: bool,
        forwards: Vec<Outbound>,
    },
}

#[derive(Debug)]
pub struct FloodController {
    local: NodeAddress,
    ttl: u32,
    local_sequence: u32,
    sequences: BTreeMap<NodeAddress, u32>,
}

impl FloodController {
    pub fn new(local: NodeAddress, ttl: u32) -> Self {
        Self {
            local,
            ttl,
            local_sequence: 0,
            sequences: BTreeMap::new(),
        }
    }

    /// Latest accepted sequence number from `origin`, `None` if nothing is held.
    pub fn last_sequence(&self, origin: &NodeAddress) -> Option<u32> {
        self.sequences.get(origin).copied()
    }

    pub fn sequences(&self) -> &BTreeMap<NodeAddress, u32> {
        &self.sequences
    }

    pub fn local_sequence(&self) -> u32 {
        self.local_sequence
    }

    /// Builds a fresh advertisement of our live neighbors for every static neighbor.
    pub fn originate(&mut self, topology: &TopologyStore) -> Vec<Outbound> {
        self.local_sequence = self.local_sequence.saturating_add(1);
        self.sequences.insert(self.local, self.local_sequence);

        let live = topology.live_neighbors(&self.local);
        debug!(
            "Originating LSP seq {} from {} with {} live neighbors",
            self.local_sequence,
            self.local,
            live.len()
        );

        topology
            .original_neighbors(&self.local)
            .map(|to| Outbound {
                to,
                packet: Packet::link_state(self.local, self.local_sequence, self.ttl, to, live.clone()),
            })
            .collect()
    }

    /// Accept/forward/drop decision for a link-state packet received from `from`.
    pub fn receive(
        &mut self,
        packet: &Packet,
        from: NodeAddress,
        topology: &mut TopologyStore,
    ) -> Result<FloodOutcome, ProtocolError> {
        debug_assert_eq!(packet.packet_type, PacketType::LinkState);
        let origin = packet.origin;

        if origin == self.local {
            return Ok(FloodOutcome::Dropped);
        }
        if !topology.contains(&origin) {
            return Err(ProtocolError::UnknownOriginInFlood(origin));
        }

        if let Some(last) = self.last_sequence(&origin) {
            if packet.sequence <= last {
                debug!(
                    "Dropping LSP from {} seq {} (have {})",
                    origin, packet.sequence, last
                );
                return Ok(FloodOutcome::Dropped);
            }
        }
        self.sequences.insert(origin, packet.sequence);

        let topology_changed = self.apply_advertisement(origin, packet.neighbors(), topology);

        let forwards = if packet.ttl > 0 {
            topology
                .original_neighbors(&self.local)
                .filter(|to| *to != from)
                .map(|to| {
                    let mut forwarded = packet.clone();
                    forwarded.ttl = packet.ttl - 1;
                    Outbound { to, packet: forwarded }
                })
                .collect()
        } else {
            self.sequences.remove(&origin);
            Vec::new()
        };

        Ok(FloodOutcome::Accepted {
            topology_changed,
            forwards,
        })
    }

    /// Reconciles liveness with what `origin` says about its neighbors.
    fn apply_advertisement(
        &self,
        origin: NodeAddress,
        advertised: &[NodeAddress],
        topology: &mut TopologyStore,
    ) -> bool {
        let advertised: BTreeSet<NodeAddress> = advertised.iter().copied().collect();
        let mut changed = false;

        let missing: Vec<NodeAddress> = topology
            .original_neighbors(&origin)
            .filter(|n| !advertised.contains(n) && *n != self.local)
            .collect();
        for node in missing {
            if topology.set_alive(&node, false) {
                info!("{} reports {} as unreachable", origin, node);
                changed = true;
            }
        }

        for node in advertised.iter().filter(|n| **n != self.local) {
            if topology.contains(node) && !topology.is_alive(node) {
                topology.set_alive(node, true);
                info!("{} reports {} as reachable", origin, node);
                changed = true;
            }
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AdjacencyMap;

    fn addr(s: &str) -> NodeAddress {
        s.parse().unwrap()
    }

    // a - b - c, b - d, c - d; local node is b.
    fn setup() -> (FloodController, TopologyStore) {
        let (a, b, c, d) = (addr("1.0.0.1:1"), addr("1.0.0.2:2"), addr("1.0.0.3:3"), addr("1.0.0.4:4"));
        let topology = TopologyStore::new(AdjacencyMap::from([
            (a, BTreeSet::from([b])),
            (b, BTreeSet::from([a, c, d])),
            (c, BTreeSet::from([b, d])),
            (d, BTreeSet::from([b, c])),
        ]));
        (FloodController::new(b, 8), topology)
    }

    fn lsp(origin: &str, seq: u32, ttl: u32, neighbors: &[&str]) -> Packet {
        Packet::link_state(
            addr(origin),
            seq,
            ttl,
            addr("1.0.0.2:2"),
            neighbors.iter().map(|n| addr(n)).collect(),
        )
    }

    fn forwards(outcome: FloodOutcome) -> Vec<Outbound> {
        match outcome {
            FloodOutcome::Accepted { forwards, .. } => forwards,
            FloodOutcome::Dropped => panic!("expected the packet to be accepted"),
        }
    }

    #[test]
    fn originate_uses_fresh_sequence_numbers() {
        let (mut flood, topology) = setup();

        let first = flood.originate(&topology);
        let second = flood.originate(&topology);

        assert_eq!(first.len(), 3);
        assert!(first.iter().all(|o| o.packet.sequence == 1 && o.packet.ttl == 8));
        assert!(second.iter().all(|o| o.packet.sequence == 2));
        assert_eq!(flood.last_sequence(&addr("1.0.0.2:2")), Some(2));
        assert_eq!(
            first[0].packet.neighbors(),
            &[addr("1.0.0.1:1"), addr("1.0.0.3:3"), addr("1.0.0.4:4")]
        );
    }

    #[test]
    fn origination_advertises_only_live_neighbors() {
        let (mut flood, mut topology) = setup();
        topology.set_alive(&addr("1.0.0.1:1"), false);

        let out = flood.originate(&topology);
        // Still sent over the static adjacency.
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].packet.neighbors(), &[addr("1.0.0.3:3"), addr("1.0.0.4:4")]);
    }

    #[test]
    fn freshness_is_monotonic_per_origin() {
        let (mut flood, mut topology) = setup();
        let from = addr("1.0.0.3:3");

        let packet = lsp("1.0.0.3:3", 5, 3, &["1.0.0.2:2", "1.0.0.4:4"]);
        assert!(matches!(flood.receive(&packet, from, &mut topology), Ok(FloodOutcome::Accepted { .. })));

        for seq in [0, 4, 5] {
            let stale = lsp("1.0.0.3:3", seq, 3, &["1.0.0.2:2", "1.0.0.4:4"]);
            assert_eq!(flood.receive(&stale, from, &mut topology), Ok(FloodOutcome::Dropped));
        }

        let newer = lsp("1.0.0.3:3", 6, 3, &["1.0.0.2:2", "1.0.0.4:4"]);
        assert!(matches!(flood.receive(&newer, from, &mut topology), Ok(FloodOutcome::Accepted { .. })));
        assert_eq!(flood.last_sequence(&addr("1.0.0.3:3")), Some(6));

        // Other origins are tracked independently.
        let other = lsp("1.0.0.4:4", 1, 3, &["1.0.0.2:2", "1.0.0.3:3"]);
        assert!(matches!(flood.receive(&other, from, &mut topology), Ok(FloodOutcome::Accepted { .. })));
    }

    #[test]
    fn never_forwards_back_to_the_sender() {
        let (mut flood, mut topology) = setup();
        let local_neighbors = ["1.0.0.1:1", "1.0.0.3:3", "1.0.0.4:4"];

        for (seq, sender) in local_neighbors.iter().enumerate() {
            for ttl in [1, 2, 10] {
                let packet = lsp("1.0.0.4:4", (seq * 10) as u32 + ttl, ttl, &["1.0.0.2:2", "1.0.0.3:3"]);
                let out = forwards(flood.receive(&packet, addr(sender), &mut topology).unwrap());

                assert_eq!(out.len(), 2);
                assert!(out.iter().all(|o| o.to != addr(sender)));
                assert!(out.iter().all(|o| o.packet.ttl == ttl - 1));
                assert!(out.iter().all(|o| o.packet.origin == addr("1.0.0.4:4")));
            }
        }
    }

    #[test]
    fn zero_ttl_is_applied_but_not_forwarded_and_clears_sequence() {
        let (mut flood, mut topology) = setup();
        let from = addr("1.0.0.3:3");

        let packet = lsp("1.0.0.3:3", 9, 0, &["1.0.0.2:2"]);
        match flood.receive(&packet, from, &mut topology).unwrap() {
            FloodOutcome::Accepted {
                topology_changed,
                forwards,
            } => {
                assert!(topology_changed);
                assert!(forwards.is_empty());
            }
            FloodOutcome::Dropped => panic!("fresh packet dropped"),
        }
        assert!(!topology.is_alive(&addr("1.0.0.4:4")));
        assert_eq!(flood.last_sequence(&addr("1.0.0.3:3")), None);

        // A lower sequence from the same origin is accepted again.
        let restarted = lsp("1.0.0.3:3", 1, 2, &["1.0.0.2:2", "1.0.0.4:4"]);
        assert!(matches!(flood.receive(&restarted, from, &mut topology), Ok(FloodOutcome::Accepted { .. })));
        assert!(topology.is_alive(&addr("1.0.0.4:4")));
    }

    #[test]
    fn advertisement_updates_liveness_but_never_kills_local_node() {
        let (mut flood, mut topology) = setup();

        // d no longer lists b or c.
        let packet = lsp("1.0.0.4:4", 1, 0, &[]);
        let outcome = flood.receive(&packet, addr("1.0.0.4:4"), &mut topology).unwrap();
        assert!(matches!(outcome, FloodOutcome::Accepted { topology_changed: true, .. }));
        assert!(topology.is_alive(&addr("1.0.0.2:2")));
        assert!(!topology.is_alive(&addr("1.0.0.3:3")));

        // Unchanged view: nothing to recompute.
        let packet = lsp("1.0.0.4:4", 2, 0, &[]);
        let outcome = flood.receive(&packet, addr("1.0.0.4:4"), &mut topology).unwrap();
        assert!(matches!(outcome, FloodOutcome::Accepted { topology_changed: false, .. }));
    }

    #[test]
    fn unknown_and_own_origins() {
        let (mut flood, mut topology) = setup();
        let stranger = lsp("9.9.9.9:9", 1, 3, &[]);
        assert_eq!(
            flood.receive(&stranger, addr("1.0.0.1:1"), &mut topology),
            Err(ProtocolError::UnknownOriginInFlood(addr("9.9.9.9:9")))
        );

        let own = lsp("1.0.0.2:2", 100, 3, &[]);
        assert_eq!(flood.receive(&own, addr("1.0.0.1:1"), &mut topology), Ok(FloodOutcome::Dropped));
    }
}
