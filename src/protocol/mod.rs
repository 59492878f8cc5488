pub mod flood;
pub mod neighbor_manager;
pub mod packet;
pub mod route_trace;
pub mod routing_table;

pub use flood::{FloodController, FloodOutcome};
pub use neighbor_manager::{Neighbor, NeighborManager};
pub use packet::{HEADER_LEN, Packet, PacketType, Payload};
pub use route_trace::handle_route_trace;
pub use routing_table::{ForwardingTable, RouteEntry};

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::algorithms::dijkstra::compute_forwarding_table;
use crate::config::EmulatorConfig;
use crate::error::{EmulatorError, ProtocolError};
use crate::network::TopologyStore;
use crate::types::{AdjacencyMap, NodeAddress};

/// Neighbor deadlines are strict ("now > deadline"), so wake just after them.
const DEADLINE_SLACK: Duration = Duration::from_millis(1);

/// A packet the engine wants sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub to: NodeAddress,
    pub packet: Packet,
}

/// Read-only view of the routing state, for status output.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub local: NodeAddress,
    pub local_sequence: u32,
    pub liveness: BTreeMap<NodeAddress, bool>,
    pub effective: AdjacencyMap,
    pub forwarding: BTreeMap<NodeAddress, NodeAddress>,
    pub sequences: BTreeMap<NodeAddress, u32>,
}

/// Routing state of one emulated node.
///
/// The engine never touches a socket or a clock: callers hand it datagrams and the
/// current instant, and send whatever [`Outbound`] packets it returns.
#[derive(Debug)]
pub struct ProtocolEngine {
    local: NodeAddress,
    config: EmulatorConfig,
    topology: TopologyStore,
    neighbor_manager: NeighborManager,
    flood: FloodController,
    routing_table: ForwardingTable,
    next_hello: Instant,
    next_lsp: Instant,
    generation: u64,
}

impl ProtocolEngine {
    pub fn new(
        local: NodeAddress,
        original: AdjacencyMap,
        config: EmulatorConfig,
        now: Instant,
    ) -> Result<Self, EmulatorError> {
        config.validate()?;

        let topology = TopologyStore::new(original);
        if !topology.contains(&local) {
            return Err(EmulatorError::UnknownLocalNode(local));
        }

        let direct: Vec<NodeAddress> = topology.original_neighbors(&local).collect();
        let neighbor_manager = NeighborManager::new(direct, config.hold_down(), now);
        let flood = FloodController::new(local, config.lsp_ttl);

        let mut engine = Self {
            local,
            config,
            topology,
            neighbor_manager,
            flood,
            routing_table: ForwardingTable::new(),
            next_hello: now,
            next_lsp: now,
            generation: 0,
        };
        engine.recompute_routes();

        Ok(engine)
    }

    pub fn local(&self) -> NodeAddress {
        self.local
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    pub fn topology(&self) -> &TopologyStore {
        &self.topology
    }

    pub fn neighbor_manager(&self) -> &NeighborManager {
        &self.neighbor_manager
    }

    pub fn flood(&self) -> &FloodController {
        &self.flood
    }

    pub fn routing_table(&self) -> &ForwardingTable {
        &self.routing_table
    }

    pub fn effective(&self) -> AdjacencyMap {
        self.topology.effective()
    }

    /// Bumped every time the forwarding table is rebuilt.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The instant by which [`ProtocolEngine::poll`] must next run.
    pub fn next_deadline(&self) -> Instant {
        let timers = self.next_hello.min(self.next_lsp);
        match self.neighbor_manager.next_deadline(&self.topology) {
            Some(deadline) => timers.min(deadline + DEADLINE_SLACK),
            None => timers,
        }
    }

    pub fn handle_datagram(
        &mut self,
        data: &[u8],
        from: NodeAddress,
        now: Instant,
    ) -> Result<Vec<Outbound>, ProtocolError> {
        let packet = Packet::decode(data)?;
        self.handle_packet(packet, from, now)
    }

    pub fn handle_packet(
        &mut self,
        packet: Packet,
        from: NodeAddress,
        now: Instant,
    ) -> Result<Vec<Outbound>, ProtocolError> {
        match packet.packet_type {
            PacketType::Hello | PacketType::HelloAck => Ok(self.handle_hello(&packet, now)),
            PacketType::LinkState => self.handle_link_state(&packet, from),
            PacketType::RouteTrace => {
                let out = handle_route_trace(&packet, self.local, &self.routing_table)?;
                Ok(vec![out])
            }
        }
    }

    /// Runs liveness checks and whichever periodic timers are due.
    pub fn poll(&mut self, now: Instant) -> Vec<Outbound> {
        let mut outbound = Vec::new();

        let dead = self
            .neighbor_manager
            .check_dead_neighbors(now, &mut self.topology);
        if !dead.is_empty() {
            outbound.extend(self.on_liveness_change());
        }

        if now >= self.next_hello {
            outbound.extend(self.hello_packets());
            self.next_hello = now + self.config.hello_interval();
        }

        if now >= self.next_lsp {
            outbound.extend(self.flood.originate(&self.topology));
            self.next_lsp = now + self.config.lsp_interval();
        }

        outbound
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            generated_at: Utc::now(),
            local: self.local,
            local_sequence: self.flood.local_sequence(),
            liveness: self.topology.liveness().clone(),
            effective: self.topology.effective(),
            forwarding: self.routing_table.next_hops(),
            sequences: self.flood.sequences().clone(),
        }
    }

    fn handle_hello(&mut self, packet: &Packet, now: Instant) -> Vec<Outbound> {
        let sender = packet.origin;
        if !self.neighbor_manager.is_neighbor(&sender) {
            debug!("Ignoring {:?} from non-neighbor {}", packet.packet_type, sender);
            return Vec::new();
        }

        let mut outbound = Vec::new();
        if packet.packet_type == PacketType::Hello {
            outbound.push(Outbound {
                to: sender,
                packet: Packet::hello_ack(self.local, sender),
            });
        }

        if self
            .neighbor_manager
            .record_hello(&sender, now, &mut self.topology)
        {
            outbound.extend(self.on_liveness_change());
        }

        outbound
    }

    fn handle_link_state(
        &mut self,
        packet: &Packet,
        from: NodeAddress,
    ) -> Result<Vec<Outbound>, ProtocolError> {
        match self.flood.receive(packet, from, &mut self.topology)? {
            FloodOutcome::Dropped => Ok(Vec::new()),
            FloodOutcome::Accepted {
                topology_changed,
                forwards,
            } => {
                if topology_changed {
                    self.recompute_routes();
                }
                Ok(forwards)
            }
        }
    }

    fn hello_packets(&self) -> Vec<Outbound> {
        self.neighbor_manager
            .addresses()
            .map(|to| Outbound {
                to,
                packet: Packet::hello(self.local, to),
            })
            .collect()
    }

    fn on_liveness_change(&mut self) -> Vec<Outbound> {
        self.recompute_routes();
        self.flood.originate(&self.topology)
    }

    fn recompute_routes(&mut self) {
        let effective = self.topology.effective();
        self.routing_table = compute_forwarding_table(&effective, &self.local);
        self.generation += 1;
        info!(
            "Forwarding table rebuilt: {} reachable destinations",
            self.routing_table.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn addr(s: &str) -> NodeAddress {
        s.parse().unwrap()
    }

    fn a() -> NodeAddress {
        addr("10.0.0.1:5001")
    }
    fn b() -> NodeAddress {
        addr("10.0.0.2:5002")
    }
    fn c() -> NodeAddress {
        addr("10.0.0.3:5003")
    }

    fn line() -> AdjacencyMap {
        AdjacencyMap::from([
            (a(), BTreeSet::from([b()])),
            (b(), BTreeSet::from([a(), c()])),
            (c(), BTreeSet::from([b()])),
        ])
    }

    fn config() -> EmulatorConfig {
        EmulatorConfig {
            hello_interval_ms: 100,
            hold_down_ms: 350,
            lsp_interval_ms: 1000,
            lsp_ttl: 4,
            ..Default::default()
        }
    }

    fn engine(now: Instant) -> ProtocolEngine {
        ProtocolEngine::new(b(), line(), config(), now).unwrap()
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn line_scenario_and_neighbor_failure() {
        let start = Instant::now();
        let mut engine = engine(start);

        assert_eq!(engine.effective(), line());
        assert_eq!(
            engine.routing_table().next_hops(),
            BTreeMap::from([(a(), a()), (c(), c())])
        );

        // c keeps saying hello, a goes silent.
        for t in [100, 200, 300] {
            engine
                .handle_packet(Packet::hello(c(), b()), c(), start + ms(t))
                .unwrap();
        }
        let seq_before = engine.flood().local_sequence();
        let out = engine.poll(start + ms(351));

        assert!(!engine.topology().is_alive(&a()));
        assert_eq!(
            engine.effective(),
            AdjacencyMap::from([(b(), BTreeSet::from([c()])), (c(), BTreeSet::from([b()]))])
        );
        assert_eq!(engine.routing_table().next_hops(), BTreeMap::from([(c(), c())]));

        let lsps: Vec<&Outbound> = out
            .iter()
            .filter(|o| o.packet.packet_type == PacketType::LinkState)
            .collect();
        assert!(!lsps.is_empty());
        assert!(lsps.iter().all(|o| o.packet.sequence > seq_before));
        assert!(lsps.iter().all(|o| o.packet.neighbors() == [c()]));
    }

    #[test]
    fn hello_is_acknowledged_and_revives() {
        let start = Instant::now();
        let mut engine = engine(start);

        engine.poll(start + ms(400));
        assert!(!engine.topology().is_alive(&a()));
        let generation = engine.generation();

        let out = engine
            .handle_packet(Packet::hello(a(), b()), a(), start + ms(450))
            .unwrap();
        assert!(engine.topology().is_alive(&a()));
        assert!(engine.generation() > generation);
        assert_eq!(out[0], Outbound { to: a(), packet: Packet::hello_ack(b(), a()) });
        assert!(out[1..].iter().all(|o| o.packet.packet_type == PacketType::LinkState));
        assert_eq!(engine.routing_table().next_hop(&a()), Some(a()));
    }

    #[test]
    fn ack_refreshes_without_reply() {
        let start = Instant::now();
        let mut engine = engine(start);

        let out = engine
            .handle_packet(Packet::hello_ack(a(), b()), a(), start + ms(300))
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(
            engine.neighbor_manager().get_neighbor(&a()).unwrap().deadline,
            start + ms(650)
        );
    }

    #[test]
    fn hello_from_non_neighbor_is_ignored() {
        let start = Instant::now();
        let mut engine = ProtocolEngine::new(a(), line(), config(), start).unwrap();
        let out = engine
            .handle_packet(Packet::hello(c(), a()), c(), start)
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn timers_fire_and_reset() {
        let start = Instant::now();
        let mut engine = engine(start);

        let out = engine.poll(start);
        let hellos = out.iter().filter(|o| o.packet.packet_type == PacketType::Hello).count();
        let lsps = out.iter().filter(|o| o.packet.packet_type == PacketType::LinkState).count();
        assert_eq!((hellos, lsps), (2, 2));

        assert_eq!(engine.next_deadline(), start + ms(100));
        assert!(engine.poll(start + ms(50)).is_empty());

        let out = engine.poll(start + ms(100));
        assert!(out.iter().all(|o| o.packet.packet_type == PacketType::Hello));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn next_deadline_includes_neighbor_refresh() {
        let start = Instant::now();
        let mut engine = ProtocolEngine::new(
            b(),
            line(),
            EmulatorConfig {
                hello_interval_ms: 1000,
                hold_down_ms: 1500,
                lsp_interval_ms: 5000,
                ..Default::default()
            },
            start,
        )
        .unwrap();

        engine.poll(start);
        engine.poll(start + ms(1000));
        assert_eq!(engine.next_deadline(), start + ms(1501));
    }

    #[test]
    fn route_trace_with_zero_ttl_gets_one_reply() {
        let start = Instant::now();
        let mut engine = engine(start);
        let tracer = addr("10.0.0.99:7000");

        let probe = Packet::route_trace(tracer, 0, 0, c());
        let out = engine.handle_datagram(&probe.encode(), tracer, start).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, tracer);
        assert_eq!(out[0].packet.origin, b());

        let probe = Packet::route_trace(tracer, 0, 1, c());
        let out = engine.handle_datagram(&probe.encode(), tracer, start).unwrap();
        assert_eq!(out, vec![Outbound { to: c(), packet: Packet::route_trace(tracer, 0, 0, c()) }]);
    }

    #[test]
    fn flooded_lsp_is_forwarded_and_never_kills_local_node() {
        let start = Instant::now();
        let mut engine = engine(start);
        let generation = engine.generation();

        // a no longer lists b.
        let lsp = Packet::link_state(a(), 1, 2, b(), vec![]);
        let out = engine.handle_packet(lsp, a(), start).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, c());
        assert_eq!(out[0].packet.ttl, 1);
        assert!(engine.topology().is_alive(&b()));
        assert_eq!(engine.generation(), generation);
    }

    #[test]
    fn flooded_change_recomputes_without_originating() {
        let start = Instant::now();
        let triangle = AdjacencyMap::from([
            (a(), BTreeSet::from([b(), c()])),
            (b(), BTreeSet::from([a(), c()])),
            (c(), BTreeSet::from([a(), b()])),
        ]);
        let mut engine = ProtocolEngine::new(b(), triangle, config(), start).unwrap();
        let seq = engine.flood().local_sequence();

        let lsp = Packet::link_state(a(), 7, 0, b(), vec![b()]);
        let out = engine.handle_packet(lsp, a(), start).unwrap();

        assert!(out.is_empty());
        assert!(!engine.topology().is_alive(&c()));
        assert_eq!(engine.routing_table().next_hops(), BTreeMap::from([(a(), a())]));
        assert_eq!(engine.flood().local_sequence(), seq);
        assert_eq!(engine.flood().last_sequence(&a()), None);
    }

    #[test]
    fn per_packet_errors_do_not_poison_the_engine() {
        let start = Instant::now();
        let mut engine = engine(start);
        let tracer = addr("10.0.0.99:7000");

        assert!(matches!(
            engine.handle_datagram(b"short", tracer, start),
            Err(ProtocolError::MalformedPacket(_))
        ));
        let probe = Packet::route_trace(tracer, 0, 3, addr("10.0.0.42:1"));
        assert_eq!(
            engine.handle_datagram(&probe.encode(), tracer, start),
            Err(ProtocolError::NoRoute(addr("10.0.0.42:1")))
        );

        assert_eq!(engine.routing_table().len(), 2);
        assert!(!engine.poll(start).is_empty());
    }

    #[test]
    fn rejects_unknown_local_node_and_bad_config() {
        let start = Instant::now();
        assert!(matches!(
            ProtocolEngine::new(addr("10.0.0.9:9"), line(), config(), start),
            Err(EmulatorError::UnknownLocalNode(_))
        ));

        let bad = EmulatorConfig {
            hold_down_ms: 10,
            ..config()
        };
        assert!(matches!(
            ProtocolEngine::new(b(), line(), bad, start),
            Err(EmulatorError::Config(_))
        ));
    }

    #[test]
    fn snapshot_serializes() {
        let engine = engine(Instant::now());
        let snapshot = engine.snapshot();
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["local"], "10.0.0.2:5002");
        assert_eq!(json["forwarding"]["10.0.0.1:5001"], "10.0.0.1:5001");
        assert_eq!(json["liveness"]["10.0.0.3:5003"], true);
    }
}
