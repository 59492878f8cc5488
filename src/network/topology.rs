use log::debug;
use std::collections::{BTreeMap, BTreeSet};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;

use crate::error::EmulatorError;
use crate::types::{AdjacencyMap, NodeAddress};

/// Static topology plus the current belief about which nodes are reachable.
#[derive(Debug, Clone)]
pub struct TopologyStore {
    original: AdjacencyMap,
    liveness: BTreeMap<NodeAddress, bool>,
}

impl TopologyStore {
    /// Every node mentioned anywhere in `original` gets a key and starts out alive.
    pub fn new(mut original: AdjacencyMap) -> Self {
        let mentioned: Vec<NodeAddress> = original.values().flatten().copied().collect();
        for node in mentioned {
            original.entry(node).or_default();
        }

        let liveness = original.keys().map(|node| (*node, true)).collect();
        Self { original, liveness }
    }

    pub fn original(&self) -> &AdjacencyMap {
        &self.original
    }

    pub fn liveness(&self) -> &BTreeMap<NodeAddress, bool> {
        &self.liveness
    }

    pub fn contains(&self, node: &NodeAddress) -> bool {
        self.original.contains_key(node)
    }

    /// Statically configured neighbors of `node`, empty if the node is unknown.
    pub fn original_neighbors(&self, node: &NodeAddress) -> impl Iterator<Item = NodeAddress> + '_ {
        self.original.get(node).into_iter().flatten().copied()
    }

    pub fn is_alive(&self, node: &NodeAddress) -> bool {
        self.liveness.get(node).copied().unwrap_or(false)
    }

    /// Returns true if the flag actually flipped. Unknown nodes are ignored.
    pub fn set_alive(&mut self, node: &NodeAddress, alive: bool) -> bool {
        match self.liveness.get_mut(node) {
            Some(flag) if *flag != alive => {
                *flag = alive;
                debug!("Liveness of {} set to {}", node, alive);
                true
            }
            _ => false,
        }
    }

    /// Static neighbors of `node` currently believed reachable.
    pub fn live_neighbors(&self, node: &NodeAddress) -> Vec<NodeAddress> {
        self.original_neighbors(node)
            .filter(|n| self.is_alive(n))
            .collect()
    }

    pub fn effective(&self) -> AdjacencyMap {
        derive_effective(&self.original, &self.liveness)
    }
}

/// The static graph with every dead node and every edge touching one removed.
pub fn derive_effective(
    original: &AdjacencyMap,
    liveness: &BTreeMap<NodeAddress, bool>,
) -> AdjacencyMap {
    let alive = |node: &NodeAddress| liveness.get(node).copied().unwrap_or(false);

    original
        .iter()
        .filter(|&(node, _)| alive(node))
        .map(|(node, neighbors)| {
            let live: BTreeSet<NodeAddress> =
                neighbors.iter().filter(|&n| alive(n)).copied().collect();
            (*node, live)
        })
        .collect()
}

/// Parses a topology description: one line per node, `host,port` followed by the
/// `host,port` tokens of its neighbors. Blank lines and `#` comments are skipped.
pub fn parse_topology<F>(text: &str, mut resolve: F) -> Result<AdjacencyMap, EmulatorError>
where
    F: FnMut(&str, u16) -> Result<NodeAddress, EmulatorError>,
{
    let mut topology = AdjacencyMap::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut tokens = line.split_whitespace();
        let Some(first) = tokens.next() else {
            continue;
        };

        let node = parse_token(first, line_no + 1, &mut resolve)?;
        let neighbors = topology.entry(node).or_default();
        for token in tokens {
            let neighbor = parse_token(token, line_no + 1, &mut resolve)?;
            if neighbor != node {
                neighbors.insert(neighbor);
            }
        }
    }

    if topology.is_empty() {
        return Err(EmulatorError::Topology("topology description is empty".to_string()));
    }

    Ok(topology)
}

fn parse_token<F>(token: &str, line_no: usize, resolve: &mut F) -> Result<NodeAddress, EmulatorError>
where
    F: FnMut(&str, u16) -> Result<NodeAddress, EmulatorError>,
{
    let (host, port) = token.rsplit_once(',').ok_or_else(|| {
        EmulatorError::Topology(format!("line {}: expected host,port but got {:?}", line_no, token))
    })?;
    let port: u16 = port.parse().map_err(|_| {
        EmulatorError::Topology(format!("line {}: invalid port in {:?}", line_no, token))
    })?;

    resolve(host, port)
}

/// Resolves `host` to its first IPv4 address.
pub fn resolve_host(host: &str, port: u16) -> Result<NodeAddress, EmulatorError> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|_| EmulatorError::Resolve(host.to_string()))?;

    addrs
        .filter_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(NodeAddress::from(v4)),
            SocketAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| EmulatorError::Resolve(host.to_string()))
}

pub fn load_topology<P: AsRef<Path>>(path: P) -> Result<AdjacencyMap, EmulatorError> {
    let content = std::fs::read_to_string(path)?;
    parse_topology(&content, resolve_host)
}

/// Finds the local node: the resolved `host` when given, otherwise the only
/// topology node listening on `port`.
pub fn locate_local(
    topology: &AdjacencyMap,
    host: Option<&str>,
    port: u16,
) -> Result<NodeAddress, EmulatorError> {
    if let Some(host) = host {
        return resolve_host(host, port);
    }

    let mut candidates = topology.keys().filter(|node| node.port() == port);
    match (candidates.next(), candidates.next()) {
        (Some(node), None) => Ok(*node),
        (None, _) => Err(EmulatorError::Topology(format!(
            "no node listens on port {}",
            port
        ))),
        (Some(_), Some(_)) => Err(EmulatorError::Topology(format!(
            "several nodes listen on port {}, pass the host explicitly",
            port
        ))),
    }
}
