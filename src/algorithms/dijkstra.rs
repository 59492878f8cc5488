use std::collections::BTreeSet;

use crate::protocol::routing_table::{ForwardingTable, RouteEntry};
use crate::types::{AdjacencyMap, NodeAddress};

/// Dense numbering of the nodes of an adjacency map plus its symmetric 0/1 matrix.
#[derive(Debug, Clone)]
pub struct AdjacencyMatrix {
    nodes: Vec<NodeAddress>,
    edges: Vec<Vec<bool>>,
}

impl AdjacencyMatrix {
    pub fn build(topology: &AdjacencyMap) -> Self {
        let nodes: Vec<NodeAddress> = topology
            .iter()
            .flat_map(|(node, neighbors)| std::iter::once(node).chain(neighbors))
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut edges = vec![vec![false; nodes.len()]; nodes.len()];
        for (node, neighbors) in topology {
            let Some(i) = index_of(&nodes, node) else {
                continue;
            };
            for neighbor in neighbors {
                if let Some(j) = index_of(&nodes, neighbor) {
                    if i != j {
                        edges[i][j] = true;
                        edges[j][i] = true;
                    }
                }
            }
        }

        Self { nodes, edges }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn index(&self, node: &NodeAddress) -> Option<usize> {
        index_of(&self.nodes, node)
    }

    pub fn node(&self, index: usize) -> NodeAddress {
        self.nodes[index]
    }

    pub fn connected(&self, i: usize, j: usize) -> bool {
        self.edges[i][j]
    }
}

fn index_of(nodes: &[NodeAddress], node: &NodeAddress) -> Option<usize> {
    nodes.binary_search(node).ok()
}

/// Result of a single-source run: hop distance and predecessor per node index.
#[derive(Debug, Clone)]
pub struct ShortestPaths {
    pub source: usize,
    pub distances: Vec<Option<u32>>,
    pub parents: Vec<Option<usize>>,
}

impl ShortestPaths {
    /// Node indices from the source to `dest`, both included. `None` if unreachable.
    pub fn path_to(&self, dest: usize) -> Option<Vec<usize>> {
        self.distances[dest]?;

        let mut path = vec![dest];
        let mut current = dest;
        while let Some(parent) = self.parents[current] {
            path.push(parent);
            current = parent;
        }
        path.reverse();

        (path.first() == Some(&self.source)).then_some(path)
    }
}

/// Dense O(V²) Dijkstra over an unweighted graph, every edge costing 1.
///
/// On equal distances the lowest index wins, which keeps the result stable for a
/// given topology.
pub fn shortest_paths(matrix: &AdjacencyMatrix, source: usize) -> ShortestPaths {
    let n = matrix.len();
    let mut distances: Vec<Option<u32>> = vec![None; n];
    let mut visited = vec![false; n];
    let mut parents: Vec<Option<usize>> = vec![None; n];
    distances[source] = Some(0);

    for _ in 0..n.saturating_sub(1) {
        let nearest = (0..n)
            .filter(|&i| !visited[i])
            .filter_map(|i| distances[i].map(|d| (d, i)))
            .min();

        let Some((dist, u)) = nearest else {
            break;
        };
        visited[u] = true;

        for v in 0..n {
            if !matrix.connected(u, v) {
                continue;
            }
            let candidate = dist + 1;
            if distances[v].is_none_or(|current| candidate < current) {
                distances[v] = Some(candidate);
                parents[v] = Some(u);
            }
        }
    }

    ShortestPaths {
        source,
        distances,
        parents,
    }
}

/// Shortest-path forwarding table of `local` over `effective`.
pub fn compute_forwarding_table(effective: &AdjacencyMap, local: &NodeAddress) -> ForwardingTable {
    let mut table = ForwardingTable::new();

    let matrix = AdjacencyMatrix::build(effective);
    let Some(source) = matrix.index(local) else {
        return table;
    };

    let paths = shortest_paths(&matrix, source);
    for dest in (0..matrix.len()).filter(|&d| d != source) {
        let Some(path) = paths.path_to(dest) else {
            continue;
        };
        if let (Some(&hop), Some(metric)) = (path.get(1), paths.distances[dest]) {
            table.add_route(RouteEntry {
                destination: matrix.node(dest),
                next_hop: matrix.node(hop),
                metric,
            });
        }
    }

    table
}
