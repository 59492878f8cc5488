pub mod topology;

pub use topology::{TopologyStore, derive_effective, load_topology, locate_local, parse_topology, resolve_host};
