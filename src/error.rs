//! Error types for the emulator.

use thiserror::Error;

use crate::types::NodeAddress;

/// Per-packet failures. None of these are fatal to the event loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Datagram could not be decoded
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// Forwarding table has no entry for the route-trace destination
    #[error("no route to {0}")]
    NoRoute(NodeAddress),

    /// Link-state origin is not part of the static topology
    #[error("link-state from unknown origin {0}")]
    UnknownOriginInFlood(NodeAddress),
}

/// Setup failures, reported before the event loop starts.
#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("local node {0} is not part of the topology")]
    UnknownLocalNode(NodeAddress),

    #[error("invalid topology: {0}")]
    Topology(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("could not resolve host {0}")]
    Resolve(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Route-trace client failures.
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("no reply to probe with ttl {ttl}")]
    Timeout { ttl: u32 },

    #[error("destination not reached within {0} hops")]
    TooManyHops(u32),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
