pub mod algorithms;
pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod router;
pub mod trace;
pub mod types;

pub use config::EmulatorConfig;
pub use error::{EmulatorError, ProtocolError, TraceError};
pub use protocol::ProtocolEngine;
pub use router::Router;
pub use types::{AdjacencyMap, NodeAddress};
