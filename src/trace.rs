//! Client side of route tracing: probes with growing TTL, one hop revealed per reply.

use log::{debug, info};
use std::fmt::Write;
use std::time::Duration;
use tokio::net::UdpSocket;

use crate::error::TraceError;
use crate::protocol::{Packet, PacketType};
use crate::types::NodeAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hop {
    pub number: u32,
    pub address: NodeAddress,
}

#[derive(Debug, Clone)]
pub struct RouteTracer {
    /// Where replies come back to; must be the address `socket` is bound on.
    local: NodeAddress,
    /// First router the probes are handed to.
    source: NodeAddress,
    destination: NodeAddress,
    probe_timeout: Duration,
    max_hops: u32,
    debug: bool,
}

impl RouteTracer {
    pub fn new(local: NodeAddress, source: NodeAddress, destination: NodeAddress) -> Self {
        Self {
            local,
            source,
            destination,
            probe_timeout: Duration::from_secs(2),
            max_hops: 32,
            debug: false,
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_max_hops(mut self, max_hops: u32) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Probe with hop budget `ttl`. The sequence number carries the TTL so replies
    /// to an earlier, timed-out probe can be told apart.
    pub fn probe(&self, ttl: u32) -> Packet {
        Packet::route_trace(self.local, ttl, ttl, self.destination)
    }

    pub async fn trace(&self, socket: &UdpSocket) -> Result<Vec<Hop>, TraceError> {
        let mut hops = Vec::new();

        for ttl in 0..self.max_hops {
            let probe = self.probe(ttl);
            socket
                .send_to(&probe.encode(), self.source.socket_addr())
                .await?;
            if self.debug {
                info!(
                    "Sent probe: ttl={} src={} dst={}",
                    ttl, probe.origin, probe.destination
                );
            }

            let responder = self.await_reply(socket, ttl).await?;
            let hop = Hop {
                number: ttl + 1,
                address: responder,
            };
            hops.push(hop);

            if responder == self.destination {
                return Ok(hops);
            }
        }

        Err(TraceError::TooManyHops(self.max_hops))
    }

    async fn await_reply(&self, socket: &UdpSocket, ttl: u32) -> Result<NodeAddress, TraceError> {
        let deadline = tokio::time::Instant::now() + self.probe_timeout;
        let mut buf = [0u8; 1024];

        loop {
            let (len, peer) = tokio::time::timeout_at(deadline, socket.recv_from(&mut buf))
                .await
                .map_err(|_| TraceError::Timeout { ttl })??;

            match Packet::decode(&buf[..len]) {
                Ok(reply) if reply.packet_type == PacketType::RouteTrace && reply.sequence == ttl => {
                    if self.debug {
                        info!(
                            "Received reply: ttl={} src={} dst={}",
                            reply.ttl, reply.origin, reply.destination
                        );
                    }
                    return Ok(reply.origin);
                }
                Ok(other) => debug!(
                    "Ignoring {:?} (seq {}) from {}",
                    other.packet_type, other.sequence, peer
                ),
                Err(e) => debug!("Ignoring undecodable reply from {}: {}", peer, e),
            }
        }
    }
}

/// Hop table in the `Hop#  IP,Port` layout.
pub fn format_route(hops: &[Hop]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Hop#\t IP,Port");
    for hop in hops {
        let _ = writeln!(
            output,
            "{}\t {},{}",
            hop.number,
            hop.address.ip(),
            hop.address.port()
        );
    }
    output
}
