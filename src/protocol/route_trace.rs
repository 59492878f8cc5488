use log::debug;

use super::Outbound;
use super::packet::Packet;
use super::routing_table::ForwardingTable;
use crate::error::ProtocolError;
use crate::types::NodeAddress;

/// Answers a probe whose hop budget ran out here, or passes it one hop closer to
/// its destination.
pub fn handle_route_trace(
    packet: &Packet,
    local: NodeAddress,
    table: &ForwardingTable,
) -> Result<Outbound, ProtocolError> {
    if packet.ttl == 0 {
        debug!("Route trace from {} expired here, replying", packet.origin);
        return Ok(Outbound {
            to: packet.origin,
            packet: Packet::route_trace(local, packet.sequence, 0, packet.origin),
        });
    }

    let next_hop = table
        .next_hop(&packet.destination)
        .ok_or(ProtocolError::NoRoute(packet.destination))?;

    let mut forwarded = packet.clone();
    forwarded.ttl -= 1;
    debug!(
        "Forwarding route trace for {} via {} (ttl {})",
        packet.destination, next_hop, forwarded.ttl
    );

    Ok(Outbound {
        to: next_hop,
        packet: forwarded,
    })
}
