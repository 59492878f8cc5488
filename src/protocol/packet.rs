//! Wire format for the four protocol messages.
//!
//! Every datagram starts with a fixed 49-byte header:
//!
//! ```text
//! type (1 byte ASCII) | origin ip (4 x u32) | origin port (u32) | sequence (u32)
//! | ttl (u32) | destination ip (4 x u32) | destination port (u32)
//! ```
//!
//! All integers are big-endian. The payload that follows depends on the type.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::types::{ADDRESS_WIRE_LEN, NodeAddress};

pub const HEADER_LEN: usize = 1 + ADDRESS_WIRE_LEN + 4 + 4 + ADDRESS_WIRE_LEN;

pub const HELLO_TEXT: &str = "hello";
pub const HELLO_ACK_TEXT: &str = "hello-ack";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Hello,
    HelloAck,
    LinkState,
    RouteTrace,
}

impl PacketType {
    pub fn tag(self) -> u8 {
        match self {
            PacketType::Hello => b'H',
            PacketType::HelloAck => b'A',
            PacketType::LinkState => b'L',
            PacketType::RouteTrace => b'T',
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'H' => Some(PacketType::Hello),
            b'A' => Some(PacketType::HelloAck),
            b'L' => Some(PacketType::LinkState),
            b'T' => Some(PacketType::RouteTrace),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Diagnostic text; carries no protocol meaning.
    Text(String),
    /// Live neighbor list of a link-state originator.
    Neighbors(Vec<NodeAddress>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub origin: NodeAddress,
    pub sequence: u32,
    pub ttl: u32,
    pub destination: NodeAddress,
    pub payload: Payload,
}

impl Packet {
    pub fn hello(origin: NodeAddress, destination: NodeAddress) -> Self {
        Self {
            packet_type: PacketType::Hello,
            origin,
            sequence: 0,
            ttl: 0,
            destination,
            payload: Payload::Text(HELLO_TEXT.to_string()),
        }
    }

    pub fn hello_ack(origin: NodeAddress, destination: NodeAddress) -> Self {
        Self {
            packet_type: PacketType::HelloAck,
            origin,
            sequence: 0,
            ttl: 0,
            destination,
            payload: Payload::Text(HELLO_ACK_TEXT.to_string()),
        }
    }

    pub fn link_state(
        origin: NodeAddress,
        sequence: u32,
        ttl: u32,
        destination: NodeAddress,
        neighbors: Vec<NodeAddress>,
    ) -> Self {
        Self {
            packet_type: PacketType::LinkState,
            origin,
            sequence,
            ttl,
            destination,
            payload: Payload::Neighbors(neighbors),
        }
    }

    pub fn route_trace(
        origin: NodeAddress,
        sequence: u32,
        ttl: u32,
        destination: NodeAddress,
    ) -> Self {
        Self {
            packet_type: PacketType::RouteTrace,
            origin,
            sequence,
            ttl,
            destination,
            payload: Payload::Text(String::new()),
        }
    }

    /// Neighbor list of a link-state packet, empty for every other type.
    pub fn neighbors(&self) -> &[NodeAddress] {
        match &self.payload {
            Payload::Neighbors(neighbors) => neighbors,
            Payload::Text(_) => &[],
        }
    }

    pub fn encode(&self) -> Bytes {
        let payload = self.encode_payload();
        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());

        buf.put_u8(self.packet_type.tag());
        self.origin.write_wire(&mut buf);
        buf.put_u32(self.sequence);
        buf.put_u32(self.ttl);
        self.destination.write_wire(&mut buf);
        buf.put_slice(&payload);

        buf.freeze()
    }

    fn encode_payload(&self) -> Vec<u8> {
        match (&self.payload, self.packet_type) {
            (_, PacketType::RouteTrace) => Vec::new(),
            (Payload::Text(text), _) => text.as_bytes().to_vec(),
            // A list of addresses always serializes.
            (Payload::Neighbors(neighbors), _) => serde_json::to_vec(neighbors).unwrap_or_default(),
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < HEADER_LEN {
            return Err(ProtocolError::MalformedPacket(format!(
                "datagram of {} bytes is shorter than the {}-byte header",
                data.len(),
                HEADER_LEN
            )));
        }

        let mut buf = data;
        let tag = buf.get_u8();
        let packet_type = PacketType::from_tag(tag).ok_or_else(|| {
            ProtocolError::MalformedPacket(format!("unknown type tag {:#04x}", tag))
        })?;
        let origin = NodeAddress::read_wire(&mut buf)?;
        let sequence = buf.get_u32();
        let ttl = buf.get_u32();
        let destination = NodeAddress::read_wire(&mut buf)?;

        let payload = match packet_type {
            PacketType::LinkState => {
                let neighbors: Vec<NodeAddress> = serde_json::from_slice(buf).map_err(|e| {
                    ProtocolError::MalformedPacket(format!("bad neighbor list: {}", e))
                })?;
                Payload::Neighbors(neighbors)
            }
            _ => Payload::Text(String::from_utf8_lossy(buf).into_owned()),
        };

        Ok(Self {
            packet_type,
            origin,
            sequence,
            ttl,
            destination,
            payload,
        })
    }
}
