use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

use crate::error::ProtocolError;

/// Size of an address on the wire: four octet fields and a port field, each a u32.
pub const ADDRESS_WIRE_LEN: usize = 5 * 4;

/// Identity of an emulated node: the IPv4 address and UDP port it listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct NodeAddress {
    ip: Ipv4Addr,
    port: u16,
}

/// Node → neighbor set. Ordered so that iteration (and path tie-breaks) are stable.
pub type AdjacencyMap = BTreeMap<NodeAddress, BTreeSet<NodeAddress>>;

impl NodeAddress {
    pub const fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }

    /// Writes the address as four octet fields followed by the port, each a big-endian u32.
    pub fn write_wire<B: BufMut>(&self, buf: &mut B) {
        for octet in self.ip.octets() {
            buf.put_u32(u32::from(octet));
        }
        buf.put_u32(u32::from(self.port));
    }

    /// Reads an address written by [`NodeAddress::write_wire`].
    ///
    /// Fields are 32 bits wide on the wire, so values that do not fit an octet or a
    /// port are rejected here rather than truncated.
    pub fn read_wire<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError> {
        if buf.remaining() < ADDRESS_WIRE_LEN {
            return Err(ProtocolError::MalformedPacket(format!(
                "address needs {} bytes, {} left",
                ADDRESS_WIRE_LEN,
                buf.remaining()
            )));
        }

        let mut octets = [0u8; 4];
        for octet in octets.iter_mut() {
            let raw = buf.get_u32();
            *octet = u8::try_from(raw).map_err(|_| {
                ProtocolError::MalformedPacket(format!("octet field out of range: {}", raw))
            })?;
        }

        let raw_port = buf.get_u32();
        let port = u16::try_from(raw_port).map_err(|_| {
            ProtocolError::MalformedPacket(format!("port field out of range: {}", raw_port))
        })?;

        Ok(Self::new(Ipv4Addr::from(octets), port))
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl FromStr for NodeAddress {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr: SocketAddrV4 = s.parse()?;
        Ok(addr.into())
    }
}

impl From<SocketAddrV4> for NodeAddress {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

impl TryFrom<SocketAddr> for NodeAddress {
    type Error = ProtocolError;

    fn try_from(addr: SocketAddr) -> Result<Self, Self::Error> {
        match addr {
            SocketAddr::V4(v4) => Ok(v4.into()),
            SocketAddr::V6(v6) => Err(ProtocolError::MalformedPacket(format!(
                "IPv6 peer {} is not supported",
                v6
            ))),
        }
    }
}

impl From<NodeAddress> for String {
    fn from(addr: NodeAddress) -> Self {
        addr.to_string()
    }
}

impl TryFrom<String> for NodeAddress {
    type Error = std::net::AddrParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
