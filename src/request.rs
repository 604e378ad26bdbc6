//! Probe request model.
//!
//! The hosting collaborator hands over a protocol identifier such as `tcp`,
//! `tcp6` or `udp4`. It is resolved exactly once, here, into a closed
//! [`Transport`] choice; nothing past this module looks at the string.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::error::{RelayError, Result};

/// Prefix marking a stream-oriented protocol identifier.
const STREAM_MARKER: &str = "tcp";

/// Address family requested by the protocol identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    /// No suffix: the family of the target address is used.
    Any,
    V4,
    V6,
}

impl AddressFamily {
    fn from_suffix(protocol: &str) -> Self {
        if protocol.ends_with('4') {
            AddressFamily::V4
        } else if protocol.ends_with('6') {
            AddressFamily::V6
        } else {
            AddressFamily::Any
        }
    }

    /// Whether `addr` may be used with this family.
    pub fn admits(self, addr: &SocketAddr) -> bool {
        match self {
            AddressFamily::Any => true,
            AddressFamily::V4 => addr.is_ipv4(),
            AddressFamily::V6 => addr.is_ipv6(),
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Any => write!(f, "any"),
            AddressFamily::V4 => write!(f, "ipv4"),
            AddressFamily::V6 => write!(f, "ipv6"),
        }
    }
}

/// Transport selected for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Stream(AddressFamily),
    Datagram(AddressFamily),
}

impl Transport {
    /// Resolve a protocol identifier.
    ///
    /// Anything that does not start with `tcp` is treated as a datagram
    /// protocol, so this never fails.
    pub fn parse(protocol: &str) -> Self {
        let family = AddressFamily::from_suffix(protocol);
        if protocol.starts_with(STREAM_MARKER) {
            Transport::Stream(family)
        } else {
            Transport::Datagram(family)
        }
    }

    pub fn family(&self) -> AddressFamily {
        match self {
            Transport::Stream(family) | Transport::Datagram(family) => *family,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Stream(family) => write!(f, "stream/{family}"),
            Transport::Datagram(family) => write!(f, "datagram/{family}"),
        }
    }
}

/// A fully parsed request for one relay invocation.
///
/// Fields are private; the request cannot change once built.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    transport: Transport,
    target: SocketAddr,
    token: Vec<u8>,
}

impl ProbeRequest {
    /// Build a request from the raw trigger fields.
    ///
    /// The address must be an IP literal; no name resolution is done.
    pub fn new(
        protocol: &str,
        address: &str,
        port: u16,
        token: impl Into<Vec<u8>>,
    ) -> Result<Self> {
        let transport = Transport::parse(protocol);
        let ip: IpAddr = address.parse().map_err(|source| RelayError::InvalidAddress {
            address: address.to_string(),
            source,
        })?;
        let target = SocketAddr::new(ip, port);

        if !transport.family().admits(&target) {
            return Err(RelayError::FamilyMismatch {
                address: target,
                family: transport.family(),
            });
        }

        Ok(Self {
            transport,
            target,
            token: token.into(),
        })
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn token(&self) -> &[u8] {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_parse() {
        assert_eq!(Transport::parse("tcp"), Transport::Stream(AddressFamily::Any));
        assert_eq!(Transport::parse("tcp4"), Transport::Stream(AddressFamily::V4));
        assert_eq!(Transport::parse("tcp6"), Transport::Stream(AddressFamily::V6));
        assert_eq!(Transport::parse("udp"), Transport::Datagram(AddressFamily::Any));
        assert_eq!(Transport::parse("udp4"), Transport::Datagram(AddressFamily::V4));
        assert_eq!(Transport::parse("udp6"), Transport::Datagram(AddressFamily::V6));
    }

    #[test]
    fn test_unknown_protocol_routes_to_datagram() {
        assert_eq!(Transport::parse("sctp"), Transport::Datagram(AddressFamily::Any));
        assert_eq!(Transport::parse(""), Transport::Datagram(AddressFamily::Any));
        // Prefix match is case-sensitive
        assert_eq!(Transport::parse("TCP"), Transport::Datagram(AddressFamily::Any));
    }

    #[test]
    fn test_request_new() {
        let request = ProbeRequest::new("tcp4", "127.0.0.1", 9999, "abc123").unwrap();
        assert_eq!(request.transport(), Transport::Stream(AddressFamily::V4));
        assert_eq!(request.target(), "127.0.0.1:9999".parse::<SocketAddr>().unwrap());
        assert_eq!(request.token(), b"abc123");

        let request = ProbeRequest::new("udp", "::1", 53, vec![0u8, 1, 2]).unwrap();
        assert_eq!(request.target(), "[::1]:53".parse::<SocketAddr>().unwrap());
        assert_eq!(request.token(), &[0u8, 1, 2]);
    }

    #[test]
    fn test_request_rejects_hostnames() {
        match ProbeRequest::new("tcp", "localhost", 80, "x") {
            Err(RelayError::InvalidAddress { address, .. }) => assert_eq!(address, "localhost"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_request_rejects_family_mismatch() {
        match ProbeRequest::new("udp6", "10.0.0.1", 80, "x") {
            Err(RelayError::FamilyMismatch { family, .. }) => assert_eq!(family, AddressFamily::V6),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(ProbeRequest::new("tcp4", "::1", 80, "x").is_err());
    }
}
