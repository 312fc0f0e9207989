//! Identifiers and address primitives shared across the core.
//!
//! Addresses are raw bytes on the wire: 4 for IPv4, 41 for IPv6 (the
//! `ip_proto` discriminator convention documented in spec section 9, kept
//! here so the in-process representation matches the coexisting data
//! plane's on-wire layout).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::{BalancerError, BalancerResult};

/// IP protocol discriminator matching the native data plane's convention.
pub const IP_PROTO_V4: u8 = 0;
pub const IP_PROTO_V6: u8 = 41;

/// An address in either family, tagged the way the wire format tags it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpAddr {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
}

impl IpAddr {
    pub fn ip_proto(&self) -> u8 {
        match self {
            IpAddr::V4(_) => IP_PROTO_V4,
            IpAddr::V6(_) => IP_PROTO_V6,
        }
    }

    /// Parses raw address bytes: exactly 4 bytes for IPv4, 16 for IPv6.
    /// Any other length is rejected — this is the "mixed families in one
    /// field are rejected" rule from spec section 6 applied at the byte
    /// level.
    pub fn from_bytes(bytes: &[u8]) -> BalancerResult<Self> {
        match bytes.len() {
            4 => {
                let mut a = [0u8; 4];
                a.copy_from_slice(bytes);
                Ok(IpAddr::V4(Ipv4Addr::from(a)))
            }
            16 => {
                let mut a = [0u8; 16];
                a.copy_from_slice(bytes);
                Ok(IpAddr::V6(Ipv6Addr::from(a)))
            }
            n => Err(BalancerError::InvalidConfig(format!(
                "address must be 4 or 16 bytes, got {n}"
            ))),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            IpAddr::V4(a) => a.octets().to_vec(),
            IpAddr::V6(a) => a.octets().to_vec(),
        }
    }

    pub fn is_v4(&self) -> bool {
        matches!(self, IpAddr::V4(_))
    }
}

impl fmt::Display for IpAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpAddr::V4(a) => write!(f, "{a}"),
            IpAddr::V6(a) => write!(f, "{a}"),
        }
    }
}

/// Transport protocol a VS accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum L4Proto {
    Tcp,
    Udp,
}

impl fmt::Display for L4Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            L4Proto::Tcp => write!(f, "tcp"),
            L4Proto::Udp => write!(f, "udp"),
        }
    }
}

/// (address, port, proto) — externally visible identifier of a VS.
///
/// Port 0 is reserved for the "pure-L3" flag: any port matches. Equality is
/// exact on all three fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VsIdentifier {
    pub addr: IpAddr,
    pub port: u16,
    pub proto: L4Proto,
}

impl fmt::Display for VsIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.addr, self.port, self.proto)
    }
}

/// (address, port) — identifies a real within a VS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelativeRealIdentifier {
    pub addr: IpAddr,
    pub port: u16,
}

impl fmt::Display for RelativeRealIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

/// Global identifier of a real: its VS plus its relative identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RealIdentifier {
    pub vs: VsIdentifier,
    pub real: RelativeRealIdentifier,
}

impl fmt::Display for RealIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.real, self.vs)
    }
}

/// A CIDR-style prefix: address plus prefix length. Internal storage form
/// for allowed-source entries (the wire form may instead give a `(from,
/// to)` range, converted to a prefix via XOR-of-endpoints, see
/// [`crate::config::merge::range_to_prefix`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Prefix {
    pub addr: IpAddr,
    pub len: u8,
}

impl Prefix {
    pub fn contains(&self, other: &IpAddr) -> bool {
        match (self.addr, other) {
            (IpAddr::V4(a), IpAddr::V4(b)) => {
                if self.len > 32 {
                    return false;
                }
                let mask = if self.len == 0 {
                    0u32
                } else {
                    u32::MAX << (32 - self.len)
                };
                (u32::from(a) & mask) == (u32::from(*b) & mask)
            }
            (IpAddr::V6(a), IpAddr::V6(b)) => {
                if self.len > 128 {
                    return false;
                }
                let mask = if self.len == 0 {
                    0u128
                } else {
                    u128::MAX << (128 - self.len)
                };
                (u128::from(a) & mask) == (u128::from(*b) & mask)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_roundtrip() {
        let v4 = IpAddr::from_bytes(&[10, 0, 0, 1]).unwrap();
        assert_eq!(v4.ip_proto(), IP_PROTO_V4);
        assert_eq!(v4.to_bytes(), vec![10, 0, 0, 1]);

        let v6 = IpAddr::from_bytes(&[0u8; 16]).unwrap();
        assert_eq!(v6.ip_proto(), IP_PROTO_V6);
    }

    #[test]
    fn rejects_bad_length() {
        assert!(IpAddr::from_bytes(&[1, 2, 3]).is_err());
        assert!(IpAddr::from_bytes(&[0u8; 17]).is_err());
    }

    #[test]
    fn prefix_contains() {
        let p = Prefix {
            addr: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 0)),
            len: 24,
        };
        assert!(p.contains(&IpAddr::V4(Ipv4Addr::new(192, 168, 1, 200))));
        assert!(!p.contains(&IpAddr::V4(Ipv4Addr::new(192, 168, 2, 1))));
    }
}
