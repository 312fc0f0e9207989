//! Wire-compatible configuration schema (spec section 6) and the fully
//! resolved, non-optional forms the manager actually runs with.
//!
//! The wire types carry `Option<_>` on every field that UPDATE may omit;
//! [`crate::config::merge`] folds a wire delta against a prior resolved
//! config to produce a new resolved config, which [`crate::config::validate`]
//! then checks before it is allowed to become the manager's current state.

use serde::{Deserialize, Serialize};

use crate::ids::{IpAddr, L4Proto, Prefix, RelativeRealIdentifier, VsIdentifier};

/// Reserved sentinel marking "leave weight unchanged" in a [`RealUpdate`].
pub const DONT_UPDATE_WEIGHT: u16 = u16::MAX;
/// Reserved sentinel marking "leave enabled unchanged" in a [`RealUpdate`].
pub const DONT_UPDATE_ENABLED: u8 = u8::MAX;

/// Upper bound accepted for a configured or effective real weight.
pub const MAX_REAL_WEIGHT_CEILING: u16 = u16::MAX - 1;

/// Timeouts beyond this are rejected to keep expiry arithmetic unambiguous
/// (spec section 4.3: "rejects configs where any timeout exceeds 2^31").
pub const MAX_TIMEOUT_SECONDS: u32 = 1 << 31;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VsFlags: u16 {
        const PURE_L3  = 0b0000_0001;
        const FIX_MSS  = 0b0000_0010;
        const GRE      = 0b0000_0100;
        const OPS      = 0b0000_1000;
        const WLC      = 0b0001_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VsScheduler {
    SourceHash,
    RoundRobin,
}

/// One backend endpoint behind a VS. Always fully specified: the
/// containing `reals` array is replaced as a whole on UPDATE, so there is
/// no per-field partial-update concept at this level (spec section 4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealConfig {
    pub id: RelativeRealIdentifier,
    pub src_addr: IpAddr,
    pub src_mask: Vec<u8>,
    pub weight: u16,
}

/// An allowed-source entry as it may arrive on the wire: either a prefix or
/// a `(from, to)` range (spec section 9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AllowedSrcWire {
    Prefix { addr: IpAddr, len: u8 },
    Range { from: IpAddr, to: IpAddr },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualService {
    pub id: VsIdentifier,
    pub flags: VsFlags,
    pub scheduler: VsScheduler,
    pub reals: Vec<RealConfig>,
    pub allowed_srcs: Vec<AllowedSrcWire>,
    pub peers_v4: Vec<std::net::Ipv4Addr>,
    pub peers_v6: Vec<std::net::Ipv6Addr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionsTimeoutsPatch {
    pub tcp_syn_ack: Option<u32>,
    pub tcp_syn: Option<u32>,
    pub tcp_fin: Option<u32>,
    pub tcp: Option<u32>,
    pub udp: Option<u32>,
    pub default: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionsTimeouts {
    pub tcp_syn_ack: u32,
    pub tcp_syn: u32,
    pub tcp_fin: u32,
    pub tcp: u32,
    pub udp: u32,
    pub default: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PacketHandlerConfigPatch {
    pub sessions_timeouts: Option<SessionsTimeoutsPatch>,
    pub vs: Option<Vec<VirtualService>>,
    pub source_v4: Option<std::net::Ipv4Addr>,
    pub source_v6: Option<std::net::Ipv6Addr>,
    pub decap_addresses: Option<Vec<IpAddr>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketHandlerConfig {
    pub sessions_timeouts: SessionsTimeouts,
    pub vs: Vec<VirtualService>,
    pub source_v4: std::net::Ipv4Addr,
    pub source_v6: std::net::Ipv6Addr,
    pub decap_addresses: Vec<IpAddr>,
}

/// WLC tuning, wire form. Section 6 lists only `power`/`max_weight`; the
/// VS-index set from section 4.5/9 is carried here too (see SPEC_FULL.md's
/// resolution of that ambiguity).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WlcConfigPatch {
    pub power: Option<f64>,
    pub max_weight: Option<u16>,
    pub vs: Option<Vec<u32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WlcConfig {
    pub power: f64,
    pub max_weight: u16,
    pub vs: Vec<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfigPatch {
    pub session_table_capacity: Option<u32>,
    pub session_table_max_load_factor: Option<f64>,
    pub refresh_period: Option<u64>,
    pub wlc: Option<WlcConfigPatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateConfig {
    pub session_table_capacity: u32,
    pub session_table_max_load_factor: f64,
    pub refresh_period: u64,
    pub wlc: Option<WlcConfig>,
}

/// Top-level wire delta — what `new_manager`/`update_manager` accept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalancerConfigPatch {
    pub packet_handler: Option<PacketHandlerConfigPatch>,
    pub state: Option<StateConfigPatch>,
}

/// Fully resolved manager configuration: what `config()` returns and what
/// the manager runs with between applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalancerManagerConfig {
    pub packet_handler: PacketHandlerConfig,
    pub state: StateConfig,
}

/// Administrative per-real update (spec section 4.6 / 6).
///
/// `RelativeRealIdentifier` alone is only unique within a VS (spec section
/// 3), so unlike section 6's abstract schema this carries the owning `vs`
/// explicitly — otherwise the same real address/port on two different
/// VSes would be inseparable. Recorded as an Open Question resolution in
/// DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealUpdate {
    pub vs: VsIdentifier,
    pub real_id: RelativeRealIdentifier,
    pub weight: u16,
    pub enable: u8,
}

impl RealUpdate {
    pub fn weight_change(&self) -> Option<u16> {
        if self.weight == DONT_UPDATE_WEIGHT {
            None
        } else {
            Some(self.weight)
        }
    }

    pub fn enable_change(&self) -> Option<bool> {
        if self.enable == DONT_UPDATE_ENABLED {
            None
        } else {
            Some(self.enable != 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_update_sentinels_roundtrip() {
        let u = RealUpdate {
            vs: VsIdentifier {
                addr: IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 1)),
                port: 80,
                proto: L4Proto::Tcp,
            },
            real_id: RelativeRealIdentifier {
                addr: IpAddr::V4(std::net::Ipv4Addr::new(1, 2, 3, 4)),
                port: 80,
            },
            weight: DONT_UPDATE_WEIGHT,
            enable: 1,
        };
        assert_eq!(u.weight_change(), None);
        assert_eq!(u.enable_change(), Some(true));
    }
}
