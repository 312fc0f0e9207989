//! Read-only query surface (spec section 6): `info`, `sessions`, `graph`.
//! `config` and `stats` live as plain methods on
//! [`Manager`](crate::manager::Manager) / [`crate::stats::Counters`]; these
//! three are grouped here because they assemble a snapshot out of several
//! pieces of manager state rather than returning one field directly.

use serde::{Deserialize, Serialize};

use crate::ids::{IpAddr, RealIdentifier, RelativeRealIdentifier, VsIdentifier};
use crate::session_table::TimeoutClass;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerVsInfo {
    pub vs: VsIdentifier,
    pub active_sessions: u64,
}

/// Per-manager live-state snapshot (spec section 6 `info`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalancerInfo {
    pub active_sessions: u64,
    pub last_packet_ts: u32,
    pub per_vs: Vec<PerVsInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionIdentifier {
    pub client_addr: IpAddr,
    pub client_port: u16,
    pub vs: VsIdentifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub real: RealIdentifier,
    pub create_time: u32,
    pub last_packet: u32,
    pub class: TimeoutClass,
}

/// One real as the graph view presents it: configured vs. effective
/// weight distinguished explicitly (spec section 4.5: "surfaced in the
/// graph view").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraphReal {
    pub id: RelativeRealIdentifier,
    pub configured_weight: u16,
    pub effective_weight: u16,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphVs {
    pub vs: VsIdentifier,
    pub reals: Vec<GraphReal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BalancerGraph {
    pub vses: Vec<GraphVs>,
}
