//! Statistics counters (spec section 6). All counters are unsigned
//! 64-bit, monotonically non-decreasing, and never reset by reads.
//!
//! The data-plane fast path (packet forwarding, DPDK, ICMP handling) is an
//! external collaborator out of this core's scope (spec section 1); the
//! schema for its counters is still modeled here because `stats()` is a
//! core query operation and the wire shape must exist end-to-end. The
//! counters this core can itself observe and increment — L4 session
//! admission and per-VS/per-real accounting — are wired to real
//! [`Manager`](crate::manager::Manager) operations; ICMP/Common packet
//! counters stay at zero unless a co-located data plane increments them
//! through the same atomics (out of scope here, see DESIGN.md).

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct L4Counters {
    pub incoming: AtomicU64,
    pub select_vs_failed: AtomicU64,
    pub invalid: AtomicU64,
    pub select_real_failed: AtomicU64,
    pub outgoing: AtomicU64,
}

#[derive(Debug, Default)]
pub struct IcmpCounters {
    pub incoming: AtomicU64,
    pub src_not_allowed: AtomicU64,
    pub echo_responses: AtomicU64,
    pub payload_too_short_ip: AtomicU64,
    pub payload_too_short_port: AtomicU64,
    pub unmatching_src_from_original: AtomicU64,
    pub unexpected_transport: AtomicU64,
    pub unrecognized_vs: AtomicU64,
    pub forwarded: AtomicU64,
    pub broadcasted: AtomicU64,
    pub clones_sent: AtomicU64,
    pub clones_received: AtomicU64,
    pub clone_failures: AtomicU64,
}

#[derive(Debug, Default)]
pub struct CommonCounters {
    pub incoming_packets: AtomicU64,
    pub incoming_bytes: AtomicU64,
    pub decap_successful: AtomicU64,
    pub decap_failed: AtomicU64,
    pub outgoing_packets: AtomicU64,
    pub outgoing_bytes: AtomicU64,
    pub unexpected_network_proto: AtomicU64,
    pub session_table_overflow: AtomicU64,
    pub no_reals_available: AtomicU64,
}

/// All counters for one manager. `AtomicU64` fields so fast-path
/// increments (spec section 7: "fast-path errors ... are counted in
/// stats and do not propagate") don't need the manager's write lock.
#[derive(Debug, Default)]
pub struct Counters {
    pub l4: L4Counters,
    pub icmp_v4: IcmpCounters,
    pub icmp_v6: IcmpCounters,
    pub common: CommonCounters,
}

impl Counters {
    pub fn record_session_admitted(&self) {
        self.l4.incoming.fetch_add(1, Ordering::Relaxed);
        self.l4.outgoing.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_select_real_failed(&self) {
        self.l4.select_real_failed.fetch_add(1, Ordering::Relaxed);
        self.common.no_reals_available.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_table_overflow(&self) {
        self.common.session_table_overflow.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        fn l4_snap(c: &L4Counters) -> L4CountersSnapshot {
            L4CountersSnapshot {
                incoming: c.incoming.load(Ordering::Relaxed),
                select_vs_failed: c.select_vs_failed.load(Ordering::Relaxed),
                invalid: c.invalid.load(Ordering::Relaxed),
                select_real_failed: c.select_real_failed.load(Ordering::Relaxed),
                outgoing: c.outgoing.load(Ordering::Relaxed),
            }
        }
        fn icmp_snap(c: &IcmpCounters) -> IcmpCountersSnapshot {
            IcmpCountersSnapshot {
                incoming: c.incoming.load(Ordering::Relaxed),
                src_not_allowed: c.src_not_allowed.load(Ordering::Relaxed),
                echo_responses: c.echo_responses.load(Ordering::Relaxed),
                payload_too_short_ip: c.payload_too_short_ip.load(Ordering::Relaxed),
                payload_too_short_port: c.payload_too_short_port.load(Ordering::Relaxed),
                unmatching_src_from_original: c.unmatching_src_from_original.load(Ordering::Relaxed),
                unexpected_transport: c.unexpected_transport.load(Ordering::Relaxed),
                unrecognized_vs: c.unrecognized_vs.load(Ordering::Relaxed),
                forwarded: c.forwarded.load(Ordering::Relaxed),
                broadcasted: c.broadcasted.load(Ordering::Relaxed),
                clones_sent: c.clones_sent.load(Ordering::Relaxed),
                clones_received: c.clones_received.load(Ordering::Relaxed),
                clone_failures: c.clone_failures.load(Ordering::Relaxed),
            }
        }
        CountersSnapshot {
            l4: l4_snap(&self.l4),
            icmp_v4: icmp_snap(&self.icmp_v4),
            icmp_v6: icmp_snap(&self.icmp_v6),
            common: CommonCountersSnapshot {
                incoming_packets: self.common.incoming_packets.load(Ordering::Relaxed),
                incoming_bytes: self.common.incoming_bytes.load(Ordering::Relaxed),
                decap_successful: self.common.decap_successful.load(Ordering::Relaxed),
                decap_failed: self.common.decap_failed.load(Ordering::Relaxed),
                outgoing_packets: self.common.outgoing_packets.load(Ordering::Relaxed),
                outgoing_bytes: self.common.outgoing_bytes.load(Ordering::Relaxed),
                unexpected_network_proto: self.common.unexpected_network_proto.load(Ordering::Relaxed),
                session_table_overflow: self.common.session_table_overflow.load(Ordering::Relaxed),
                no_reals_available: self.common.no_reals_available.load(Ordering::Relaxed),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct L4CountersSnapshot {
    pub incoming: u64,
    pub select_vs_failed: u64,
    pub invalid: u64,
    pub select_real_failed: u64,
    pub outgoing: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcmpCountersSnapshot {
    pub incoming: u64,
    pub src_not_allowed: u64,
    pub echo_responses: u64,
    pub payload_too_short_ip: u64,
    pub payload_too_short_port: u64,
    pub unmatching_src_from_original: u64,
    pub unexpected_transport: u64,
    pub unrecognized_vs: u64,
    pub forwarded: u64,
    pub broadcasted: u64,
    pub clones_sent: u64,
    pub clones_received: u64,
    pub clone_failures: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonCountersSnapshot {
    pub incoming_packets: u64,
    pub incoming_bytes: u64,
    pub decap_successful: u64,
    pub decap_failed: u64,
    pub outgoing_packets: u64,
    pub outgoing_bytes: u64,
    pub unexpected_network_proto: u64,
    pub session_table_overflow: u64,
    pub no_reals_available: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountersSnapshot {
    pub l4: L4CountersSnapshot,
    pub icmp_v4: IcmpCountersSnapshot,
    pub icmp_v6: IcmpCountersSnapshot,
    pub common: CommonCountersSnapshot,
}
