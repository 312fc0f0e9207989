//! UPDATE merge (spec section 4.2): field-wise — new value wins where
//! present, else the prior resolved value is carried forward. Arrays
//! replace wholesale when the patch supplies them; nested messages merge
//! recursively.

use crate::config::schema::*;
use crate::ids::{IpAddr, Prefix};

/// Converts a `(from, to)` range into the smallest covering prefix via
/// XOR-of-endpoints (spec section 9): the common prefix length is the
/// number of leading zero bits in `from ^ to`.
pub fn range_to_prefix(from: IpAddr, to: IpAddr) -> Prefix {
    match (from, to) {
        (IpAddr::V4(a), IpAddr::V4(b)) => {
            let x = u32::from(a) ^ u32::from(b);
            let len = x.leading_zeros() as u8;
            Prefix { addr: from, len }
        }
        (IpAddr::V6(a), IpAddr::V6(b)) => {
            let x = u128::from(a) ^ u128::from(b);
            let len = x.leading_zeros() as u8;
            Prefix { addr: from, len }
        }
        // Mixed-family range: no common prefix makes sense; treat as host route.
        _ => Prefix {
            addr: from,
            len: if from.is_v4() { 32 } else { 128 },
        },
    }
}

pub fn resolve_allowed_srcs(wire: &[AllowedSrcWire]) -> Vec<Prefix> {
    wire.iter()
        .map(|w| match w {
            AllowedSrcWire::Prefix { addr, len } => Prefix {
                addr: *addr,
                len: *len,
            },
            AllowedSrcWire::Range { from, to } => range_to_prefix(*from, *to),
        })
        .collect()
}

fn merge_timeouts(prior: SessionsTimeouts, patch: Option<SessionsTimeoutsPatch>) -> SessionsTimeouts {
    let Some(p) = patch else { return prior };
    SessionsTimeouts {
        tcp_syn_ack: p.tcp_syn_ack.unwrap_or(prior.tcp_syn_ack),
        tcp_syn: p.tcp_syn.unwrap_or(prior.tcp_syn),
        tcp_fin: p.tcp_fin.unwrap_or(prior.tcp_fin),
        tcp: p.tcp.unwrap_or(prior.tcp),
        udp: p.udp.unwrap_or(prior.udp),
        default: p.default.unwrap_or(prior.default),
    }
}

fn merge_packet_handler(
    prior: PacketHandlerConfig,
    patch: Option<PacketHandlerConfigPatch>,
) -> PacketHandlerConfig {
    let Some(p) = patch else { return prior };
    PacketHandlerConfig {
        sessions_timeouts: merge_timeouts(prior.sessions_timeouts, p.sessions_timeouts),
        vs: p.vs.unwrap_or(prior.vs),
        source_v4: p.source_v4.unwrap_or(prior.source_v4),
        source_v6: p.source_v6.unwrap_or(prior.source_v6),
        decap_addresses: p.decap_addresses.unwrap_or(prior.decap_addresses),
    }
}

fn merge_wlc(prior: Option<WlcConfig>, patch: Option<WlcConfigPatch>) -> Option<WlcConfig> {
    match patch {
        None => prior,
        Some(p) => {
            // A patch that supplies nothing meaningful clears wlc only if
            // every field is absent; otherwise merge against prior (or
            // defaults if there was none).
            if p.power.is_none() && p.max_weight.is_none() && p.vs.is_none() {
                return prior;
            }
            let base = prior.unwrap_or(WlcConfig {
                power: 1.0,
                max_weight: 1,
                vs: vec![],
            });
            Some(WlcConfig {
                power: p.power.unwrap_or(base.power),
                max_weight: p.max_weight.unwrap_or(base.max_weight),
                vs: p.vs.unwrap_or(base.vs),
            })
        }
    }
}

fn merge_state(prior: StateConfig, patch: Option<StateConfigPatch>) -> StateConfig {
    let Some(p) = patch else { return prior };
    StateConfig {
        session_table_capacity: p
            .session_table_capacity
            .unwrap_or(prior.session_table_capacity),
        session_table_max_load_factor: p
            .session_table_max_load_factor
            .unwrap_or(prior.session_table_max_load_factor),
        refresh_period: p.refresh_period.unwrap_or(prior.refresh_period),
        wlc: merge_wlc(prior.wlc, p.wlc),
    }
}

/// Merges a wire delta against a prior resolved config. Used both for
/// UPDATE (prior = current manager state) and, degenerately, for CREATE
/// (prior = a config of all-default/zero values — every CREATE field that
/// validation requires must then be supplied by the patch itself).
pub fn merge(
    prior: &BalancerManagerConfig,
    patch: BalancerConfigPatch,
) -> BalancerManagerConfig {
    BalancerManagerConfig {
        packet_handler: merge_packet_handler(prior.packet_handler.clone(), patch.packet_handler),
        state: merge_state(prior.state.clone(), patch.state),
    }
}

pub fn empty_prior() -> BalancerManagerConfig {
    BalancerManagerConfig {
        packet_handler: PacketHandlerConfig {
            sessions_timeouts: SessionsTimeouts {
                tcp_syn_ack: 0,
                tcp_syn: 0,
                tcp_fin: 0,
                tcp: 0,
                udp: 0,
                default: 0,
            },
            vs: vec![],
            source_v4: std::net::Ipv4Addr::UNSPECIFIED,
            source_v6: std::net::Ipv6Addr::UNSPECIFIED,
            decap_addresses: vec![],
        },
        state: StateConfig {
            session_table_capacity: 0,
            session_table_max_load_factor: 0.0,
            refresh_period: 0,
            wlc: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn range_to_prefix_common_bits() {
        let from = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 0));
        let to = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 255));
        let p = range_to_prefix(from, to);
        assert_eq!(p.len, 24);
    }

    #[test]
    fn partial_update_preserves_untouched_fields() {
        let mut prior = empty_prior();
        prior.packet_handler.source_v4 = Ipv4Addr::new(10, 0, 0, 5);
        prior.packet_handler.sessions_timeouts.tcp = 100;

        let patch = BalancerConfigPatch {
            packet_handler: Some(PacketHandlerConfigPatch {
                sessions_timeouts: Some(SessionsTimeoutsPatch {
                    tcp_syn_ack: Some(30),
                    tcp_syn: Some(40),
                    tcp_fin: Some(35),
                    tcp: Some(200),
                    udp: Some(21),
                    default: Some(39),
                }),
                ..Default::default()
            }),
            state: None,
        };

        let merged = merge(&prior, patch);
        assert_eq!(merged.packet_handler.source_v4, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(merged.packet_handler.sessions_timeouts.tcp, 200);
    }

    #[test]
    fn update_idempotence() {
        let prior = empty_prior();
        let patch = || BalancerConfigPatch {
            packet_handler: Some(PacketHandlerConfigPatch {
                source_v4: Some(Ipv4Addr::new(1, 2, 3, 4)),
                ..Default::default()
            }),
            state: None,
        };
        let once = merge(&prior, patch());
        let twice = merge(&once, patch());
        assert_eq!(once, twice);
    }
}
