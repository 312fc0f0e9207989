//! Config round-trip and resize-through-the-manager properties (spec.md
//! section 8, properties 1 and 7), exercised against `Manager` rather
//! than the lower-level pieces already covered by their own unit tests.

use balancer_core::config::schema::*;
use balancer_core::ids::{IpAddr, L4Proto, RelativeRealIdentifier, VsIdentifier};
use balancer_core::manager::Manager;
use balancer_core::session_table::TimeoutClass;
use std::net::{Ipv4Addr, Ipv6Addr};

fn full_patch() -> BalancerConfigPatch {
    BalancerConfigPatch {
        packet_handler: Some(PacketHandlerConfigPatch {
            sessions_timeouts: Some(SessionsTimeoutsPatch {
                tcp_syn_ack: Some(10),
                tcp_syn: Some(20),
                tcp_fin: Some(15),
                tcp: Some(100),
                udp: Some(11),
                default: Some(19),
            }),
            vs: Some(vec![VirtualService {
                id: VsIdentifier {
                    addr: IpAddr::V4(Ipv4Addr::new(10, 12, 13, 213)),
                    port: 80,
                    proto: L4Proto::Tcp,
                },
                flags: VsFlags::empty(),
                scheduler: VsScheduler::SourceHash,
                reals: vec![RealConfig {
                    id: RelativeRealIdentifier {
                        addr: IpAddr::V4(Ipv4Addr::new(10, 12, 13, 213)),
                        port: 8080,
                    },
                    src_addr: IpAddr::V4(Ipv4Addr::new(172, 16, 0, 0)),
                    src_mask: vec![255, 255, 255, 0],
                    weight: 100,
                }],
                allowed_srcs: vec![AllowedSrcWire::Prefix {
                    addr: IpAddr::V4(Ipv4Addr::new(192, 1, 1, 0)),
                    len: 24,
                }],
                peers_v4: vec![Ipv4Addr::new(12, 1, 1, 3)],
                peers_v6: vec![],
            }]),
            source_v4: Some(Ipv4Addr::new(10, 12, 13, 213)),
            source_v6: Some(Ipv6Addr::new(0x2001, 0x0db8, 0, 0, 0, 0, 0, 1)),
            decap_addresses: Some(vec![IpAddr::V4(Ipv4Addr::new(10, 13, 11, 215))]),
        }),
        state: Some(StateConfigPatch {
            session_table_capacity: Some(1000),
            session_table_max_load_factor: Some(0.0),
            refresh_period: Some(0),
            wlc: None,
        }),
    }
}

/// Property 1: encode/decode round-trips through serde, and
/// `create; config()` returns exactly what was submitted (fully specified).
#[test]
fn config_round_trips_through_json_and_manager() {
    let manager = Manager::create("b0", full_patch()).unwrap();
    let cfg = manager.config();

    let encoded = serde_json::to_string(&cfg).unwrap();
    let decoded: BalancerManagerConfig = serde_json::from_str(&encoded).unwrap();
    assert_eq!(cfg, decoded);
}

/// Property 7: resize preserves every live entry, with remaining TTL
/// accurate to +/-1s, observed through `Manager::insert_session` /
/// `lookup_session` rather than the raw session table.
#[test]
fn resize_through_manager_preserves_live_sessions() {
    let manager = Manager::create("b0", full_patch()).unwrap();
    let vs = manager.vs_ids()[0];
    let client = IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4));

    manager
        .insert_session(client, 5000, vs, TimeoutClass::Tcp, 0)
        .unwrap();

    manager.resize_session_table(4096, 5).unwrap();

    let entry = manager
        .lookup_session(client, 5000, vs, 5)
        .expect("session survives resize");
    assert_eq!(entry.real.vs, vs);

    // tcp timeout is 100s from t=0; at t=5 remaining ~95s.
    assert!(manager.lookup_session(client, 5000, vs, 99).is_some());
    assert!(manager.lookup_session(client, 5000, vs, 102).is_none());
}

/// Property 9 (registry-level duplicate) re-stated against the bare
/// `Manager::create` constructor: a `create` failure (invalid config)
/// never leaves a partially-built manager behind — it's a `Result`, so
/// there is nothing to observe, but we check the error path doesn't panic
/// and surfaces `InvalidConfig`.
#[test]
fn invalid_patch_is_rejected_with_invalid_config() {
    let mut patch = full_patch();
    // PureL3 with nonzero port violates the VS invariant (spec section 3).
    patch.packet_handler.as_mut().unwrap().vs.as_mut().unwrap()[0].flags = VsFlags::PURE_L3;

    let err = Manager::create("b0", patch).unwrap_err();
    assert!(matches!(err, balancer_core::error::BalancerError::InvalidConfig(_)));
}
