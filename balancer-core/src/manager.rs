//! Per-manager state and the operations the external interface exposes
//! (spec sections 4.2, 4.6, 4.7, 6). A `Manager` owns exactly one
//! config/session-table/scheduling-topology triple (spec section 3
//! Ownership).

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

use crate::config::schema::{BalancerConfigPatch, BalancerManagerConfig, RealUpdate};
use crate::config::{merge, validate};
use crate::error::{BalancerError, BalancerResult};
use crate::ids::{IpAddr, RealIdentifier, VsIdentifier};
use crate::real_state::RealTable;
use crate::scheduler::Scheduler;
use crate::session_table::{SessionEntry, SessionKey, SessionTable, TimeoutClass};
use crate::stats::{Counters, CountersSnapshot};
use crate::wlc::{compute_wlc_batch, WlcInput};

/// Runtime scheduling state for one VS: its scheduler plus the reals it
/// can pick from. Rebuilt wholesale whenever a commit replaces the VS's
/// real list, otherwise left alone (spec section 9: indices recomputed
/// from the new list on VS replacement).
pub struct VsRuntime {
    pub scheduler: Scheduler,
    pub reals: RealTable,
}

/// The config plus derived runtime state that a commit swaps in as one
/// unit (spec section 4.2 "atomic replace-then-commit"). Readers that
/// have already cloned out a snapshot (e.g. mid scheduling decision)
/// finish against the old copy; `Manager::state` is the atomic pointer
/// spec section 5 describes, approximated here with a `parking_lot`
/// read/write lock around an owned value rather than a lock-free
/// swap — acceptable because every access is internal and brief.
struct ManagerState {
    config: BalancerManagerConfig,
    vs_runtime: HashMap<VsIdentifier, VsRuntime>,
}

fn build_vs_runtime(config: &BalancerManagerConfig) -> HashMap<VsIdentifier, VsRuntime> {
    config
        .packet_handler
        .vs
        .iter()
        .map(|vs| {
            (
                vs.id,
                VsRuntime {
                    scheduler: Scheduler::new(vs.scheduler),
                    reals: RealTable::from_configs(&vs.reals),
                },
            )
        })
        .collect()
}

/// One balancer-manager instance (spec section 3/4). Single-threaded
/// cooperative unit per the concurrency model (spec section 5); the locks
/// here exist to let an external caller and the refresh loop task share
/// one instance safely, not to model cross-core parallelism within it.
pub struct Manager {
    name: String,
    state: RwLock<ManagerState>,
    session_table: RwLock<SessionTable>,
    last_error: Mutex<Option<String>>,
    apply_lock: Mutex<()>,
    counters: Counters,
}

impl Manager {
    /// CREATE (spec section 4.2): checked for mandatory field presence
    /// against the raw patch first — merging against an all-zero prior
    /// would otherwise silently zero-fill anything the caller omitted —
    /// then merged and validated the same way an UPDATE is.
    pub fn create(name: impl Into<String>, patch: BalancerConfigPatch) -> BalancerResult<Self> {
        validate::validate_create_presence(&patch)?;

        let prior = merge::empty_prior();
        let merged = merge::merge(&prior, patch);
        validate::validate(&merged)?;

        let session_table = SessionTable::new(merged.state.session_table_capacity);
        let vs_runtime = build_vs_runtime(&merged);

        Ok(Self {
            name: name.into(),
            state: RwLock::new(ManagerState {
                config: merged,
                vs_runtime,
            }),
            session_table: RwLock::new(session_table),
            last_error: Mutex::new(None),
            apply_lock: Mutex::new(()),
            counters: Counters::default(),
        })
    }

    pub fn stats(&self) -> CountersSnapshot {
        self.counters.snapshot()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// UPDATE (spec section 4.2): field-wise merge against the current
    /// config, validated as a whole, then committed atomically. Failure
    /// leaves the previous state intact (all-or-nothing) — the merge
    /// builds a candidate value before taking the write lock, so a failed
    /// validation never touches `self.state`.
    pub fn update(&self, patch: BalancerConfigPatch, _now: u32) -> BalancerResult<()> {
        let _guard = self.apply_lock.lock();

        let candidate = {
            let current = self.state.read();
            merge::merge(&current.config, patch)
        };

        if let Err(e) = validate::validate(&candidate) {
            self.set_last_error(e.to_string());
            return Err(e);
        }

        let new_capacity = candidate.state.session_table_capacity;
        let new_vs_runtime = build_vs_runtime(&candidate);

        {
            let mut state = self.state.write();
            state.config = candidate;
            state.vs_runtime = new_vs_runtime;
        }

        // Session table capacity may have changed via UPDATE; resize is
        // idempotent (same capacity -> same rounded-up power of two, no
        // data movement beyond the rehash the resize always performs).
        {
            let mut table = self.session_table.write();
            if table.capacity() != (new_capacity.max(1) as usize).next_power_of_two() {
                let _ = table.resize(new_capacity, _now);
            }
        }

        Ok(())
    }

    pub fn config(&self) -> BalancerManagerConfig {
        self.state.read().config.clone()
    }

    /// Administrative per-real update (spec section 4.6): writes both
    /// configured and effective weight, routed to the owning VS's real
    /// table and mirrored into the stored config so `config()` reflects
    /// the new baseline.
    pub fn update_reals(&self, updates: &[RealUpdate]) -> BalancerResult<()> {
        let _guard = self.apply_lock.lock();
        let mut state = self.state.write();

        for u in updates {
            let runtime = state
                .vs_runtime
                .get_mut(&u.vs)
                .ok_or_else(|| BalancerError::NotFound(format!("vs {}", u.vs)))?;
            runtime
                .reals
                .apply_admin_update(u.real_id, u.weight, u.enable)?;

            if let Some(weight) = u.weight_change() {
                if let Some(vs) = state
                    .config
                    .packet_handler
                    .vs
                    .iter_mut()
                    .find(|v| v.id == u.vs)
                {
                    if let Some(real) = vs.reals.iter_mut().find(|r| r.id == u.real_id) {
                        real.weight = weight;
                    }
                }
            }
        }

        Ok(())
    }

    /// Applies a WLC batch (spec section 4.5): effective weight only,
    /// never touching configured weight or `enabled`. Submitted as one
    /// unit under the same write lock as admin updates so a reader never
    /// observes a partially-applied batch (spec section 5).
    pub fn apply_wlc_batch(
        &self,
        vs: VsIdentifier,
        updates: &[crate::wlc::WlcUpdate],
    ) -> BalancerResult<()> {
        let mut state = self.state.write();
        let runtime = state
            .vs_runtime
            .get_mut(&vs)
            .ok_or_else(|| BalancerError::NotFound(format!("vs {vs}")))?;
        for u in updates {
            runtime
                .reals
                .apply_wlc_update(u.real_id, u.new_effective_weight)?;
        }
        Ok(())
    }

    /// Runs one WLC pass for `vs`, gathering per-real session counts from
    /// the session table, and applies the resulting batch. No-ops (not an
    /// error) if the VS carries no Wlc-eligible configuration — callers in
    /// the refresh loop only invoke this for VSes in `WlcConfig.vs`.
    pub fn run_wlc_for_vs(&self, vs: VsIdentifier, now: u32) -> BalancerResult<()> {
        let (power, max_weight, reals) = {
            let state = self.state.read();
            let wlc = state
                .config
                .state
                .wlc
                .as_ref()
                .ok_or_else(|| BalancerError::Internal("run_wlc_for_vs called without wlc config".into()))?;
            let runtime = state
                .vs_runtime
                .get(&vs)
                .ok_or_else(|| BalancerError::NotFound(format!("vs {vs}")))?;
            (wlc.power, wlc.max_weight, runtime.reals.as_slice().to_vec())
        };

        let session_table = self.session_table.read();
        let inputs: Vec<WlcInput> = reals
            .iter()
            .map(|r| WlcInput {
                real_id: r.id,
                configured_weight: r.configured_weight,
                connections: self.count_sessions_for_real(
                    &session_table,
                    RealIdentifier { vs, real: r.id },
                    now,
                ),
            })
            .collect();
        drop(session_table);

        let batch = compute_wlc_batch(&inputs, &reals, power, max_weight)?;
        if !batch.is_empty() {
            self.apply_wlc_batch(vs, &batch)?;
        }
        Ok(())
    }

    fn count_sessions_for_real(&self, table: &SessionTable, real: RealIdentifier, now: u32) -> u64 {
        table
            .live_entries(now)
            .filter(|entry| entry.real == real)
            .count() as u64
    }

    pub fn insert_session(
        &self,
        client_addr: IpAddr,
        client_port: u16,
        vs: VsIdentifier,
        class: TimeoutClass,
        now: u32,
    ) -> BalancerResult<RealIdentifier> {
        let state = self.state.read();
        let runtime = state
            .vs_runtime
            .get(&vs)
            .ok_or_else(|| BalancerError::NotFound(format!("vs {vs}")))?;
        let relative = match runtime.scheduler.select(client_addr, client_port, runtime.reals.as_slice()) {
            Ok(r) => r,
            Err(BalancerError::NoRealsAvailable(_)) => {
                self.counters.record_select_real_failed();
                return Err(BalancerError::NoRealsAvailable(vs.to_string()));
            }
            Err(e) => {
                self.counters.record_select_real_failed();
                return Err(e);
            }
        };
        let real = RealIdentifier { vs, real: relative };
        let timeouts = state.config.packet_handler.sessions_timeouts;
        drop(state);

        let key = SessionKey {
            client_addr,
            client_port,
            vs,
        };
        match self.session_table.write().insert(key, real, class, now, &timeouts) {
            Ok(()) => {
                self.counters.record_session_admitted();
                Ok(real)
            }
            Err(e) => {
                self.counters.record_session_table_overflow();
                Err(e)
            }
        }
    }

    pub fn lookup_session(
        &self,
        client_addr: IpAddr,
        client_port: u16,
        vs: VsIdentifier,
        now: u32,
    ) -> Option<SessionEntry> {
        let key = SessionKey {
            client_addr,
            client_port,
            vs,
        };
        self.session_table.read().lookup(&key, now)
    }

    /// Called once per refresh tick (spec section 4.7): samples load,
    /// resizes if over threshold, runs WLC for eligible VSes.
    pub fn refresh_tick(&self, now: u32) -> BalancerResult<()> {
        let (refresh_period, max_load_factor, wlc_vses) = {
            let state = self.state.read();
            let wlc_vses: Vec<VsIdentifier> = match &state.config.state.wlc {
                Some(wlc) => wlc
                    .vs
                    .iter()
                    .filter_map(|idx| state.config.packet_handler.vs.get(*idx as usize).map(|v| v.id))
                    .collect(),
                None => Vec::new(),
            };
            (
                state.config.state.refresh_period,
                state.config.state.session_table_max_load_factor,
                wlc_vses,
            )
        };

        if refresh_period == 0 {
            return Ok(());
        }

        let load = self.session_table.read().load_factor(now);
        if load > max_load_factor {
            let new_capacity = (self.session_table.read().capacity() * 2) as u32;
            if let Err(e) = self.session_table.write().resize(new_capacity, now) {
                if !matches!(e, BalancerError::ResizeInProgress) {
                    return Err(e);
                }
            }
        }

        for vs in wlc_vses {
            self.run_wlc_for_vs(vs, now)?;
        }

        Ok(())
    }

    pub fn set_last_error(&self, msg: impl Into<String>) {
        *self.last_error.lock() = Some(msg.into());
    }

    /// Retrieves and clears the last-error slot (spec section 6: "caller
    /// owns the returned string").
    pub fn take_error(&self) -> Option<String> {
        self.last_error.lock().take()
    }

    pub fn session_table_snapshot(&self) -> crate::fwmap::FwMapStats {
        self.session_table.read().stats()
    }

    pub fn vs_real_snapshot(&self, vs: VsIdentifier) -> Option<Vec<crate::real_state::RealState>> {
        self.state
            .read()
            .vs_runtime
            .get(&vs)
            .map(|r| r.reals.as_slice().to_vec())
    }

    pub fn resize_session_table(&self, new_capacity: u32, now: u32) -> BalancerResult<()> {
        self.session_table.write().resize(new_capacity, now)
    }

    pub fn vs_ids(&self) -> Vec<VsIdentifier> {
        self.state.read().config.packet_handler.vs.iter().map(|v| v.id).collect()
    }

    /// Spec section 6 `info`: a live-state snapshot, not a config echo.
    pub fn info(&self, now: u32) -> crate::query::BalancerInfo {
        let vses = self.vs_ids();
        let table = self.session_table.read();
        let mut last_packet_ts = 0u32;
        let mut total = 0u64;
        let mut per_vs = Vec::with_capacity(vses.len());
        for vs in vses {
            let mut count = 0u64;
            for entry in table.live_entries(now) {
                if entry.real.vs == vs {
                    count += 1;
                    last_packet_ts = last_packet_ts.max(entry.last_packet);
                }
            }
            total += count;
            per_vs.push(crate::query::PerVsInfo {
                vs,
                active_sessions: count,
            });
        }
        crate::query::BalancerInfo {
            active_sessions: total,
            last_packet_ts,
            per_vs,
        }
    }

    /// Spec section 6 `sessions`: every live session as of `now`.
    pub fn sessions(&self, now: u32) -> Vec<(crate::query::SessionIdentifier, crate::query::SessionInfo)> {
        let table = self.session_table.read();
        table
            .live_entries_with_keys(now)
            .map(|(key, entry)| {
                (
                    crate::query::SessionIdentifier {
                        client_addr: key.client_addr,
                        client_port: key.client_port,
                        vs: key.vs,
                    },
                    crate::query::SessionInfo {
                        real: entry.real,
                        create_time: entry.create_time,
                        last_packet: entry.last_packet,
                        class: entry.class,
                    },
                )
            })
            .collect()
    }

    /// Spec section 6 `graph`: configured vs. effective weight per real,
    /// grouped by VS (spec section 4.5).
    pub fn graph(&self) -> crate::query::BalancerGraph {
        let state = self.state.read();
        let vses = &state.config.packet_handler.vs;
        let vses = vses
            .iter()
            .map(|vs| {
                let reals = state
                    .vs_runtime
                    .get(&vs.id)
                    .map(|r| {
                        r.reals
                            .as_slice()
                            .iter()
                            .map(|real| crate::query::GraphReal {
                                id: real.id,
                                configured_weight: real.configured_weight,
                                effective_weight: real.effective_weight,
                                enabled: real.enabled,
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                crate::query::GraphVs { vs: vs.id, reals }
            })
            .collect();
        crate::query::BalancerGraph { vses }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::*;
    use crate::ids::{L4Proto, RelativeRealIdentifier};
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn s1_patch() -> BalancerConfigPatch {
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

    #[test]
    fn s1_create_round_trips() {
        let mgr = Manager::create("b0", s1_patch()).unwrap();
        let cfg = mgr.config();
        assert_eq!(cfg.packet_handler.vs.len(), 1);
        assert_eq!(cfg.packet_handler.source_v4, Ipv4Addr::new(10, 12, 13, 213));
    }

    /// Spec section 4.2 lists `packet_handler`, `sessions_timeouts` (all six
    /// fields), `source_v4`/`source_v6`, and `decap_addresses` as mandatory
    /// CREATE presence checks. A CREATE omitting `packet_handler` entirely
    /// must be rejected rather than silently zero-filled by the
    /// empty-prior merge.
    #[test]
    fn create_rejects_patch_missing_packet_handler() {
        let patch = BalancerConfigPatch {
            packet_handler: None,
            state: Some(StateConfigPatch {
                session_table_capacity: Some(1000),
                session_table_max_load_factor: Some(0.0),
                refresh_period: Some(0),
                wlc: None,
            }),
        };
        let err = Manager::create("b0", patch).unwrap_err();
        assert!(matches!(err, BalancerError::InvalidConfig(_)));
    }

    /// Same rule, narrower omission: `sessions_timeouts` left out of an
    /// otherwise complete `packet_handler` patch.
    #[test]
    fn create_rejects_patch_missing_sessions_timeouts() {
        let mut patch = s1_patch();
        patch.packet_handler.as_mut().unwrap().sessions_timeouts = None;
        let err = Manager::create("b0", patch).unwrap_err();
        assert!(matches!(err, BalancerError::InvalidConfig(_)));
    }

    #[test]
    fn s2_partial_update_preserves_rest() {
        let mgr = Manager::create("b0", s1_patch()).unwrap();
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
        mgr.update(patch, 0).unwrap();
        let cfg = mgr.config();
        assert_eq!(cfg.packet_handler.sessions_timeouts.tcp, 200);
        assert_eq!(cfg.packet_handler.vs.len(), 1);
        assert_eq!(cfg.packet_handler.source_v4, Ipv4Addr::new(10, 12, 13, 213));
        assert_eq!(
            cfg.packet_handler.decap_addresses,
            vec![IpAddr::V4(Ipv4Addr::new(10, 13, 11, 215))]
        );
    }

    #[test]
    fn update_reals_updates_config_and_runtime() {
        let mgr = Manager::create("b0", s1_patch()).unwrap();
        let vs = mgr.vs_ids()[0];
        mgr.update_reals(&[RealUpdate {
            vs,
            real_id: RelativeRealIdentifier {
                addr: IpAddr::V4(Ipv4Addr::new(10, 12, 13, 213)),
                port: 8080,
            },
            weight: 50,
            enable: DONT_UPDATE_ENABLED,
        }])
        .unwrap();

        assert_eq!(mgr.config().packet_handler.vs[0].reals[0].weight, 50);
        let reals = mgr.vs_real_snapshot(vs).unwrap();
        assert_eq!(reals[0].configured_weight, 50);
        assert_eq!(reals[0].effective_weight, 50);
    }

    /// Spec section 7: `NoRealsAvailable` is surfaced per-VS. The scheduler
    /// itself has no VS to name, so the manager fills it in before the
    /// error leaves `insert_session`.
    #[test]
    fn no_reals_available_error_names_the_vs() {
        let mgr = Manager::create("b0", s1_patch()).unwrap();
        let vs = mgr.vs_ids()[0];
        mgr.update_reals(&[RealUpdate {
            vs,
            real_id: RelativeRealIdentifier {
                addr: IpAddr::V4(Ipv4Addr::new(10, 12, 13, 213)),
                port: 8080,
            },
            weight: DONT_UPDATE_WEIGHT,
            enable: 0,
        }])
        .unwrap();

        let client = IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4));
        let err = mgr
            .insert_session(client, 5000, vs, crate::session_table::TimeoutClass::Tcp, 0)
            .unwrap_err();
        match err {
            BalancerError::NoRealsAvailable(id) => assert_eq!(id, vs.to_string()),
            other => panic!("expected NoRealsAvailable, got {other:?}"),
        }
    }

    #[test]
    fn wlc_update_reals_config_unaffected() {
        let mgr = Manager::create("b0", s1_patch()).unwrap();
        let vs = mgr.vs_ids()[0];
        mgr.apply_wlc_batch(
            vs,
            &[crate::wlc::WlcUpdate {
                real_id: RelativeRealIdentifier {
                    addr: IpAddr::V4(Ipv4Addr::new(10, 12, 13, 213)),
                    port: 8080,
                },
                new_effective_weight: 777,
            }],
        )
        .unwrap();

        assert_eq!(mgr.config().packet_handler.vs[0].reals[0].weight, 100);
        let reals = mgr.vs_real_snapshot(vs).unwrap();
        assert_eq!(reals[0].effective_weight, 777);
        assert_eq!(reals[0].configured_weight, 100);
    }
}
