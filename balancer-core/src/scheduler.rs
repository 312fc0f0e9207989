//! Real selection (spec section 4.4). Modeled as a tagged variant rather
//! than dynamic dispatch through a trait object — the spec fixes the set
//! of variants (`SourceHash`, `RoundRobin`), so a small match is simpler
//! and just as extensible for the cases that actually occur (spec section
//! 9 "Polymorphic scheduler").

use crate::config::schema::VsScheduler;
use crate::error::{BalancerError, BalancerResult};
use crate::ids::{IpAddr, RelativeRealIdentifier};
use crate::real_state::RealState;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Per-VS scheduling state. `RoundRobin` needs a cursor that survives
/// across calls (spec section 4.4: "advanced on each new session"); the
/// cursor lives here, outside the (re-publishable) `RealTable` snapshot.
pub struct Scheduler {
    kind: VsScheduler,
    rr_cursor: AtomicUsize,
    rr_weight_remaining: AtomicUsize,
}

impl Scheduler {
    pub fn new(kind: VsScheduler) -> Self {
        Self {
            kind,
            rr_cursor: AtomicUsize::new(0),
            rr_weight_remaining: AtomicUsize::new(0),
        }
    }

    pub fn kind(&self) -> VsScheduler {
        self.kind
    }

    /// Selects a real for a new session given the client 5-tuple and the
    /// current weighted/enabled real table. Disabled reals are skipped but
    /// retained in the table (spec section 4.4: identifiers stay stable
    /// across admin toggles).
    pub fn select(
        &self,
        client_addr: IpAddr,
        client_port: u16,
        reals: &[RealState],
    ) -> BalancerResult<RelativeRealIdentifier> {
        let enabled: Vec<&RealState> = reals.iter().filter(|r| r.enabled && r.effective_weight > 0).collect();
        if enabled.is_empty() {
            return Err(BalancerError::NoRealsAvailable(String::new()));
        }

        match self.kind {
            VsScheduler::SourceHash => Ok(self.select_source_hash(client_addr, client_port, &enabled)),
            VsScheduler::RoundRobin => Ok(self.select_round_robin(&enabled)),
        }
    }

    /// Deterministic function of (client IP, client port) mapped onto the
    /// weighted enabled-real set (spec section 4.4). Stable across ticks
    /// when the real set is unchanged: the mapping only consults the
    /// current `reals` slice, never mutable scheduler state, so a no-op
    /// update (same weights/enabled flags) reproduces the same pick for a
    /// fixed client tuple (testable property 8).
    fn select_source_hash(
        &self,
        client_addr: IpAddr,
        client_port: u16,
        enabled: &[&RealState],
    ) -> RelativeRealIdentifier {
        let total_weight: u64 = enabled.iter().map(|r| r.effective_weight as u64).sum();
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        client_addr.hash(&mut hasher);
        client_port.hash(&mut hasher);
        let h = hasher.finish();
        let slot = h % total_weight.max(1);

        let mut acc: u64 = 0;
        for real in enabled {
            acc += real.effective_weight as u64;
            if slot < acc {
                return real.id;
            }
        }
        // Ties / rounding fall through to the last configured real, which
        // matches the spec's tie-break ("configured real order").
        enabled.last().unwrap().id
    }

    /// Weighted round robin: emits each enabled real `weight` times before
    /// advancing the cursor (spec section 4.4). Ties broken by configured
    /// order since the cursor only ever walks forward through `enabled` in
    /// table order.
    fn select_round_robin(&self, enabled: &[&RealState]) -> RelativeRealIdentifier {
        loop {
            let cursor = self.rr_cursor.load(Ordering::Relaxed) % enabled.len();
            let real = enabled[cursor];
            let remaining = self.rr_weight_remaining.load(Ordering::Relaxed);
            if remaining == 0 {
                self.rr_weight_remaining
                    .store(real.effective_weight as usize, Ordering::Relaxed);
                continue;
            }
            self.rr_weight_remaining.store(remaining - 1, Ordering::Relaxed);
            if remaining - 1 == 0 {
                self.rr_cursor.store((cursor + 1) % enabled.len(), Ordering::Relaxed);
            }
            return real.id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn real(port: u16, weight: u16, enabled: bool) -> RealState {
        RealState {
            id: RelativeRealIdentifier {
                addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                port,
            },
            configured_weight: weight,
            effective_weight: weight,
            enabled,
        }
    }

    #[test]
    fn source_hash_stable_for_fixed_client() {
        let sched = Scheduler::new(VsScheduler::SourceHash);
        let reals = vec![real(1, 100, true), real(2, 100, true)];
        let client = IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4));
        let first = sched.select(client, 5000, &reals).unwrap();
        for _ in 0..10 {
            assert_eq!(sched.select(client, 5000, &reals).unwrap(), first);
        }
    }

    #[test]
    fn source_hash_skips_disabled() {
        let sched = Scheduler::new(VsScheduler::SourceHash);
        let reals = vec![real(1, 100, false), real(2, 100, true)];
        let client = IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4));
        let picked = sched.select(client, 5000, &reals).unwrap();
        assert_eq!(picked.port, 2);
    }

    #[test]
    fn no_reals_available() {
        let sched = Scheduler::new(VsScheduler::SourceHash);
        let reals = vec![real(1, 100, false)];
        let client = IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4));
        assert!(matches!(
            sched.select(client, 1, &reals),
            Err(BalancerError::NoRealsAvailable(_))
        ));
    }

    #[test]
    fn round_robin_honors_weights() {
        let sched = Scheduler::new(VsScheduler::RoundRobin);
        let reals = vec![real(1, 2, true), real(2, 1, true)];
        let client = IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4));
        let picks: Vec<u16> = (0..3)
            .map(|_| sched.select(client, 1, &reals).unwrap().port)
            .collect();
        assert_eq!(picks, vec![1, 1, 2]);
    }
}
