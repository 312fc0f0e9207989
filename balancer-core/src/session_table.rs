//! Session table (spec section 4.3): fixed-capacity hash of
//! 5-tuple→(selected real, timeout class), auto-resized by the refresh
//! loop. Built directly on [`crate::fwmap::FwMap`] — the session table is
//! the concrete instance of the TTL-indexed design spec section 3 asks for.

use crate::error::{BalancerError, BalancerResult};
use crate::fwmap::FwMap;
use crate::ids::{IpAddr, RealIdentifier, VsIdentifier};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// One of the six named timeout classes (spec section 3). The data plane
/// picks one per packet; the core stores it verbatim against the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeoutClass {
    TcpSynAck,
    TcpSyn,
    TcpFin,
    Tcp,
    Udp,
    Default,
}

impl TimeoutClass {
    pub fn seconds(self, timeouts: &crate::config::schema::SessionsTimeouts) -> u32 {
        match self {
            TimeoutClass::TcpSynAck => timeouts.tcp_syn_ack,
            TimeoutClass::TcpSyn => timeouts.tcp_syn,
            TimeoutClass::TcpFin => timeouts.tcp_fin,
            TimeoutClass::Tcp => timeouts.tcp,
            TimeoutClass::Udp => timeouts.udp,
            TimeoutClass::Default => timeouts.default,
        }
    }
}

/// Key identifying a session: client 5-tuple plus the VS it was opened
/// against (spec section 3 — "at most one entry" per client 5-tuple).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub client_addr: IpAddr,
    pub client_port: u16,
    pub vs: VsIdentifier,
}

impl SessionKey {
    fn digest(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Value stored per session. `last_packet` is what TTL expiry is measured
/// from (spec section 3): `expiry = last_packet + class_timeout`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionValue {
    pub real: Option<RealIdentifier>,
    pub class: Option<TimeoutClassSlot>,
    pub create_time: u32,
    pub last_packet: u32,
}

/// `TimeoutClass` with a sentinel "unset" state so `SessionValue` can carry
/// a `Default` impl for the fwmap `entry()` zero-copy path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutClassSlot(pub TimeoutClass);

impl Default for TimeoutClassSlot {
    fn default() -> Self {
        TimeoutClassSlot(TimeoutClass::Default)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionEntry {
    pub real: RealIdentifier,
    pub create_time: u32,
    pub last_packet: u32,
    pub class: TimeoutClass,
}

/// Fixed-capacity, auto-resizable session table (spec section 4.3).
pub struct SessionTable {
    map: FwMap<u64, SessionValue>,
    keys: std::collections::HashMap<u64, SessionKey>,
    capacity: usize,
    resize_in_progress: bool,
}

impl SessionTable {
    /// `capacity` is rounded up to the next power of two (spec section
    /// 4.3: "Open addressing ... capacity is rounded up to the next power
    /// of two").
    pub fn new(capacity: u32) -> Self {
        let cap = (capacity.max(1) as usize).next_power_of_two();
        Self {
            map: FwMap::new(cap, cap / 8 + 1, 8),
            keys: std::collections::HashMap::new(),
            capacity: cap,
            resize_in_progress: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn load_factor(&self, now: u32) -> f64 {
        self.live_count(now) as f64 / self.capacity as f64
    }

    pub fn live_count(&self, now: u32) -> usize {
        self.map.live_count(now)
    }

    fn timeout_seconds(class: TimeoutClass, timeouts: &crate::config::schema::SessionsTimeouts) -> u32 {
        class.seconds(timeouts)
    }

    pub fn insert(
        &mut self,
        key: SessionKey,
        real: RealIdentifier,
        class: TimeoutClass,
        now: u32,
        timeouts: &crate::config::schema::SessionsTimeouts,
    ) -> BalancerResult<()> {
        let ttl = Self::timeout_seconds(class, timeouts);
        let digest = key.digest();
        let value = SessionValue {
            real: Some(real),
            class: Some(TimeoutClassSlot(class)),
            create_time: now,
            last_packet: now,
        };
        if self.map.put(0, now, ttl, digest, value) {
            self.keys.insert(digest, key);
            Ok(())
        } else {
            Err(BalancerError::SessionTableOverflow)
        }
    }

    pub fn lookup(&self, key: &SessionKey, now: u32) -> Option<SessionEntry> {
        let digest = key.digest();
        let value = self.map.get(now, &digest)?;
        Some(SessionEntry {
            real: value.real?,
            create_time: value.create_time,
            last_packet: value.last_packet,
            class: value.class.map(|c| c.0).unwrap_or(TimeoutClass::Default),
        })
    }

    /// Refreshes `last_packet` to `now`, extending the entry's expiry by
    /// its class timeout from this instant.
    pub fn touch(
        &mut self,
        key: &SessionKey,
        now: u32,
        timeouts: &crate::config::schema::SessionsTimeouts,
    ) -> bool {
        let digest = key.digest();
        let Some(prior) = self.map.get(now, &digest).copied() else {
            return false;
        };
        let class = prior.class.map(|c| c.0).unwrap_or(TimeoutClass::Default);
        let ttl = Self::timeout_seconds(class, timeouts);
        let value = SessionValue {
            last_packet: now,
            ..prior
        };
        self.map.put(0, now, ttl, digest, value)
    }

    pub fn sweep(&mut self, now: u32) -> usize {
        let reclaimed = self.map.sweep(now);
        // Drop key-reverse-lookup entries that no longer resolve.
        let live: std::collections::HashSet<u64> =
            self.map.iter_live(now).map(|(k, ..)| *k).collect();
        self.keys.retain(|k, _| live.contains(k));
        reclaimed
    }

    /// O(live_entries): allocates fresh backing storage and rehashes every
    /// live-by-TTL entry, preserving its remaining TTL (spec section 4.3).
    /// The spec requires lookups never observe a half-rehashed table; this
    /// is modeled by building the replacement fully before swapping it in
    /// under `&mut self` — callers serialize this behind the manager's
    /// session-table write lock (spec section 5).
    pub fn resize(&mut self, new_capacity: u32, now: u32) -> BalancerResult<()> {
        if self.resize_in_progress {
            return Err(BalancerError::ResizeInProgress);
        }
        self.resize_in_progress = true;

        let cap = (new_capacity.max(1) as usize).next_power_of_two();
        let mut fresh: FwMap<u64, SessionValue> = FwMap::new(cap, cap / 8 + 1, 8);
        let mut fresh_keys = std::collections::HashMap::new();

        let live: Vec<(u64, SessionValue, u32, u32)> = self
            .map
            .iter_live(now)
            .map(|(k, v, insert_time, ttl)| (*k, *v, insert_time, ttl))
            .collect();

        for (digest, value, insert_time, ttl) in live {
            let remaining_ttl = (insert_time as u64 + ttl as u64).saturating_sub(now as u64) as u32;
            if !fresh.put(0, now, remaining_ttl.max(1), digest, value) {
                self.resize_in_progress = false;
                return Err(BalancerError::Internal(
                    "resize: fresh table rejected a live entry being rehashed".into(),
                ));
            }
            if let Some(key) = self.keys.get(&digest) {
                fresh_keys.insert(digest, *key);
            }
        }

        self.map = fresh;
        self.keys = fresh_keys;
        self.capacity = cap;
        self.resize_in_progress = false;
        Ok(())
    }

    pub fn stats(&self) -> crate::fwmap::FwMapStats {
        self.map.stats()
    }

    /// Live session entries as of `now`, used by the WLC controller to
    /// sample per-real connection counts (spec section 4.5/4.7).
    pub fn live_entries(&self, now: u32) -> impl Iterator<Item = SessionEntry> + '_ {
        self.map.iter_live(now).filter_map(|(_, v, _, _)| {
            Some(SessionEntry {
                real: v.real?,
                create_time: v.create_time,
                last_packet: v.last_packet,
                class: v.class.map(|c| c.0).unwrap_or(TimeoutClass::Default),
            })
        })
    }

    /// Live sessions paired with the original client-tuple key, used by
    /// the `sessions()` query (spec section 6) which must report the
    /// 5-tuple, not just the derived entry.
    pub fn live_entries_with_keys(&self, now: u32) -> impl Iterator<Item = (SessionKey, SessionEntry)> + '_ {
        self.map.iter_live(now).filter_map(move |(digest, v, _, _)| {
            let key = *self.keys.get(digest)?;
            Some((
                key,
                SessionEntry {
                    real: v.real?,
                    create_time: v.create_time,
                    last_packet: v.last_packet,
                    class: v.class.map(|c| c.0).unwrap_or(TimeoutClass::Default),
                },
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::SessionsTimeouts;
    use crate::ids::{L4Proto, RelativeRealIdentifier};
    use std::net::Ipv4Addr;

    fn timeouts() -> SessionsTimeouts {
        SessionsTimeouts {
            tcp_syn_ack: 10,
            tcp_syn: 20,
            tcp_fin: 15,
            tcp: 100,
            udp: 11,
            default: 19,
        }
    }

    fn vs() -> VsIdentifier {
        VsIdentifier {
            addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            port: 80,
            proto: L4Proto::Tcp,
        }
    }

    fn real() -> RealIdentifier {
        RealIdentifier {
            vs: vs(),
            real: RelativeRealIdentifier {
                addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
                port: 8080,
            },
        }
    }

    fn key() -> SessionKey {
        SessionKey {
            client_addr: IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)),
            client_port: 5000,
            vs: vs(),
        }
    }

    #[test]
    fn expiry_exact_boundary() {
        let mut table = SessionTable::new(16);
        let t = timeouts();
        table
            .insert(key(), real(), TimeoutClass::Udp, 0, &t)
            .unwrap();
        assert!(table.lookup(&key(), 10).is_some());
        assert!(table.lookup(&key(), 11).is_none());
    }

    #[test]
    fn resize_preserves_live_entries_and_ttl() {
        let mut table = SessionTable::new(4);
        let t = timeouts();
        table
            .insert(key(), real(), TimeoutClass::Tcp, 0, &t)
            .unwrap();
        table.resize(64, 5).unwrap();
        let entry = table.lookup(&key(), 5).expect("entry survives resize");
        assert_eq!(entry.real, real());
        // Original ttl=100 from t=0; at t=5, remaining ~95s, so must still
        // be alive at t=99 and dead by t=101.
        assert!(table.lookup(&key(), 99).is_some());
        assert!(table.lookup(&key(), 102).is_none());
    }

    #[test]
    fn overflow_reported_on_exhausted_table() {
        let mut table = SessionTable::new(1);
        let t = timeouts();
        let mut failed = false;
        for i in 0..64u16 {
            let k = SessionKey {
                client_addr: IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)),
                client_port: i,
                vs: vs(),
            };
            if table.insert(k, real(), TimeoutClass::Tcp, 0, &t).is_err() {
                failed = true;
                break;
            }
        }
        assert!(failed, "tiny table must eventually overflow");
    }
}
