//! Scheduler-visible per-real state (spec section 3 `RealState`) and the
//! per-VS ordered real registry (spec section 4.6 "Real Updates").
//!
//! Two distinct write paths touch this table with different semantics:
//! [`RealTable::apply_admin_update`] (administrative — writes both
//! configured and effective weight) and [`RealTable::apply_wlc_update`]
//! (WLC — effective weight only, must never move configured weight or
//! `enabled`). Keeping them as separate methods, rather than one update
//! path with a flag, is deliberate: it makes the "WLC must not touch
//! configured weight" invariant (spec section 4.5) a type-level fact
//! instead of a runtime check callers could get wrong.

use crate::config::schema::{DONT_UPDATE_ENABLED, DONT_UPDATE_WEIGHT};
use crate::error::{BalancerError, BalancerResult};
use crate::ids::RelativeRealIdentifier;
use serde::{Deserialize, Serialize};

/// One real as the scheduler and WLC controller see it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RealState {
    pub id: RelativeRealIdentifier,
    pub configured_weight: u16,
    pub effective_weight: u16,
    pub enabled: bool,
}

/// Per-VS ordered set of reals. Order is significant (spec section 3): the
/// WLC enable set and round-robin cursor both reference reals by position.
#[derive(Debug, Clone, Default)]
pub struct RealTable {
    reals: Vec<RealState>,
}

impl RealTable {
    pub fn from_configs(configs: &[crate::config::schema::RealConfig]) -> Self {
        let reals = configs
            .iter()
            .map(|c| RealState {
                id: c.id,
                configured_weight: c.weight,
                effective_weight: c.weight,
                enabled: true,
            })
            .collect();
        Self { reals }
    }

    pub fn as_slice(&self) -> &[RealState] {
        &self.reals
    }

    pub fn find(&self, id: RelativeRealIdentifier) -> Option<&RealState> {
        self.reals.iter().find(|r| r.id == id)
    }

    fn find_mut(&mut self, id: RelativeRealIdentifier) -> Option<&mut RealState> {
        self.reals.iter_mut().find(|r| r.id == id)
    }

    /// Administrative path (spec section 4.6): writes BOTH configured and
    /// effective weight, and may flip `enabled`. `DontUpdateWeight` /
    /// `DontUpdateEnabled` leave the respective field untouched.
    pub fn apply_admin_update(
        &mut self,
        real_id: RelativeRealIdentifier,
        weight: u16,
        enable: u8,
    ) -> BalancerResult<()> {
        let real = self
            .find_mut(real_id)
            .ok_or_else(|| BalancerError::NotFound(format!("real {real_id}")))?;
        if weight != DONT_UPDATE_WEIGHT {
            real.configured_weight = weight;
            real.effective_weight = weight;
        }
        if enable != DONT_UPDATE_ENABLED {
            real.enabled = enable != 0;
        }
        Ok(())
    }

    /// WLC path (spec section 4.5): effective weight only. Validation
    /// mirrors the sentinel contract — callers must supply a real weight
    /// and must use `DontUpdateEnabled` for `enable`.
    pub fn apply_wlc_update(&mut self, real_id: RelativeRealIdentifier, new_weight: u16) -> BalancerResult<()> {
        if new_weight == DONT_UPDATE_WEIGHT {
            return Err(BalancerError::Internal(
                "wlc update path requires a concrete weight".into(),
            ));
        }
        let real = self
            .find_mut(real_id)
            .ok_or_else(|| BalancerError::NotFound(format!("real {real_id}")))?;
        real.effective_weight = new_weight;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::IpAddr;
    use std::net::Ipv4Addr;

    fn rid(port: u16) -> RelativeRealIdentifier {
        RelativeRealIdentifier {
            addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            port,
        }
    }

    fn table() -> RealTable {
        RealTable {
            reals: vec![RealState {
                id: rid(8080),
                configured_weight: 100,
                effective_weight: 100,
                enabled: true,
            }],
        }
    }

    #[test]
    fn admin_update_writes_both_weights() {
        let mut t = table();
        t.apply_admin_update(rid(8080), 50, DONT_UPDATE_ENABLED).unwrap();
        let r = t.find(rid(8080)).unwrap();
        assert_eq!(r.configured_weight, 50);
        assert_eq!(r.effective_weight, 50);
    }

    #[test]
    fn wlc_update_leaves_configured_weight_alone() {
        let mut t = table();
        t.apply_wlc_update(rid(8080), 500).unwrap();
        let r = t.find(rid(8080)).unwrap();
        assert_eq!(r.configured_weight, 100);
        assert_eq!(r.effective_weight, 500);
    }

    #[test]
    fn admin_disable_does_not_touch_weight() {
        let mut t = table();
        t.apply_admin_update(rid(8080), DONT_UPDATE_WEIGHT, 0).unwrap();
        let r = t.find(rid(8080)).unwrap();
        assert!(!r.enabled);
        assert_eq!(r.configured_weight, 100);
    }
}
