//! Refresh loop (spec section 4.7): a single-threaded cooperative task
//! per manager, ticking at `refresh_period` ms. Grounded in the teacher's
//! `knhk-sidecar::beat_admission` tick-driven task shape (a `tokio::time::interval`
//! loop that samples state and reacts, rather than a bespoke thread/timer).

use std::sync::Arc;
use std::time::Duration;

use crate::error::BalancerResult;
use crate::manager::Manager;

/// Drives [`Manager::refresh_tick`] at the manager's configured
/// `refresh_period`. Exits immediately if `refresh_period == 0` (spec
/// section 4.7: "none of the above runs"), so callers can spawn this
/// unconditionally per manager without checking first.
pub async fn run_refresh_loop(manager: Arc<Manager>, now_fn: impl Fn() -> u32 + Send + 'static) {
    let period_ms = manager.config().state.refresh_period;
    if period_ms == 0 {
        return;
    }

    let mut interval = tokio::time::interval(Duration::from_millis(period_ms));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let now = now_fn();
        if let Err(e) = manager.refresh_tick(now) {
            if e.is_fatal() {
                tracing::error!(manager = manager.name(), error = %e, "refresh tick aborted: invariant violation");
                manager.set_last_error(e.to_string());
            } else {
                tracing::warn!(manager = manager.name(), error = %e, "refresh tick returned an error");
            }
        }

        // Re-read the period each tick: an UPDATE may have changed it (or
        // disabled refresh entirely by racing it to zero, though config
        // validation never allows that transition mid-flight without a
        // matching wlc/load-factor change — see spec section 4.2).
        let current_period = manager.config().state.refresh_period;
        if current_period == 0 {
            break;
        }
        if current_period != period_ms {
            interval = tokio::time::interval(Duration::from_millis(current_period));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        }
    }
}

/// One-shot tick, exposed for tests and for callers that drive their own
/// scheduling instead of spawning [`run_refresh_loop`].
pub fn tick_once(manager: &Manager, now: u32) -> BalancerResult<()> {
    manager.refresh_tick(now)
}
