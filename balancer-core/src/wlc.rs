//! Weighted-Least-Connection controller (spec section 4.5). Runs in the
//! refresh loop for every VS listed in `WlcConfig.vs`; emits a batch of
//! effective-weight-only updates submitted through [`crate::real_state::RealTable::apply_wlc_update`].

use crate::error::{BalancerError, BalancerResult};
use crate::ids::RelativeRealIdentifier;
use crate::real_state::RealState;

/// One real's contribution to a WLC pass: its configured weight and the
/// live session count the refresh loop sampled for it this tick.
#[derive(Debug, Clone, Copy)]
pub struct WlcInput {
    pub real_id: RelativeRealIdentifier,
    pub configured_weight: u16,
    pub connections: u64,
}

/// An effective-weight change to apply. Absent from the batch means "no
/// change" (spec section 4.5: "Emit an update only if new_weight !=
/// current_effective_weight").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WlcUpdate {
    pub real_id: RelativeRealIdentifier,
    pub new_effective_weight: u16,
}

/// Computes the WLC batch for one VS. `current` must have one entry per
/// `inputs` entry, in the matching order — a length mismatch between the
/// config/graph/info counts sources is a programmer error and aborts the
/// tick loudly (spec section 4.5 "Failure semantics").
pub fn compute_wlc_batch(
    inputs: &[WlcInput],
    current: &[RealState],
    power: f64,
    max_real_weight: u16,
) -> BalancerResult<Vec<WlcUpdate>> {
    if inputs.len() != current.len() {
        return Err(BalancerError::Internal(format!(
            "wlc input/current length mismatch: {} vs {}",
            inputs.len(),
            current.len()
        )));
    }

    let total_weight: u64 = inputs.iter().map(|i| i.configured_weight as u64).sum();
    let total_connections: u64 = inputs.iter().map(|i| i.connections).sum();

    // Skip conditions (spec section 4.5): any zero weight, degenerate
    // total weight, or total load below the weight baseline.
    if inputs.iter().any(|i| i.configured_weight == 0) {
        return Ok(Vec::new());
    }
    if total_weight == 0 {
        return Ok(Vec::new());
    }
    if total_connections < total_weight {
        return Ok(Vec::new());
    }

    let mut updates = Vec::new();
    for (input, current_real) in inputs.iter().zip(current.iter()) {
        let scaled_conn = input.connections as f64 * total_weight as f64;
        let scaled_weight = total_connections as f64 * input.configured_weight as f64;
        let ratio = scaled_conn / scaled_weight;
        let wlc_ratio = (power * (1.0 - ratio)).max(1.0);
        let new_weight_f = (input.configured_weight as f64 * wlc_ratio).round();
        let new_weight = (new_weight_f as u64).min(max_real_weight as u64) as u16;
        let new_weight = new_weight.max(1);

        if new_weight != current_real.effective_weight {
            updates.push(WlcUpdate {
                real_id: input.real_id,
                new_effective_weight: new_weight,
            });
        }
    }

    Ok(updates)
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

    fn real(port: u16, weight: u16) -> RealState {
        RealState {
            id: rid(port),
            configured_weight: weight,
            effective_weight: weight,
            enabled: true,
        }
    }

    /// S3 from spec section 8: two reals, weight 100 each, connections
    /// 100 and 300, power=10, max=1000.
    #[test]
    fn s3_wlc_bump_scenario() {
        let inputs = vec![
            WlcInput {
                real_id: rid(1),
                configured_weight: 100,
                connections: 100,
            },
            WlcInput {
                real_id: rid(2),
                configured_weight: 100,
                connections: 300,
            },
        ];
        let current = vec![real(1, 100), real(2, 100)];
        let batch = compute_wlc_batch(&inputs, &current, 10.0, 1000).unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].real_id, rid(1));
        assert_eq!(batch[0].new_effective_weight, 500);
    }

    /// S4 from spec section 8: real0 weight 100, connections 50, plus a
    /// second real carrying the rest of a synthetic W=200/C=400 total;
    /// power=20, max=200 -> pre-cap 1500, capped at 200.
    #[test]
    fn s4_wlc_cap_scenario() {
        let inputs = vec![
            WlcInput {
                real_id: rid(1),
                configured_weight: 100,
                connections: 50,
            },
            WlcInput {
                real_id: rid(2),
                configured_weight: 100,
                connections: 350,
            },
        ];
        let current = vec![real(1, 100), real(2, 100)];
        let batch = compute_wlc_batch(&inputs, &current, 20.0, 200).unwrap();
        let real0 = batch.iter().find(|u| u.real_id == rid(1)).expect("real0 updated");
        assert_eq!(real0.new_effective_weight, 200);
    }

    #[test]
    fn skips_when_total_load_below_baseline() {
        let inputs = vec![WlcInput {
            real_id: rid(1),
            configured_weight: 100,
            connections: 10,
        }];
        let current = vec![real(1, 100)];
        let batch = compute_wlc_batch(&inputs, &current, 10.0, 1000).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn skips_on_zero_weight() {
        let inputs = vec![WlcInput {
            real_id: rid(1),
            configured_weight: 0,
            connections: 10,
        }];
        let current = vec![real(1, 0)];
        let batch = compute_wlc_batch(&inputs, &current, 10.0, 1000).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn length_mismatch_is_internal_error() {
        let inputs = vec![WlcInput {
            real_id: rid(1),
            configured_weight: 100,
            connections: 10,
        }];
        let current: Vec<RealState> = vec![];
        assert!(matches!(
            compute_wlc_batch(&inputs, &current, 10.0, 1000),
            Err(BalancerError::Internal(_))
        ));
    }

    #[test]
    fn never_zero_minimum_one() {
        // effective weight is always >= 1 even under extreme down-scaling.
        let inputs = vec![WlcInput {
            real_id: rid(1),
            configured_weight: 100,
            connections: 100_000,
        }];
        let current = vec![real(1, 100)];
        let batch = compute_wlc_batch(&inputs, &current, 0.01, 1000).unwrap();
        assert!(batch.iter().all(|u| u.new_effective_weight >= 1));
    }
}
