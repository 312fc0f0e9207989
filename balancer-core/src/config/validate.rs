//! CREATE validation (spec section 4.2).
//!
//! Runs against a fully resolved [`BalancerManagerConfig`] — both a brand
//! new CREATE and the result of an UPDATE merge are validated the same way
//! before being allowed to commit.

use crate::config::schema::*;
use crate::error::{BalancerError, BalancerResult};
use crate::ids::VsIdentifier;
use std::collections::HashSet;

pub fn validate(config: &BalancerManagerConfig) -> BalancerResult<()> {
    validate_timeouts(&config.packet_handler.sessions_timeouts)?;
    validate_vs_list(&config.packet_handler.vs)?;
    validate_state(&config.state, &config.packet_handler.vs)?;
    Ok(())
}

/// CREATE-only presence check (spec section 4.2): a CREATE patch that omits
/// `packet_handler`, its `sessions_timeouts`, `source_v4`, `source_v6`, or
/// `decap_addresses` is rejected outright rather than silently zero-filled
/// by merging against [`crate::config::merge::empty_prior`]. UPDATE never
/// calls this — an UPDATE patch omitting a field means "leave it as is",
/// which is exactly what the merge already does.
pub fn validate_create_presence(patch: &BalancerConfigPatch) -> BalancerResult<()> {
    let Some(ph) = &patch.packet_handler else {
        return Err(BalancerError::InvalidConfig(
            "create requires packet_handler".into(),
        ));
    };

    let Some(timeouts) = &ph.sessions_timeouts else {
        return Err(BalancerError::InvalidConfig(
            "create requires packet_handler.sessions_timeouts".into(),
        ));
    };
    for (name, v) in [
        ("tcp_syn_ack", timeouts.tcp_syn_ack),
        ("tcp_syn", timeouts.tcp_syn),
        ("tcp_fin", timeouts.tcp_fin),
        ("tcp", timeouts.tcp),
        ("udp", timeouts.udp),
        ("default", timeouts.default),
    ] {
        if v.is_none() {
            return Err(BalancerError::InvalidConfig(format!(
                "create requires packet_handler.sessions_timeouts.{name}"
            )));
        }
    }
    if ph.source_v4.is_none() {
        return Err(BalancerError::InvalidConfig(
            "create requires packet_handler.source_v4".into(),
        ));
    }
    if ph.source_v6.is_none() {
        return Err(BalancerError::InvalidConfig(
            "create requires packet_handler.source_v6".into(),
        ));
    }
    if ph.decap_addresses.is_none() {
        return Err(BalancerError::InvalidConfig(
            "create requires packet_handler.decap_addresses".into(),
        ));
    }

    Ok(())
}

fn validate_timeouts(t: &SessionsTimeouts) -> BalancerResult<()> {
    for (name, v) in [
        ("tcp_syn_ack", t.tcp_syn_ack),
        ("tcp_syn", t.tcp_syn),
        ("tcp_fin", t.tcp_fin),
        ("tcp", t.tcp),
        ("udp", t.udp),
        ("default", t.default),
    ] {
        if v > MAX_TIMEOUT_SECONDS {
            return Err(BalancerError::InvalidConfig(format!(
                "timeout class {name} = {v}s exceeds {MAX_TIMEOUT_SECONDS}s"
            )));
        }
    }
    Ok(())
}

fn validate_vs_list(vs_list: &[VirtualService]) -> BalancerResult<()> {
    let mut seen: HashSet<VsIdentifier> = HashSet::new();
    for vs in vs_list {
        if !seen.insert(vs.id) {
            return Err(BalancerError::InvalidConfig(format!(
                "duplicate vs identifier {}",
                vs.id
            )));
        }

        if vs.flags.contains(VsFlags::PURE_L3) && vs.id.port != 0 {
            return Err(BalancerError::InvalidConfig(format!(
                "vs {} has PureL3 set but port != 0",
                vs.id
            )));
        }

        if vs.reals.is_empty() {
            tracing::debug!(vs = %vs.id, "vs configured with no reals");
        }

        let mut real_ids = HashSet::new();
        for real in &vs.reals {
            if !real_ids.insert(real.id) {
                return Err(BalancerError::InvalidConfig(format!(
                    "vs {} has duplicate real {}",
                    vs.id, real.id
                )));
            }
            if real.weight == 0 {
                return Err(BalancerError::InvalidConfig(format!(
                    "real {} in vs {} has weight 0",
                    real.id, vs.id
                )));
            }
            if real.weight > MAX_REAL_WEIGHT_CEILING {
                return Err(BalancerError::InvalidConfig(format!(
                    "real {} in vs {} weight {} exceeds ceiling {}",
                    real.id, vs.id, real.weight, MAX_REAL_WEIGHT_CEILING
                )));
            }
            let expect_len = if real.src_addr.is_v4() { 4 } else { 16 };
            if real.src_mask.len() != expect_len {
                return Err(BalancerError::InvalidConfig(format!(
                    "real {} in vs {} src_mask length {} does not match address family",
                    real.id,
                    vs.id,
                    real.src_mask.len()
                )));
            }
        }
    }
    Ok(())
}

fn validate_state(state: &StateConfig, vs_list: &[VirtualService]) -> BalancerResult<()> {
    let any_wlc_vs = vs_list.iter().any(|v| v.flags.contains(VsFlags::WLC));

    if any_wlc_vs && state.wlc.is_none() {
        return Err(BalancerError::InvalidConfig(
            "vs has Wlc flag set but no wlc config provided".into(),
        ));
    }

    // Interdependency rule: refresh_period>0, max_load_factor, wlc block —
    // all three or none.
    let has_refresh = state.refresh_period > 0;
    let has_load_factor = state.session_table_max_load_factor > 0.0;
    let has_wlc = state.wlc.is_some();
    let present = [has_refresh, has_load_factor, has_wlc];
    let present_count = present.iter().filter(|p| **p).count();
    if present_count != 0 && present_count != 3 {
        return Err(BalancerError::InvalidConfig(format!(
            "refresh_period, max_load_factor and wlc must be all-present or all-absent \
             (refresh_period>0: {has_refresh}, max_load_factor: {has_load_factor}, wlc: {has_wlc})"
        )));
    }

    if !(0.0..=1.0).contains(&state.session_table_max_load_factor) {
        return Err(BalancerError::InvalidConfig(format!(
            "max_load_factor {} out of range 0..1",
            state.session_table_max_load_factor
        )));
    }

    if state.session_table_capacity == 0 {
        return Err(BalancerError::InvalidConfig(
            "session_table_capacity must be > 0".into(),
        ));
    }

    if let Some(wlc) = &state.wlc {
        if wlc.max_weight == 0 {
            return Err(BalancerError::InvalidConfig(
                "wlc.max_weight must be > 0".into(),
            ));
        }
        for idx in &wlc.vs {
            if *idx as usize >= vs_list.len() {
                return Err(BalancerError::InvalidConfig(format!(
                    "wlc.vs references vs index {idx} but only {} vses configured",
                    vs_list.len()
                )));
            }
        }
        if state.refresh_period == 0 && !wlc.vs.is_empty() {
            return Err(BalancerError::InvalidConfig(
                "wlc.vs is non-empty but refresh_period is 0".into(),
            ));
        }
    }

    Ok(())
}
