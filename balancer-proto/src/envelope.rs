//! Request/response envelope for every operation the control surface
//! exposes (spec.md section 6): manager lifecycle, per-real updates,
//! session table resize, and the four read-only queries.
//!
//! Each [`Request`] variant carries exactly the arguments its
//! `balancer-core` counterpart takes; each [`Response`] variant carries
//! exactly what that operation returns. A transport (REST, a CLI, a test
//! harness) only needs to get a `Request` in and a `Response` or
//! [`RpcError`] out — nothing here assumes HTTP.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use balancer_core::config::schema::{BalancerConfigPatch, BalancerManagerConfig, RealUpdate};
use balancer_core::error::BalancerError;
use balancer_core::query::{BalancerGraph, BalancerInfo, SessionIdentifier, SessionInfo};
use balancer_core::stats::CountersSnapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "args")]
pub enum Request {
    NewManager {
        name: String,
        config: BalancerConfigPatch,
    },
    UpdateManager {
        name: String,
        config: BalancerConfigPatch,
        now: u32,
    },
    DeleteManager {
        name: String,
    },
    ResizeSessionTable {
        name: String,
        new_capacity: u32,
        now: u32,
    },
    UpdateReals {
        name: String,
        updates: Vec<RealUpdate>,
    },
    Config {
        name: String,
    },
    Info {
        name: String,
        now: u32,
    },
    Sessions {
        name: String,
        now: u32,
    },
    Stats {
        name: String,
    },
    Graph {
        name: String,
    },
    ListManagers,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", content = "value")]
pub enum Response {
    Ok,
    Config(BalancerManagerConfig),
    Info(BalancerInfo),
    Sessions(Vec<(SessionIdentifier, SessionInfo)>),
    Stats(CountersSnapshot),
    Graph(BalancerGraph),
    Managers(Vec<String>),
}

/// Wire form of [`BalancerError`]. Kept as a distinct type (rather than
/// reusing `BalancerError` directly over serde) so the wire contract
/// doesn't silently change shape if the core error enum grows a variant
/// with non-serializable payload later.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum RpcError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("duplicate: {0}")]
    Duplicate(String),
    #[error("session table overflow")]
    SessionTableOverflow,
    #[error("no reals available for vs {0}")]
    NoRealsAvailable(String),
    #[error("resize already in progress")]
    ResizeInProgress,
    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl From<BalancerError> for RpcError {
    fn from(e: BalancerError) -> Self {
        match e {
            BalancerError::InvalidConfig(s) => RpcError::InvalidConfig(s),
            BalancerError::NotFound(s) => RpcError::NotFound(s),
            BalancerError::Duplicate(s) => RpcError::Duplicate(s),
            BalancerError::SessionTableOverflow => RpcError::SessionTableOverflow,
            BalancerError::NoRealsAvailable(s) => RpcError::NoRealsAvailable(s),
            BalancerError::ResizeInProgress => RpcError::ResizeInProgress,
            BalancerError::Internal(s) => RpcError::Internal(s),
        }
    }
}

pub type RpcResult<T> = Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrips_through_json() {
        let req = Request::DeleteManager {
            name: "b0".into(),
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: Request = serde_json::from_str(&json).unwrap();
        match back {
            Request::DeleteManager { name } => assert_eq!(name, "b0"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn error_conversion_preserves_message() {
        let core_err = BalancerError::NotFound("b0".into());
        let wire_err: RpcError = core_err.into();
        assert_eq!(wire_err, RpcError::NotFound("b0".into()));
    }
}
