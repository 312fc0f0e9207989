//! Wire contract for the balancer manager control surface (spec.md
//! section 6). Described there as "wire-compatible with the existing
//! protobuf", expressed here as a JSON envelope over `balancer-core`'s
//! types rather than generated protobuf bindings — see `build.rs` for why.

pub mod envelope;

pub use envelope::{Request, Response, RpcError};
