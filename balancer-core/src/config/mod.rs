//! Configuration engine (spec section 4.2): schema, CREATE validation, and
//! UPDATE merge.

pub mod merge;
pub mod schema;
pub mod validate;
