//! Types library for the market data relay
//!
//! This library provides the core type definitions shared between the relay
//! core and the gateway, so the sparse-merge contract and the live update
//! envelope are checked by the compiler rather than by convention.
//!
//! # Modules
//! - `ids`: Unique identifiers (ConnectionId)
//! - `series`: Labeled time-series samples and label filters
//! - `record`: Sparse merged records produced by the merge engine
//! - `update`: Keyed live updates carried on the upstream bus
//! - `range`: Query time bounds
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod series;
pub mod record;
pub mod update;
pub mod range;
pub mod errors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::series::*;
    pub use crate::record::*;
    pub use crate::update::*;
    pub use crate::range::*;
    pub use crate::errors::*;
}
