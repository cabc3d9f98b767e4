//! Market Data Relay
//!
//! Relays a continuous stream of market events (price ticks, buy/sell order
//! counts) from one upstream bus topic to every connected real-time client,
//! and answers historical range queries that merge independently-sampled
//! series into one time-aligned record set.
//!
//! # Architecture
//!
//! ```text
//!  Upstream bus topic                 HTTP history request
//!        │                                    │
//!   ┌────▼────┐                        ┌──────▼──────┐
//!   │  Relay  │  ← decode, per-key     │HistoryService│ ← timeout, fail closed
//!   └────┬────┘    isolation           └──────┬──────┘
//!        │                                    │
//!   ┌────▼────┐                        ┌──────▼──────┐
//!   │ History │  ← coalesce / cap 10   │ TimeSeries  │
//!   │  Store  │                        │  Backend    │
//!   └────┬────┘                        └──────┬──────┘
//!        │                                    │
//!   ┌────▼────────┐                     ┌─────▼─────┐
//!   │  Registry   │ ← bounded queues    │   Merge   │
//!   │ (broadcast) │                     └───────────┘
//!   └─────────────┘
//! ```

pub mod backpressure;
pub mod bus;
pub mod events;
pub mod history;
pub mod merge;
pub mod query;
pub mod registry;
pub mod relay;
pub mod timeseries;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
