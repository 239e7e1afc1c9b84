//! Rate Limiting Module
//!
//! Per-user admission control for grading requests over two concurrent
//! windows: a lazily rolled daily window and a sliding minute window.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 UsageTracker                  │
//! │     RwLock<HashMap<user id, UsageRecord>>     │
//! ├──────────────────────────────────────────────┤
//! │  ┌──────────────────┐  ┌──────────────────┐  │
//! │  │ daily count +    │  │ recent request   │  │
//! │  │ window start     │  │ timestamp log    │  │
//! │  └──────────────────┘  └──────────────────┘  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! There is no background sweeper: rollover and pruning happen when a
//! record is read or written.

pub mod config;
pub mod tracker;
pub mod usage;

pub use config::RateLimitConfig;
pub use tracker::UsageTracker;
pub use usage::{Admission, UsageRecord};
