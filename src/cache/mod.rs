//! Grading Result Cache
//!
//! Deduplicates identical submissions so literal resubmissions and client
//! retries do not reach the metered execution service twice. Entries are
//! keyed on the exact submission tuple, not on semantic equivalence.

pub mod config;
pub mod key;
pub mod result_cache;

pub use config::CacheConfig;
pub use key::{cache_key, request_key};
pub use result_cache::ResultCache;
