//! Fast key-value cache for quota counters and validated principals.
//!
//! ## Modes
//!
//! - **Local (DashMap)**: In-memory, per-instance
//! - **Redis**: Shared across instances, keys expire server-side
//!
//! ## Graceful Degradation
//!
//! If Redis is disabled or unreachable at startup, the server falls back
//! to local mode.

pub mod backend;
pub mod principal;

pub use backend::{CacheBackend, CacheError, CacheStats, CachedEntry};
pub use principal::{KvPrincipalCache, PRINCIPAL_KEY_PREFIX};
