//! Per-user puzzle quota.
//!
//! The fast cache holds the working counter under `{key_prefix}:{subject}`.
//! The provider's custom data is the durable record; it is read only when
//! `read` finds the cache cold and is otherwise updated in the background
//! by the reconciler.

mod durable;
mod error;
mod store;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use durable::{CustomDataCounter, DurableCounter, count_from_value};
pub use error::{EXHAUSTED_MESSAGE, QuotaError};
pub use store::QuotaStore;

/// Quota configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Balance granted to a subject with no durable record.
    pub default_count: u64,

    /// Lifetime of a cached counter, refreshed on every write.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Custom-data field holding the durable counter.
    pub field: String,

    /// Cache key namespace for counters.
    pub key_prefix: String,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            default_count: 1,
            ttl: Duration::from_secs(30 * 24 * 60 * 60),
            field: "puzzleCount".to_string(),
            key_prefix: "puzzleCount".to_string(),
        }
    }
}
