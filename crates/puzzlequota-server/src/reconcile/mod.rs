//! Background propagation of cached counters to the durable record.
//!
//! Mutations hand `(subject, count)` jobs to [`ReconcilerHandle::dispatch`],
//! which never waits. A single worker drains the queue in order and retries
//! each job with exponential backoff before giving up. Observers can follow
//! progress through [`ReconcilerHandle::subscribe`].

mod worker;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use worker::{Reconciler, ReconcilerHandle};

/// Reconciler tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Jobs that may wait for the worker before new ones are dropped.
    pub queue_capacity: usize,

    /// Retries after the first failed attempt.
    pub max_retries: u32,

    /// Delay before the first retry; doubles on every further retry.
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

/// Progress notifications emitted by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileEvent {
    /// A write to the durable record is about to be made.
    Attempted {
        subject_id: String,
        count: u64,
        attempt: u32,
    },
    /// The durable record now holds `count`.
    Succeeded {
        subject_id: String,
        count: u64,
        attempt: u32,
    },
    /// Every attempt failed; the job was dropped.
    Abandoned {
        subject_id: String,
        count: u64,
        attempts: u32,
    },
}

impl ReconcileEvent {
    pub fn subject_id(&self) -> &str {
        match self {
            ReconcileEvent::Attempted { subject_id, .. }
            | ReconcileEvent::Succeeded { subject_id, .. }
            | ReconcileEvent::Abandoned { subject_id, .. } => subject_id,
        }
    }
}
