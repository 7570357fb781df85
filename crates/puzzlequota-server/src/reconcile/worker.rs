use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::{ReconcileConfig, ReconcileEvent};
use crate::quota::DurableCounter;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
struct ReconcileJob {
    subject_id: String,
    count: u64,
}

/// Sending side of the reconciler. Cheap to clone.
#[derive(Clone)]
pub struct ReconcilerHandle {
    jobs: mpsc::Sender<ReconcileJob>,
    events: broadcast::Sender<ReconcileEvent>,
}

impl ReconcilerHandle {
    /// Queues a durable write of `count` for `subject_id` without waiting.
    ///
    /// When the queue is full or the worker is gone the job is dropped and a
    /// warning is logged; the cache keeps the value either way.
    pub fn dispatch(&self, subject_id: &str, count: u64) {
        let job = ReconcileJob {
            subject_id: subject_id.to_string(),
            count,
        };

        match self.jobs.try_send(job) {
            Ok(()) => {
                tracing::trace!(subject = %subject_id, count, "reconcile job queued");
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!(subject = %job.subject_id, count = job.count, "Reconcile queue full, dropping job");
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                tracing::warn!(subject = %job.subject_id, count = job.count, "Reconciler stopped, dropping job");
            }
        }
    }

    /// Subscribes to worker progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<ReconcileEvent> {
        self.events.subscribe()
    }
}

/// The background worker.
pub struct Reconciler {
    durable: Arc<dyn DurableCounter>,
    config: ReconcileConfig,
    events: broadcast::Sender<ReconcileEvent>,
}

impl Reconciler {
    /// Starts the worker on the current runtime and returns its handle.
    ///
    /// The worker exits once every handle has been dropped and the queue
    /// is drained.
    pub fn spawn(durable: Arc<dyn DurableCounter>, config: ReconcileConfig) -> ReconcilerHandle {
        let (handle, _task) = Self::spawn_with_task(durable, config);
        handle
    }

    pub(crate) fn spawn_with_task(
        durable: Arc<dyn DurableCounter>,
        config: ReconcileConfig,
    ) -> (ReconcilerHandle, JoinHandle<()>) {
        let (jobs_tx, jobs_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let worker = Reconciler {
            durable,
            config,
            events: events_tx.clone(),
        };
        let task = tokio::spawn(worker.run(jobs_rx));

        (
            ReconcilerHandle {
                jobs: jobs_tx,
                events: events_tx,
            },
            task,
        )
    }

    async fn run(self, mut jobs: mpsc::Receiver<ReconcileJob>) {
        tracing::debug!(
            max_retries = self.config.max_retries,
            "Reconcile worker started"
        );

        while let Some(job) = jobs.recv().await {
            self.process(job).await;
        }

        tracing::debug!("Reconcile worker stopped");
    }

    async fn process(&self, job: ReconcileJob) {
        let attempts = self.config.max_retries.saturating_add(1);

        for attempt in 1..=attempts {
            self.emit(ReconcileEvent::Attempted {
                subject_id: job.subject_id.clone(),
                count: job.count,
                attempt,
            });

            match self.durable.store(&job.subject_id, job.count).await {
                Ok(()) => {
                    tracing::debug!(subject = %job.subject_id, count = job.count, attempt, "Durable counter updated");
                    self.emit(ReconcileEvent::Succeeded {
                        subject_id: job.subject_id,
                        count: job.count,
                        attempt,
                    });
                    return;
                }
                Err(e) if attempt < attempts && !e.is_permanent() => {
                    let delay = backoff(self.config.initial_backoff, attempt);
                    tracing::debug!(
                        subject = %job.subject_id,
                        attempt,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Durable counter update failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::warn!(
                        subject = %job.subject_id,
                        count = job.count,
                        attempt,
                        permanent = e.is_permanent(),
                        error = %e,
                        "Durable counter update abandoned"
                    );
                    self.emit(ReconcileEvent::Abandoned {
                        subject_id: job.subject_id,
                        count: job.count,
                        attempts: attempt,
                    });
                    return;
                }
            }
        }
    }

    fn emit(&self, event: ReconcileEvent) {
        // No subscribers is the normal case outside tests.
        let _ = self.events.send(event);
    }
}

/// Delay before retry number `attempt` (1-based).
fn backoff(initial: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    initial.saturating_mul(factor)
}
