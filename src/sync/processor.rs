use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::json;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;
use crate::config::SyncConfig;
use crate::record::{EventId, EventKind, EventRecord};
use crate::error::SinkError;

use super::backoff::{RetryGate, RetryPolicy};
use super::sink::RemoteEventSink;

/// Why a sync attempt did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    EmptyQueue,
    InFlight,
    Backoff { retry_in: Duration },
    CircuitOpen { retry_in: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped(SkipReason),
    Delivered { events: usize, batches: usize },
    /// Delivery stopped at a failed batch; `delivered` records from earlier
    /// batches were confirmed and cleared.
    Failed { delivered: usize, error: SinkError },
}

/// Statistics from the background sync loop.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub attempts: usize,
    pub skipped: usize,
    pub events_delivered: usize,
    pub failures: usize,
}

impl SyncStats {
    fn record(&mut self, outcome: &SyncOutcome) {
        self.attempts += 1;
        match outcome {
            SyncOutcome::Skipped(_) => self.skipped += 1,
            SyncOutcome::Delivered { events, .. } => self.events_delivered += events,
            SyncOutcome::Failed { delivered, .. } => {
                self.events_delivered += delivered;
                self.failures += 1;
            }
        }
    }
}

/// Clears the in-flight flag however the attempt ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drains the bus's durable queue to a remote sink.
///
/// At most one attempt runs at a time; a trigger that arrives while one is in
/// flight is dropped, not queued.
pub struct SyncProcessor {
    bus: EventBus,
    sink: Arc<dyn RemoteEventSink>,
    config: SyncConfig,
    in_flight: AtomicBool,
    policy: Mutex<RetryPolicy>,
}

impl SyncProcessor {
    /// An invalid `config` is logged and used as-is: a zero interval ticks
    /// every millisecond and a zero batch size sends one record per batch.
    pub fn new(bus: EventBus, sink: Arc<dyn RemoteEventSink>, config: SyncConfig) -> Self {
        if let Err(err) = config.validate() {
            warn!(error = %err, "sync config is invalid; clamping");
        }
        let policy = RetryPolicy::new(&config);
        SyncProcessor {
            bus,
            sink,
            config,
            in_flight: AtomicBool::new(false),
            policy: Mutex::new(policy),
        }
    }

    /// Replace the retry policy (e.g. one without jitter).
    pub fn with_policy(self, policy: RetryPolicy) -> Self {
        SyncProcessor {
            policy: Mutex::new(policy),
            ..self
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn policy(&self) -> std::sync::MutexGuard<'_, RetryPolicy> {
        self.policy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one sync attempt.
    ///
    /// Only records queued when the attempt starts are sent, in id order and
    /// in batches of `batch_size`; each confirmed batch is removed from the
    /// queue before the next is sent.
    pub async fn sync_now(&self) -> SyncOutcome {
        if !self.bus.is_online() {
            return SyncOutcome::Skipped(SkipReason::Offline);
        }
        let Some(through) = self.bus.newest_queued_id() else {
            return SyncOutcome::Skipped(SkipReason::EmptyQueue);
        };

        let gate = self.policy().check(Instant::now());
        match gate {
            RetryGate::Ready => {}
            RetryGate::Backoff { retry_in } => {
                return SyncOutcome::Skipped(SkipReason::Backoff { retry_in })
            }
            RetryGate::CircuitOpen { retry_in } => {
                return SyncOutcome::Skipped(SkipReason::CircuitOpen { retry_in })
            }
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("sync already in flight; trigger coalesced");
            return SyncOutcome::Skipped(SkipReason::InFlight);
        }
        let _in_flight = InFlight(&self.in_flight);

        self.bus.emit_status(
            EventKind::SyncStarted,
            json!({ "queued": self.bus.queued_len() }),
        );

        let outcome = self.drain(through).await;
        match &outcome {
            SyncOutcome::Delivered { events, batches } => {
                self.policy().record_success();
                info!(events, batches, "sync completed");
                self.bus.emit_status(
                    EventKind::SyncCompleted,
                    json!({ "delivered": events, "batches": batches, "remaining": self.bus.queued_len() }),
                );
            }
            SyncOutcome::Failed { delivered, error } => {
                let (attempt, retry_in) = {
                    let mut policy = self.policy();
                    let retry_in = policy.record_failure(Instant::now());
                    (policy.consecutive_failures(), retry_in)
                };
                warn!(error = %error, attempt, delivered, retry_in_ms = retry_in.as_millis() as u64, "sync failed");
                self.bus.emit_status(
                    EventKind::SyncFailed,
                    json!({
                        "error": error.to_string(),
                        "attempt": attempt,
                        "delivered": delivered,
                        "retryInMs": retry_in.as_millis() as u64,
                    }),
                );
            }
            SyncOutcome::Skipped(_) => {}
        }
        outcome
    }

    async fn drain(&self, through: EventId) -> SyncOutcome {
        let batch_size = self.config.batch_size.max(1);
        let mut delivered = 0;
        let mut batches = 0;

        loop {
            let batch = self.bus.pending_batch(batch_size, through);
            if batch.is_empty() {
                break;
            }

            if let Err(error) = self.sink.deliver(&batch).await {
                return SyncOutcome::Failed { delivered, error };
            }

            let ids: Vec<EventId> = batch.iter().map(EventRecord::id).collect();
            self.bus.acknowledge(&ids);
            delivered += batch.len();
            batches += 1;
            debug!(batch = batches, events = batch.len(), "batch delivered");

            if !self.bus.is_online() {
                break;
            }
        }

        SyncOutcome::Delivered {
            events: delivered,
            batches,
        }
    }

    /// Run the periodic loop on the current tokio runtime.
    ///
    /// Attempts fire on every `interval` tick and whenever the bus wakes the
    /// processor (an emit while online, or a transition to online).
    pub fn spawn(self: Arc<Self>) -> SyncHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let wake = self.bus.sync_wake();
        let processor = Arc::clone(&self);

        let handle = tokio::spawn(async move {
            let mut stats = SyncStats::default();
            let mut ticker = time::interval(processor.config.interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {}
                    _ = wake.notified() => {}
                }
                let outcome = processor.sync_now().await;
                stats.record(&outcome);
            }

            stats
        });

        SyncHandle {
            processor: self,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }
}

/// Handle to a running sync loop.
pub struct SyncHandle {
    processor: Arc<SyncProcessor>,
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<SyncStats>>,
}

impl SyncHandle {
    pub fn processor(&self) -> &Arc<SyncProcessor> {
        &self.processor
    }

    /// Ask the loop for an attempt now. Ignored if one is running.
    pub fn trigger(&self) {
        self.processor.bus.sync_wake().notify_waiters();
    }

    /// Stop the loop, wait for it to finish, and return its statistics.
    pub async fn shutdown(mut self) -> SyncStats {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        let Some(handle) = self.handle.take() else {
            return SyncStats::default();
        };
        match handle.await {
            Ok(stats) => stats,
            Err(err) => {
                error!(error = %err, "sync loop terminated abnormally");
                SyncStats::default()
            }
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
    }
}
