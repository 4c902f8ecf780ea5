//! Refresh scheduling for the key cache.
//!
//! A single background task owns the refresh cadence. It wakes when the next
//! refresh is due or when a lookup miss requested one, fetches and
//! materializes the key set, and installs the result as a new snapshot.
//!
//! # Failure policy
//!
//! - The first load is fail-closed: the provider is not constructed without it.
//! - Later failures are fail-open: the previous snapshot keeps serving and the
//!   next attempt is due after the minimum interval instead of the
//!   steady-state interval.
//!
//! Cycles never overlap. The cache lock is only taken for the final swap.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cache::{KeyCache, KeySnapshot};
use crate::config::RefreshPolicy;
use crate::error::{AuthError, Result};
use crate::fetch::KeySetSource;
use crate::materialize::materialize_document;

/// Hook for refresh outcomes, in addition to the built-in `tracing` events.
pub trait RefreshObserver: Send + Sync {
    /// A snapshot with `key_count` keys was installed as `generation`.
    fn on_refresh_success(&self, _generation: u64, _key_count: usize) {}

    /// A refresh failed; the previous snapshot (if any) is still served.
    fn on_refresh_failure(&self, _error: &AuthError, _consecutive_failures: u32) {}

    /// A key-set entry could not be materialized and was left out.
    fn on_key_skipped(&self, _error: &AuthError) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RefreshObserver for NoopObserver {}

/// What started a refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// The load performed during construction.
    Initial,
    /// The steady-state (or retry) timer elapsed.
    Scheduled,
    /// A lookup miss asked for an early refresh.
    Requested,
    /// An operator forced a refresh.
    Forced,
}

impl RefreshTrigger {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Scheduled => "scheduled",
            Self::Requested => "requested",
            Self::Forced => "forced",
        }
    }
}

#[derive(Debug)]
struct RefreshState {
    last_attempt: Option<Instant>,
    next_refresh_at: Instant,
    consecutive_failures: u32,
    in_flight: bool,
    pending_request: bool,
    generation: u64,
}

/// Point-in-time view of the scheduler's bookkeeping.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RefreshStats {
    pub next_refresh_at: Instant,
    pub consecutive_failures: u32,
    pub in_flight: bool,
}

/// Clears the in-flight flag even if the cycle future is dropped mid-fetch.
struct InFlightGuard<'a>(&'a Mutex<RefreshState>);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().in_flight = false;
    }
}

pub(crate) struct RefreshScheduler {
    source: Arc<dyn KeySetSource>,
    cache: KeyCache,
    policy: RefreshPolicy,
    state: Mutex<RefreshState>,
    cycle_lock: tokio::sync::Mutex<()>,
    wakeup: Notify,
    reschedule: Notify,
    shutdown: CancellationToken,
    observer: Arc<dyn RefreshObserver>,
}

impl RefreshScheduler {
    pub(crate) fn new(
        source: Arc<dyn KeySetSource>,
        policy: RefreshPolicy,
        observer: Arc<dyn RefreshObserver>,
    ) -> Self {
        Self {
            source,
            cache: KeyCache::new(),
            policy,
            state: Mutex::new(RefreshState {
                last_attempt: None,
                next_refresh_at: Instant::now(),
                consecutive_failures: 0,
                in_flight: false,
                pending_request: false,
                generation: 0,
            }),
            cycle_lock: tokio::sync::Mutex::new(()),
            wakeup: Notify::new(),
            reschedule: Notify::new(),
            shutdown: CancellationToken::new(),
            observer,
        }
    }

    pub(crate) const fn cache(&self) -> &KeyCache {
        &self.cache
    }

    pub(crate) const fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    pub(crate) fn source_description(&self) -> String {
        self.source.describe()
    }

    pub(crate) fn stats(&self) -> RefreshStats {
        let state = self.state.lock();
        RefreshStats {
            next_refresh_at: state.next_refresh_at,
            consecutive_failures: state.consecutive_failures,
            in_flight: state.in_flight,
        }
    }

    pub(crate) fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Ask the background task for an early refresh.
    ///
    /// No-op while a cycle is running, while a request is already pending, or
    /// until the minimum interval has passed since the last attempt. Returns
    /// whether a refresh was scheduled.
    pub(crate) fn request_refresh(&self) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }

        let now = Instant::now();
        {
            let mut state = self.state.lock();
            if state.in_flight || state.pending_request {
                return false;
            }
            if let Some(last) = state.last_attempt {
                if now.duration_since(last) < self.policy.min_refresh_interval {
                    return false;
                }
            }
            state.pending_request = true;
        }

        tracing::debug!("Key set refresh requested");
        self.wakeup.notify_one();
        true
    }

    /// Run one fetch, materialize and install cycle.
    ///
    /// Returns the number of keys installed. A `Requested` cycle whose request
    /// was already served by another cycle fetches nothing and returns the
    /// size of the current snapshot.
    pub(crate) async fn run_cycle(&self, trigger: RefreshTrigger) -> Result<usize> {
        let _cycle = self.cycle_lock.lock().await;
        if self.shutdown.is_cancelled() {
            return Err(AuthError::ShutDown);
        }

        {
            let mut state = self.state.lock();
            if trigger == RefreshTrigger::Requested && !self.request_due(&state) {
                tracing::debug!("Refresh request already served, skipping");
                return Ok(self.cache.snapshot().map_or(0, |snapshot| snapshot.len()));
            }
            state.in_flight = true;
            state.pending_request = false;
            state.last_attempt = Some(Instant::now());
        }
        let in_flight = InFlightGuard(&self.state);

        tracing::debug!(trigger = trigger.as_str(), source = %self.source.describe(), "Refreshing key set");
        let outcome = self.source.fetch_key_set().await;
        drop(in_flight);

        if self.shutdown.is_cancelled() {
            tracing::debug!(trigger = trigger.as_str(), "Provider shut down during refresh, discarding result");
            return Err(AuthError::ShutDown);
        }

        let now = Instant::now();
        match outcome {
            Ok(document) => {
                let materialized = materialize_document(&document);
                for skipped in &materialized.skipped {
                    self.observer.on_key_skipped(skipped);
                }

                let generation = {
                    let mut state = self.state.lock();
                    state.generation += 1;
                    state.consecutive_failures = 0;
                    state.next_refresh_at = now + self.policy.refresh_interval;
                    state.generation
                };
                self.reschedule.notify_one();

                let key_count = materialized.keys.len();
                if key_count == 0 {
                    tracing::warn!(
                        entries = document.keys.len(),
                        "Key set contains no usable keys"
                    );
                }

                self.cache
                    .install(Arc::new(KeySnapshot::new(materialized.keys, generation)));

                tracing::info!(
                    trigger = trigger.as_str(),
                    generation,
                    key_count,
                    skipped = materialized.skipped.len(),
                    "Key set refreshed"
                );
                self.observer.on_refresh_success(generation, key_count);
                Ok(key_count)
            }
            Err(err) => {
                let consecutive_failures = {
                    let mut state = self.state.lock();
                    state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                    state.next_refresh_at = now + self.policy.min_refresh_interval;
                    state.consecutive_failures
                };
                self.reschedule.notify_one();

                tracing::error!(
                    trigger = trigger.as_str(),
                    error = %err,
                    consecutive_failures,
                    retry_in_secs = self.policy.min_refresh_interval.as_secs(),
                    "Key set refresh failed"
                );
                self.observer.on_refresh_failure(&err, consecutive_failures);
                Err(err)
            }
        }
    }

    /// A pending request still wants a cycle once the cooldown has passed.
    fn request_due(&self, state: &RefreshState) -> bool {
        state.pending_request
            && state.last_attempt.map_or(true, |last| {
                last.elapsed() >= self.policy.min_refresh_interval
            })
    }

    /// Background loop: refresh when due or requested, until shut down.
    ///
    /// Any cycle, including one run through `run_cycle` from outside the loop,
    /// moves the deadline and wakes the loop to re-read it.
    pub(crate) async fn run(self: Arc<Self>) {
        tracing::info!(
            source = %self.source.describe(),
            refresh_interval_secs = self.policy.refresh_interval.as_secs(),
            min_refresh_interval_secs = self.policy.min_refresh_interval.as_secs(),
            "Starting key refresh task"
        );

        loop {
            let deadline = self.state.lock().next_refresh_at;
            let trigger = tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = tokio::time::sleep_until(deadline) => RefreshTrigger::Scheduled,
                () = self.wakeup.notified() => RefreshTrigger::Requested,
                () = self.reschedule.notified() => continue,
            };

            // Failures are already logged and reported; the previous snapshot keeps serving.
            let _ = self.run_cycle(trigger).await;
        }

        tracing::info!(source = %self.source.describe(), "Key refresh task stopped");
    }
}
