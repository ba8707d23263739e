//! Background refresh of the crucial policy cache.
//!
//! The loop sleeps one refresh interval (the cache was just primed), then
//! repeatedly fetches the document and writes it to the [`PolicyStore`]:
//!
//! ```text
//! Fetching --ok--> record healthy, reset backoff --> sleep(interval) --> Fetching
//!          \-err-> record error                  --> sleep(backoff)  --> Fetching
//!                                                     backoff = min(2 * backoff, max)
//! ```
//!
//! The loop runs until its shutdown channel flips to `true` or the sender is
//! dropped, including while a fetch or a sleep is in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;

use crate::config::RefreshBackoffConfig;
use crate::fetcher::PolicyFetcher;
use crate::store::PolicyStore;

/// Sleep schedule after consecutive refresh failures.
///
/// After `n` consecutive failures the sleep is `min(initial * 2^(n-1), max)`.
#[derive(Debug, Clone)]
pub struct RefreshBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl RefreshBackoff {
    /// Creates a backoff at its initial delay.
    ///
    /// A zero `initial` falls back to the default, and `max` is raised to at
    /// least `initial`.
    #[must_use]
    pub fn new(config: &RefreshBackoffConfig) -> Self {
        let initial = if config.initial.is_zero() {
            RefreshBackoffConfig::default().initial
        } else {
            config.initial
        };
        let max = config.max.max(initial);

        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Registers a failure and returns how long to sleep before retrying.
    pub fn on_failure(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Registers a success.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    /// The delay the next failure will get.
    #[must_use]
    pub fn current(&self) -> Duration {
        self.current
    }
}

/// Refresh loop counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Fetches started.
    pub attempts: u64,
    /// Fetches that updated the cache.
    pub successes: u64,
    /// Fetches that failed.
    pub failures: u64,
    /// Failures since the last success.
    pub consecutive_failures: u64,
}

/// Periodically refetches the crucial policy document.
pub struct RefreshLoop {
    fetcher: Arc<dyn PolicyFetcher>,
    store: Arc<PolicyStore>,
    interval: Duration,
    backoff: RefreshBackoffConfig,

    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    consecutive_failures: AtomicU64,
}

impl RefreshLoop {
    /// Creates a refresh loop writing into `store`.
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn PolicyFetcher>,
        store: Arc<PolicyStore>,
        interval: Duration,
        backoff: RefreshBackoffConfig,
    ) -> Self {
        Self {
            fetcher,
            store,
            interval,
            backoff,
            attempts: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            consecutive_failures: AtomicU64::new(0),
        }
    }

    /// Runs until `shutdown` is signalled.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval = ?self.interval, "crucial policy refresh loop started");

        let mut backoff = RefreshBackoff::new(&self.backoff);
        let mut delay = self.interval;

        loop {
            if !sleep_or_shutdown(delay, &mut shutdown).await {
                break;
            }

            self.attempts.fetch_add(1, Ordering::Relaxed);

            let result = tokio::select! {
                biased;

                _ = shutdown_requested(&mut shutdown) => break,
                result = self.fetcher.fetch() => result,
            };

            match result {
                Ok(document) => {
                    self.store.put_all(document);
                    self.store.record_refresh_result(None);
                    self.successes.fetch_add(1, Ordering::Relaxed);
                    self.consecutive_failures.store(0, Ordering::Relaxed);

                    backoff.reset();
                    delay = self.interval;
                }
                Err(err) => {
                    self.store.record_refresh_result(Some(&err));
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    let consecutive = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;

                    delay = backoff.on_failure();
                    tracing::warn!(
                        error = %err,
                        consecutive_failures = consecutive,
                        backoff_ms = delay.as_millis() as u64,
                        "crucial policy refresh failed"
                    );
                }
            }
        }

        tracing::info!("crucial policy refresh loop shutting down");
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> RefreshStats {
        RefreshStats {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
        }
    }
}

/// Resolves once `shutdown` holds `true` or its sender is gone.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Sleeps for `duration`. Returns `false` if shutdown was requested first.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;

        _ = shutdown_requested(shutdown) => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
