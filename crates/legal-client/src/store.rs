//! In-memory cache of crucial policy rules, keyed by scope.
//!
//! Each scope (a client ID or [`ALL_CLIENTS_SCOPE`](crate::types::ALL_CLIENTS_SCOPE))
//! maps to its rule list plus the time it was cached. Entries expire lazily:
//! a lookup past the TTL evicts the entry and reports a miss. A background
//! sweeper ([`PolicyStore::run_sweeper`]) removes expired entries that are
//! never looked up again.
//!
//! A refresh replaces every scope present in the new document. Scopes missing
//! from the new document stay cached until their TTL runs out.
//!
//! The store also carries the health state of the refresh loop: the last
//! refresh failure, if any.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{ErrorCategory, LegalError};
use crate::types::{CrucialPolicyDocument, PolicyVersionRule};

/// A cached rule list with TTL support.
///
/// Rules are wrapped in `Arc` so cache hits are cheap clones.
#[derive(Clone, Debug)]
struct CachedRules {
    rules: Arc<Vec<PolicyVersionRule>>,
    cached_at: Instant,
    ttl: Duration,
}

impl CachedRules {
    fn new(rules: Vec<PolicyVersionRule>, ttl: Duration) -> Self {
        Self {
            rules: Arc::new(rules),
            cached_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// The most recent refresh failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshFailure {
    /// Rendered error message.
    pub message: String,
    /// Error category of the failure.
    pub category: ErrorCategory,
    /// When the failure was recorded.
    pub at: OffsetDateTime,
}

impl RefreshFailure {
    fn from_error(err: &LegalError) -> Self {
        Self {
            message: err.to_string(),
            category: err.category(),
            at: OffsetDateTime::now_utc(),
        }
    }
}

/// Concurrent scope -> rules cache.
pub struct PolicyStore {
    entries: DashMap<String, CachedRules>,
    ttl: Duration,
    generation: AtomicU64,
    last_refresh: ArcSwapOption<OffsetDateTime>,
    refresh_error: ArcSwapOption<RefreshFailure>,
}

impl PolicyStore {
    /// Creates an empty store whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            generation: AtomicU64::new(0),
            last_refresh: ArcSwapOption::empty(),
            refresh_error: ArcSwapOption::empty(),
        }
    }

    /// Entry lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Looks up the rules for `scope`.
    ///
    /// Returns `None` if the scope was never cached or its entry expired. An
    /// expired entry is evicted on the way out.
    pub fn get(&self, scope: &str) -> Option<Arc<Vec<PolicyVersionRule>>> {
        if let Some(entry) = self.entries.get(scope) {
            if !entry.is_expired() {
                return Some(Arc::clone(&entry.rules));
            }
            drop(entry);
            // Only evict if nobody replaced the entry in between.
            self.entries.remove_if(scope, |_, cached| cached.is_expired());
            tracing::trace!(scope = %scope, "crucial policy cache entry expired");
        }
        None
    }

    /// Caches every scope of `document`, each with a fresh TTL.
    ///
    /// Each scope's rule list is swapped in as a whole, so concurrent readers
    /// see either the old or the new list. Scopes absent from `document` are
    /// left untouched.
    pub fn put_all(&self, document: CrucialPolicyDocument) {
        let scopes = document.affected_client.len();
        for (scope, rules) in document.affected_client {
            self.entries.insert(scope, CachedRules::new(rules, self.ttl));
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.last_refresh
            .store(Some(Arc::new(OffsetDateTime::now_utc())));

        tracing::debug!(scopes, generation, "crucial policy cache populated");
    }

    /// Records the outcome of a background refresh.
    ///
    /// `None` clears the health error.
    pub fn record_refresh_result(&self, error: Option<&LegalError>) {
        self.refresh_error
            .store(error.map(|e| Arc::new(RefreshFailure::from_error(e))));
    }

    /// The last recorded refresh failure, or `None` if the last refresh
    /// succeeded (or none has run).
    #[must_use]
    pub fn health_error(&self) -> Option<Arc<RefreshFailure>> {
        self.refresh_error.load_full()
    }

    /// Removes every expired entry. Returns the number removed.
    pub fn cleanup(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, cached| !cached.is_expired());
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            tracing::debug!(removed, "swept expired crucial policy entries");
        }
        removed
    }

    /// Number of entries, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the cache state.
    #[must_use]
    pub fn stats(&self) -> PolicyStoreStats {
        let mut stats = PolicyStoreStats {
            live_scopes: 0,
            expired_scopes: 0,
            rule_count: 0,
            generation: self.generation.load(Ordering::Acquire),
            last_refresh: self.last_refresh.load_full().map(|t| *t),
            ttl: self.ttl,
        };

        for entry in &self.entries {
            if entry.is_expired() {
                stats.expired_scopes += 1;
            } else {
                stats.live_scopes += 1;
                stats.rule_count += entry.rules.len();
            }
        }
        stats
    }

    /// Periodically sweeps expired entries until `shutdown` flips to `true`
    /// or its sender is dropped.
    pub async fn run_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        tracing::debug!(interval = ?interval, "crucial policy sweeper started");

        loop {
            tokio::select! {
                biased;

                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(interval) => {
                    self.cleanup();
                }
            }
        }

        tracing::debug!("crucial policy sweeper stopped");
    }
}

/// Statistics about the policy store.
#[derive(Debug, Clone)]
pub struct PolicyStoreStats {
    /// Scopes with an unexpired entry.
    pub live_scopes: usize,
    /// Scopes whose entry expired but has not been evicted yet.
    pub expired_scopes: usize,
    /// Total rules across live scopes.
    pub rule_count: usize,
    /// Number of documents written so far.
    pub generation: u64,
    /// When the last document was written.
    pub last_refresh: Option<OffsetDateTime>,
    /// Entry lifetime.
    pub ttl: Duration,
}
