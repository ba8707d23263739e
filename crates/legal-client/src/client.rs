//! The public compliance client.
//!
//! [`DefaultLegalClient`] primes the policy cache on start, keeps it fresh
//! with a background [`RefreshLoop`], and answers validation requests from
//! the cache. Only when neither the client scope nor the wildcard scope is
//! cached does it fall back to fetching the document on demand.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::LegalResult;
use crate::config::{LegalConfig, RefreshBackoffConfig, RetryConfig};
use crate::error::LegalError;
use crate::fetcher::{HttpPolicyFetcher, PolicyFetcher};
use crate::matcher::PolicyMatcher;
use crate::refresh::{RefreshLoop, RefreshStats};
use crate::store::PolicyStore;
use crate::types::{ALL_CLIENTS_SCOPE, CrucialPolicyDocument, PolicyVersionRule, UserClaims};

// =============================================================================
// LegalClient Trait
// =============================================================================

/// Crucial policy compliance checks.
#[async_trait]
pub trait LegalClient: Send + Sync {
    /// Primes the local cache and starts keeping it fresh in the background.
    ///
    /// # Errors
    ///
    /// Returns the fetch error if the cache cannot be primed. Nothing is
    /// started in that case.
    async fn start_caching_crucial_legal(&self) -> LegalResult<()>;

    /// Returns `true` if `claims` satisfies every crucial policy that
    /// applies to the user.
    ///
    /// # Errors
    ///
    /// Returns an error only when the cache is cold and the on-demand fetch
    /// fails.
    async fn validate_policy_versions(&self, claims: &UserClaims) -> LegalResult<bool>;

    /// Returns `false` if the last background refresh failed.
    fn health_check(&self) -> bool;
}

// =============================================================================
// DefaultLegalClient
// =============================================================================

struct BackgroundTasks {
    shutdown: watch::Sender<bool>,
    refresh: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

/// Cache-backed [`LegalClient`].
pub struct DefaultLegalClient {
    config: LegalConfig,
    matcher: PolicyMatcher,
    fetcher: Arc<dyn PolicyFetcher>,
    store: Arc<PolicyStore>,
    refresh: Arc<RefreshLoop>,
    span: tracing::Span,
    tasks: Mutex<Option<BackgroundTasks>>,
}

impl DefaultLegalClient {
    /// Creates a client that talks to `config.base_url` over HTTP.
    ///
    /// # Errors
    ///
    /// Returns `LegalError::Configuration` if `config` fails validation, and
    /// `LegalError::InvalidUrl` if the endpoint URL cannot be built.
    pub fn new(config: LegalConfig) -> LegalResult<Self> {
        config.validate()?;

        let fetcher = HttpPolicyFetcher::new(
            &config.base_url,
            config.request_timeout,
            config.retry.clone(),
        )?;

        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    /// Creates a client that gets its documents from `fetcher`.
    ///
    /// `config.base_url` is not used. A zero refresh interval and invalid
    /// retry or backoff settings are replaced by their defaults.
    #[must_use]
    pub fn with_fetcher(mut config: LegalConfig, fetcher: Arc<dyn PolicyFetcher>) -> Self {
        config.refresh_interval = config.effective_refresh_interval();

        if let Err(e) = config.refresh_backoff.validate() {
            tracing::warn!(error = %e, "invalid refresh backoff, using defaults");
            config.refresh_backoff = RefreshBackoffConfig::default();
        }
        if let Err(e) = config.retry.validate() {
            tracing::warn!(error = %e, "invalid retry policy, using defaults");
            config.retry = RetryConfig::default();
        }

        let store = Arc::new(PolicyStore::new(config.cache_ttl()));
        let refresh = Arc::new(RefreshLoop::new(
            Arc::clone(&fetcher),
            Arc::clone(&store),
            config.refresh_interval,
            config.refresh_backoff.clone(),
        ));
        let span = tracing::info_span!(
            "legal_client",
            publisher_namespace = %config.publisher_namespace
        );

        Self {
            matcher: PolicyMatcher::new(config.publisher_namespace.clone()),
            config,
            fetcher,
            store,
            refresh,
            span,
            tasks: Mutex::new(None),
        }
    }

    /// Replaces the span that logs and background tasks run under.
    #[must_use]
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    /// The effective configuration.
    #[must_use]
    pub fn config(&self) -> &LegalConfig {
        &self.config
    }

    /// The policy cache.
    #[must_use]
    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    /// Counters of the background refresh loop.
    #[must_use]
    pub fn refresh_stats(&self) -> RefreshStats {
        self.refresh.stats()
    }

    /// Stops the refresh loop and the sweeper, waiting for both to exit.
    ///
    /// The client can be started again afterwards.
    ///
    /// # Errors
    ///
    /// Returns `LegalError::NotStarted` if the background tasks are not
    /// running.
    pub async fn shutdown(&self) -> LegalResult<()> {
        let Some(tasks) = self.tasks.lock().await.take() else {
            return Err(LegalError::NotStarted);
        };

        // Receivers may already be gone if a task panicked.
        let _ = tasks.shutdown.send(true);

        for (name, handle) in [("refresh", tasks.refresh), ("sweeper", tasks.sweeper)] {
            if let Err(e) = handle.await {
                tracing::warn!(parent: &self.span, task = name, error = %e, "background task failed");
            }
        }

        tracing::info!(parent: &self.span, "crucial policy caching stopped");
        Ok(())
    }

    /// Checks `claims` against one scope. `None` means the scope is not
    /// cached.
    fn check_scope(
        &self,
        claims: &UserClaims,
        scope: &str,
        rules: Option<&[PolicyVersionRule]>,
    ) -> Option<bool> {
        let rules = rules?;
        let accepted = self.matcher.check(claims, rules);
        if !accepted {
            self.log_verdict(claims, scope, false);
        }
        Some(accepted)
    }

    /// Validates against a freshly fetched document and caches all of it.
    async fn remote_validate(&self, claims: &UserClaims) -> LegalResult<bool> {
        let document: CrucialPolicyDocument = self
            .fetcher
            .fetch()
            .instrument(self.span.clone())
            .await?;

        let accepted = self
            .check_scope(claims, &claims.client_id, document.rules_for(&claims.client_id))
            .unwrap_or(true)
            && self
                .check_scope(claims, ALL_CLIENTS_SCOPE, document.rules_for(ALL_CLIENTS_SCOPE))
                .unwrap_or(true);

        self.store.put_all(document);

        if accepted {
            self.log_verdict(claims, "remote", true);
        }
        Ok(accepted)
    }

    fn log_verdict(&self, claims: &UserClaims, scope: &str, accepted: bool) {
        if self.config.debug {
            tracing::debug!(
                parent: &self.span,
                client_id = %claims.client_id,
                country = %claims.country,
                namespace = %claims.namespace,
                scope,
                accepted,
                "crucial policy verdict"
            );
        } else {
            tracing::trace!(
                parent: &self.span,
                client_id = %claims.client_id,
                scope,
                accepted,
                "crucial policy verdict"
            );
        }
    }
}

#[async_trait]
impl LegalClient for DefaultLegalClient {
    async fn start_caching_crucial_legal(&self) -> LegalResult<()> {
        let mut tasks = self.tasks.lock().await;
        if tasks.is_some() {
            return Err(LegalError::AlreadyStarted);
        }

        let document = self
            .fetcher
            .fetch()
            .instrument(self.span.clone())
            .await
            .inspect_err(|e| {
                tracing::error!(parent: &self.span, error = %e, "failed to prime crucial policy cache");
            })?;

        let scopes = document.scope_count();
        self.store.put_all(document);

        let (shutdown, rx) = watch::channel(false);
        let refresh = tokio::spawn(
            Arc::clone(&self.refresh)
                .run(rx.clone())
                .instrument(self.span.clone()),
        );
        let sweeper = tokio::spawn(
            Arc::clone(&self.store)
                .run_sweeper(self.config.cleanup_interval(), rx)
                .instrument(self.span.clone()),
        );

        *tasks = Some(BackgroundTasks {
            shutdown,
            refresh,
            sweeper,
        });

        tracing::info!(
            parent: &self.span,
            scopes,
            refresh_interval = ?self.config.refresh_interval,
            "crucial policy caching started"
        );
        Ok(())
    }

    async fn validate_policy_versions(&self, claims: &UserClaims) -> LegalResult<bool> {
        let client_rules = self.store.get(&claims.client_id);
        let client_verdict =
            self.check_scope(claims, &claims.client_id, client_rules.as_deref().map(Vec::as_slice));
        if client_verdict == Some(false) {
            return Ok(false);
        }

        let all_rules = self.store.get(ALL_CLIENTS_SCOPE);
        let all_verdict =
            self.check_scope(claims, ALL_CLIENTS_SCOPE, all_rules.as_deref().map(Vec::as_slice));
        if all_verdict == Some(false) {
            return Ok(false);
        }

        if client_verdict.is_none() && all_verdict.is_none() {
            tracing::debug!(
                parent: &self.span,
                client_id = %claims.client_id,
                "crucial policy cache miss, validating remotely"
            );
            return self.remote_validate(claims).await;
        }

        self.log_verdict(claims, "cache", true);
        Ok(true)
    }

    fn health_check(&self) -> bool {
        match self.store.health_error() {
            Some(failure) => {
                tracing::debug!(
                    parent: &self.span,
                    error = %failure.message,
                    category = %failure.category,
                    "crucial policy refresh unhealthy"
                );
                false
            }
            None => true,
        }
    }
}
