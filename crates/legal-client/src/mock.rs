//! No-op [`LegalClient`] for tests of dependent services.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::LegalResult;
use crate::client::LegalClient;
use crate::types::UserClaims;

/// A [`LegalClient`] that never touches the network and accepts everyone.
///
/// Healthy unless built with [`with_healthy(false)`](Self::with_healthy).
#[derive(Debug)]
pub struct MockLegalClient {
    healthy: bool,
    validations: AtomicUsize,
}

impl Default for MockLegalClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLegalClient {
    /// Creates a healthy mock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            healthy: true,
            validations: AtomicUsize::new(0),
        }
    }

    /// Sets what [`LegalClient::health_check`] reports.
    #[must_use]
    pub fn with_healthy(mut self, healthy: bool) -> Self {
        self.healthy = healthy;
        self
    }

    /// Number of validation calls served.
    #[must_use]
    pub fn validation_count(&self) -> usize {
        self.validations.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl LegalClient for MockLegalClient {
    async fn start_caching_crucial_legal(&self) -> LegalResult<()> {
        Ok(())
    }

    async fn validate_policy_versions(&self, _claims: &UserClaims) -> LegalResult<bool> {
        self.validations.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    fn health_check(&self) -> bool {
        self.healthy
    }
}
