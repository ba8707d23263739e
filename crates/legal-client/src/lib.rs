//! # legal-client
//!
//! Client-side gate for crucial legal policies.
//!
//! Given a user's claims (client ID, country, namespace and accepted policy
//! versions), the client decides whether the user has accepted every policy
//! version the policy service marks as crucial for them.
//!
//! This crate provides:
//! - a local cache of the crucial policy document, primed on start
//! - a background refresh loop with failure backoff and health reporting
//! - the namespace-aware policy matching algorithm
//! - a no-op client for tests of dependent services
//!
//! ## Modules
//!
//! - [`client`] - The `LegalClient` trait and the cache-backed implementation
//! - [`matcher`] - Policy version matching
//! - [`store`] - TTL cache of policy rules per scope
//! - [`fetcher`] - HTTP retrieval of the crucial policy document
//! - [`refresh`] - Background refresh loop
//! - [`mock`] - Always-accepting test double
//! - [`config`] - Client configuration and loading
//! - [`error`] - Error types
//! - [`types`] - Wire and claim types
//!
//! ## Example
//!
//! ```no_run
//! use legal_client::prelude::*;
//!
//! # async fn run() -> LegalResult<()> {
//! let config = LegalConfig::new("https://legal.example.com")
//!     .with_publisher_namespace("publisher");
//! let client = DefaultLegalClient::new(config)?;
//! client.start_caching_crucial_legal().await?;
//!
//! let claims = UserClaims::new("web-client", "US", "game").with_accepted(["tos-v3"]);
//! if !client.validate_policy_versions(&claims).await? {
//!     println!("user must accept the latest policies");
//! }
//!
//! client.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod matcher;
pub mod mock;
pub mod refresh;
pub mod store;
pub mod types;

pub use client::{DefaultLegalClient, LegalClient};
pub use config::{ConfigError, LegalConfig, RefreshBackoffConfig, RetryConfig};
pub use error::{ErrorCategory, LegalError};
pub use fetcher::{HttpPolicyFetcher, PolicyFetcher};
pub use matcher::PolicyMatcher;
pub use mock::MockLegalClient;
pub use refresh::{RefreshLoop, RefreshStats};
pub use store::{PolicyStore, PolicyStoreStats, RefreshFailure};
pub use types::{ALL_CLIENTS_SCOPE, CrucialPolicyDocument, PolicyVersionRule, UserClaims};

/// Type alias for legal client results.
pub type LegalResult<T> = Result<T, LegalError>;

/// Prelude module for convenient imports.
///
/// ```
/// use legal_client::prelude::*;
/// ```
pub mod prelude {
    pub use crate::LegalResult;
    pub use crate::client::{DefaultLegalClient, LegalClient};
    pub use crate::config::{ConfigError, LegalConfig};
    pub use crate::error::{ErrorCategory, LegalError};
    pub use crate::mock::MockLegalClient;
    pub use crate::types::{CrucialPolicyDocument, PolicyVersionRule, UserClaims};
}
