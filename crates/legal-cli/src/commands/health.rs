use anyhow::{Context, Result};
use legal_client::{DefaultLegalClient, LegalClient, LegalConfig};

use crate::output::{print_failure, print_field, print_success};

/// Primes a client and reports its health. Returns the health verdict.
pub async fn health(config: LegalConfig) -> Result<bool> {
    let base_url = config.base_url.clone();
    let client = DefaultLegalClient::new(config)?;
    client
        .start_caching_crucial_legal()
        .await
        .with_context(|| format!("Failed to prime crucial policy cache from {base_url}"))?;

    let healthy = client.health_check();
    let stats = client.store().stats();

    if healthy {
        print_success(&format!("{base_url} is healthy"));
    } else {
        print_failure(&format!("{base_url} is unhealthy"));
        if let Some(failure) = client.store().health_error() {
            print_field("Last error", &failure.message);
        }
    }
    print_field("Scopes", stats.live_scopes);
    print_field("Rules", stats.rule_count);
    print_field("Cache TTL", format!("{:?}", stats.ttl));
    if let Some(at) = stats.last_refresh {
        print_field("Last refresh", at);
    }

    client.shutdown().await?;
    Ok(healthy)
}
