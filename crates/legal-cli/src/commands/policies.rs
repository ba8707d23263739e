use anyhow::{Context, Result};
use legal_client::{HttpPolicyFetcher, LegalConfig, PolicyFetcher};

use crate::output::print_rules_table;

pub async fn list(config: &LegalConfig, scope: Option<&str>) -> Result<()> {
    let fetcher = HttpPolicyFetcher::new(
        &config.base_url,
        config.request_timeout,
        config.retry.clone(),
    )?;
    let document = fetcher
        .fetch()
        .await
        .with_context(|| format!("Failed to fetch {}", fetcher.url()))?;

    let mut scopes: Vec<&String> = document
        .affected_client
        .keys()
        .filter(|s| scope.is_none_or(|wanted| wanted == s.as_str()))
        .collect();
    scopes.sort();

    if let Some(wanted) = scope
        && scopes.is_empty()
    {
        anyhow::bail!("Scope '{wanted}' has no crucial policies");
    }

    print_rules_table(scopes.into_iter().flat_map(|scope| {
        document.affected_client[scope]
            .iter()
            .map(move |rule| (scope.as_str(), rule))
    }));
    Ok(())
}
