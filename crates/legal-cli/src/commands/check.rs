use anyhow::{Context, Result};
use colored::Colorize;
use legal_client::{
    ALL_CLIENTS_SCOPE, DefaultLegalClient, LegalClient, LegalConfig, PolicyMatcher, UserClaims,
};

use crate::cli::CheckArgs;
use crate::output::{print_failure, print_rules_table, print_success};

/// Validates one user. Returns `true` if the user is compliant.
pub async fn check(config: LegalConfig, args: &CheckArgs) -> Result<bool> {
    let matcher = PolicyMatcher::new(config.publisher_namespace.clone());
    let client = DefaultLegalClient::new(config)?;
    client
        .start_caching_crucial_legal()
        .await
        .context("Failed to load crucial policies")?;

    let claims = UserClaims::new(&args.client_id, &args.country, &args.namespace)
        .with_accepted(args.accepted.iter().cloned());

    let accepted = client.validate_policy_versions(&claims).await;

    // Gather what is missing before the cache goes away with the client.
    let mut missing = Vec::new();
    if matches!(accepted, Ok(false)) {
        for scope in [claims.client_id.as_str(), ALL_CLIENTS_SCOPE] {
            if let Some(rules) = client.store().get(scope) {
                missing.extend(
                    matcher
                        .missing(&claims, &rules)
                        .into_iter()
                        .map(|rule| (scope.to_string(), rule.clone())),
                );
            }
        }
    }

    client.shutdown().await?;
    let accepted = accepted.context("Validation failed")?;

    let who = format!(
        "{} ({}/{})",
        claims.client_id.cyan(),
        claims.country,
        claims.namespace
    );
    if accepted {
        print_success(&format!("{who} has {}", "ACCEPTED".green()));
    } else {
        print_failure(&format!("{who} is {}", "REJECTED".red()));
        print_rules_table(missing.iter().map(|(scope, rule)| (scope.as_str(), rule)));
    }
    Ok(accepted)
}
