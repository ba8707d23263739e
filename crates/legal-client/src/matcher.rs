//! Crucial policy matching.
//!
//! Decides whether a user's accepted policy versions satisfy a list of
//! required [`PolicyVersionRule`]s.
//!
//! A rule applies to a user when its country equals the user's country and
//! its namespace is either the user's namespace or, for users outside the
//! publisher namespace, the publisher namespace. Users in a tenant namespace
//! therefore inherit the publisher's crucial policies; users in the publisher
//! namespace only see publisher rules.
//!
//! # Example
//!
//! ```
//! use legal_client::matcher::PolicyMatcher;
//! use legal_client::types::{PolicyVersionRule, UserClaims};
//!
//! let matcher = PolicyMatcher::new("publisher");
//! let rules = vec![PolicyVersionRule::new("tos-v2", "US", "publisher")];
//!
//! let claims = UserClaims::new("client", "US", "tenant").with_accepted(["tos-v2"]);
//! assert!(matcher.check(&claims, &rules));
//!
//! let claims = UserClaims::new("client", "US", "tenant");
//! assert!(!matcher.check(&claims, &rules));
//! ```

use std::collections::HashSet;

use crate::types::{PolicyVersionRule, UserClaims};

/// Returns `true` if `accepted` covers every rule in `rules` that applies to
/// a user in `user_country` / `user_namespace`.
///
/// An empty rule list is vacuously satisfied. The first applicable rule whose
/// policy version is missing from `accepted` rejects.
#[must_use]
pub fn matches(
    accepted: &HashSet<String>,
    rules: &[PolicyVersionRule],
    user_country: &str,
    user_namespace: &str,
    publisher_namespace: &str,
) -> bool {
    rules
        .iter()
        .filter(|rule| rule_applies(rule, user_country, user_namespace, publisher_namespace))
        .all(|rule| accepted.contains(&rule.policy_version_id))
}

/// Returns `true` if `rule` binds a user in `user_country` / `user_namespace`.
#[must_use]
pub fn rule_applies(
    rule: &PolicyVersionRule,
    user_country: &str,
    user_namespace: &str,
    publisher_namespace: &str,
) -> bool {
    if rule.country != user_country {
        return false;
    }

    if user_namespace == publisher_namespace {
        return rule.namespace == user_namespace;
    }

    // Tenant users also inherit publisher-level crucial policies.
    rule.namespace == user_namespace || rule.namespace == publisher_namespace
}

/// [`matches`] bound to a publisher namespace.
#[derive(Debug, Clone, Default)]
pub struct PolicyMatcher {
    publisher_namespace: String,
}

impl PolicyMatcher {
    /// Creates a matcher for the given publisher namespace.
    #[must_use]
    pub fn new(publisher_namespace: impl Into<String>) -> Self {
        Self {
            publisher_namespace: publisher_namespace.into(),
        }
    }

    /// The publisher namespace this matcher uses for inheritance.
    #[must_use]
    pub fn publisher_namespace(&self) -> &str {
        &self.publisher_namespace
    }

    /// Checks `claims` against `rules`.
    #[must_use]
    pub fn check(&self, claims: &UserClaims, rules: &[PolicyVersionRule]) -> bool {
        matches(
            &claims.accepted_policy_versions,
            rules,
            &claims.country,
            &claims.namespace,
            &self.publisher_namespace,
        )
    }

    /// Rules from `rules` that bind the user described by `claims` and that
    /// the user has not accepted yet.
    #[must_use]
    pub fn missing<'a>(
        &self,
        claims: &UserClaims,
        rules: &'a [PolicyVersionRule],
    ) -> Vec<&'a PolicyVersionRule> {
        rules
            .iter()
            .filter(|rule| {
                rule_applies(
                    rule,
                    &claims.country,
                    &claims.namespace,
                    &self.publisher_namespace,
                )
            })
            .filter(|rule| !claims.accepted_policy_versions.contains(&rule.policy_version_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted(versions: &[&str]) -> HashSet<String> {
        versions.iter().map(|v| v.to_string()).collect()
    }

    fn rule(version: &str, country: &str, namespace: &str) -> PolicyVersionRule {
        PolicyVersionRule::new(version, country, namespace)
    }

    #[test]
    fn test_empty_rules_always_accept() {
        assert!(matches(&accepted(&[]), &[], "US", "game", "publisher"));
        assert!(matches(&accepted(&["x"]), &[], "US", "publisher", "publisher"));
    }

    #[test]
    fn test_other_country_never_applies() {
        let rules = vec![rule("pv-1", "DE", "game"), rule("pv-2", "DE", "publisher")];

        for namespace in ["game", "publisher"] {
            assert!(matches(&accepted(&[]), &rules, "US", namespace, "publisher"));
        }
    }

    #[test]
    fn test_tenant_inherits_publisher_rules() {
        let rules = vec![rule("pv-pub", "US", "publisher")];

        assert!(!matches(&accepted(&[]), &rules, "US", "game", "publisher"));
        assert!(matches(&accepted(&["pv-pub"]), &rules, "US", "game", "publisher"));
    }

    #[test]
    fn test_tenant_rule_in_own_namespace_applies() {
        let rules = vec![rule("pv-game", "US", "game")];

        assert!(!matches(&accepted(&[]), &rules, "US", "game", "publisher"));
        assert!(matches(&accepted(&["pv-game"]), &rules, "US", "game", "publisher"));
    }

    #[test]
    fn test_tenant_ignores_other_tenants() {
        let rules = vec![rule("pv-other", "US", "other-game")];
        assert!(matches(&accepted(&[]), &rules, "US", "game", "publisher"));
    }

    #[test]
    fn test_publisher_user_ignores_tenant_rules() {
        let rules = vec![rule("pv-game", "US", "game"), rule("pv-pub", "US", "publisher")];

        assert!(matches(&accepted(&["pv-pub"]), &rules, "US", "publisher", "publisher"));
        assert!(!matches(&accepted(&["pv-game"]), &rules, "US", "publisher", "publisher"));
    }

    #[test]
    fn test_empty_publisher_namespace() {
        // With no publisher configured every user is a tenant; only rules in
        // the user's own namespace (or the empty namespace) apply.
        let rules = vec![
            rule("pv-b", "countryB", "namespaceB"),
            rule("pv-a", "countryA", "namespaceA"),
        ];
        assert!(matches(&accepted(&["pv-b"]), &rules, "countryB", "namespaceB", ""));
        assert!(!matches(&accepted(&[]), &rules, "countryB", "namespaceB", ""));
    }

    #[test]
    fn test_all_applicable_rules_required() {
        let rules = vec![
            rule("pv-a", "US", "game"),
            rule("pv-d", "US", "game"),
            rule("pv-b", "GB", "game"),
        ];

        assert!(!matches(&accepted(&["pv-a"]), &rules, "US", "game", "publisher"));
        assert!(matches(&accepted(&["pv-a", "pv-d"]), &rules, "US", "game", "publisher"));
    }

    #[test]
    fn test_matcher_missing_lists_unaccepted_rules() {
        let matcher = PolicyMatcher::new("publisher");
        let rules = vec![
            rule("pv-a", "US", "game"),
            rule("pv-pub", "US", "publisher"),
            rule("pv-gb", "GB", "game"),
        ];
        let claims = UserClaims::new("c", "US", "game").with_accepted(["pv-a"]);

        let missing = matcher.missing(&claims, &rules);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].policy_version_id, "pv-pub");
        assert!(!matcher.check(&claims, &rules));
    }
}
