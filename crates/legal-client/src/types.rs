//! Wire and claim types.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Deserializer, Serialize};

/// Scope key under which rules that apply to every client are published.
pub const ALL_CLIENTS_SCOPE: &str = "all";

/// Path of the crucial policy endpoint, relative to the service base URL.
pub const CRUCIAL_POLICY_VERSION_PATH: &str = "/public/policies/version/allCrucial";

/// A user in `country` + `namespace` must have accepted `policy_version_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyVersionRule {
    /// Identifier of the policy version that must be accepted.
    pub policy_version_id: String,
    /// Country the rule applies to.
    pub country: String,
    /// Namespace the rule was published in.
    pub namespace: String,
}

impl PolicyVersionRule {
    /// Creates a rule.
    #[must_use]
    pub fn new(
        policy_version_id: impl Into<String>,
        country: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            policy_version_id: policy_version_id.into(),
            country: country.into(),
            namespace: namespace.into(),
        }
    }
}

/// Snapshot of every crucial policy version, grouped by scope key.
///
/// A scope key is either a client ID or [`ALL_CLIENTS_SCOPE`]. A missing or
/// `null` `affectedClient` decodes as an empty document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrucialPolicyDocument {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub affected_client: HashMap<String, Vec<PolicyVersionRule>>,
}

impl CrucialPolicyDocument {
    /// Rules published for `scope`, if the scope is present.
    #[must_use]
    pub fn rules_for(&self, scope: &str) -> Option<&[PolicyVersionRule]> {
        self.affected_client.get(scope).map(Vec::as_slice)
    }

    /// Number of scopes in the document.
    #[must_use]
    pub fn scope_count(&self) -> usize {
        self.affected_client.len()
    }

    /// Returns `true` if the document has no scopes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.affected_client.is_empty()
    }
}

impl FromIterator<(String, Vec<PolicyVersionRule>)> for CrucialPolicyDocument {
    fn from_iter<I: IntoIterator<Item = (String, Vec<PolicyVersionRule>)>>(iter: I) -> Self {
        Self {
            affected_client: iter.into_iter().collect(),
        }
    }
}

fn null_as_empty<'de, D>(
    deserializer: D,
) -> Result<HashMap<String, Vec<PolicyVersionRule>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

/// The subset of a user's authentication claims needed for compliance checks.
///
/// Supplied by the caller, typically copied out of a validated access token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserClaims {
    /// OAuth client the user authenticated through.
    pub client_id: String,
    /// The user's country.
    pub country: String,
    /// Namespace the user authenticated against.
    pub namespace: String,
    /// Policy versions the user has accepted.
    #[serde(default)]
    pub accepted_policy_versions: HashSet<String>,
}

impl UserClaims {
    /// Creates claims with no accepted policy versions.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        country: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            country: country.into(),
            namespace: namespace.into(),
            accepted_policy_versions: HashSet::new(),
        }
    }

    /// Sets the accepted policy versions.
    #[must_use]
    pub fn with_accepted<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accepted_policy_versions = versions.into_iter().map(Into::into).collect();
        self
    }
}
