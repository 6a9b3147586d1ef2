//! Per-deployment mapping rules

use crate::pattern::AccessRule;
use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Cluster flavor the rules were written for
///
/// All flavors share the same mapping logic; the tag only selects the
/// [`PlatformHooks`] installed in the resolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    #[default]
    K8s,
    Aks,
    Eks,
}

impl PlatformKind {
    /// Hooks used by the resolver for this flavor
    pub fn hooks(&self) -> Arc<dyn PlatformHooks> {
        match self {
            PlatformKind::K8s | PlatformKind::Aks | PlatformKind::Eks => Arc::new(DefaultHooks),
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformKind::K8s => write!(f, "k8s"),
            PlatformKind::Aks => write!(f, "aks"),
            PlatformKind::Eks => write!(f, "eks"),
        }
    }
}

/// Platform-specific behavior injected into the resolver
pub trait PlatformHooks: Send + Sync + fmt::Debug {
    /// Rewrite the cluster identity before principal mapping
    fn map_identity<'a>(&self, identity: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(identity)
    }
}

/// Hooks that leave every input untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl PlatformHooks for DefaultHooks {}

/// Immutable mapping rules for one deployment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformRules {
    #[serde(rename = "name")]
    pub kind: PlatformKind,

    /// Domain templates; a single string is accepted as a list of one
    #[serde(
        rename = "service_athenz_domains",
        alias = "service_athenz_domain",
        deserialize_with = "one_or_many"
    )]
    pub service_domains: Vec<String>,

    pub resource_mappings: HashMap<String, String>,
    pub verb_mappings: HashMap<String, String>,

    #[serde(rename = "api_group_control")]
    pub api_group_control_enabled: bool,
    pub api_group_mappings: HashMap<String, String>,

    pub empty_namespace: String,

    #[serde(rename = "resource_name_control")]
    pub resource_name_control_enabled: bool,
    pub resource_name_mappings: HashMap<String, String>,
    /// Literal substring replacements applied in key order
    pub resource_name_replacer: BTreeMap<String, String>,

    pub non_resource_api_group: String,
    pub non_resource_namespace: String,

    pub service_account_prefixes: Vec<String>,
    #[serde(rename = "athenz_user_prefix")]
    pub user_prefix: String,
    #[serde(rename = "athenz_service_account_prefix")]
    pub service_account_domain_prefix: String,
    #[serde(rename = "admin_athenz_domain")]
    pub admin_domain: String,

    pub admin_access_list: Vec<AccessRule>,
    #[serde(alias = "white_list")]
    pub allow_list: Vec<AccessRule>,
    #[serde(alias = "black_list")]
    pub deny_list: Vec<AccessRule>,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) if s.is_empty() => Vec::new(),
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_from_toml() {
        let rules: PlatformRules = toml::from_str(
            r#"
            name = "eks"
            service_athenz_domains = ["cluster._namespace_", "shared"]
            api_group_control = true
            athenz_user_prefix = "user."
            resource_name_replacer = { ":" = "_" }

            [[white_list]]
            verb = "get"
            namespace = "*"

            [[deny_list]]
            resource = "secrets"
            "#,
        )
        .unwrap();

        assert_eq!(rules.kind, PlatformKind::Eks);
        assert_eq!(rules.service_domains.len(), 2);
        assert!(rules.api_group_control_enabled);
        assert!(!rules.resource_name_control_enabled);
        assert_eq!(rules.user_prefix, "user.");
        assert_eq!(rules.allow_list.len(), 1);
        assert_eq!(rules.deny_list[0].resource, "secrets");
        assert_eq!(rules.resource_name_replacer.get(":").unwrap(), "_");
    }

    #[test]
    fn test_single_domain_is_list_of_one() {
        let rules: PlatformRules =
            toml::from_str(r#"service_athenz_domain = "cluster._namespace_""#).unwrap();
        assert_eq!(rules.service_domains, vec!["cluster._namespace_".to_string()]);
        assert_eq!(rules.kind, PlatformKind::K8s);
    }

    #[test]
    fn test_default_hooks_pass_identity_through() {
        let hooks = PlatformKind::Aks.hooks();
        assert_eq!(hooks.map_identity("alice"), "alice");
    }
}
