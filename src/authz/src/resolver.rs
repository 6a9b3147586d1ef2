//! Domain construction, principal mapping and rule evaluation
//!
//! A [`Resolver`] is built once from [`PlatformRules`]. Environment
//! placeholders in the domain templates are resolved at construction; the
//! `_namespace_` placeholder is resolved per request. All string trims are
//! single pass: at most one leading and one trailing `.`, then `-`, then `:`.

use crate::error::Result;
use crate::pattern::{RequestFields, RuleSet};
use crate::platform::{PlatformHooks, PlatformKind, PlatformRules};
use garm_core::placeholder_name;
use std::sync::Arc;
use tracing::debug;

/// Placeholder replaced by the request namespace
pub const NAMESPACE_PLACEHOLDER: &str = "_namespace_";

/// Group carried by every service-account identity
pub const SERVICE_ACCOUNT_GROUP: &str = "system:serviceaccounts";

const TRIM_CLASSES: [char; 3] = ['.', '-', ':'];

/// Request translation rules for one deployment
#[derive(Debug)]
pub struct Resolver {
    rules: PlatformRules,
    hooks: Arc<dyn PlatformHooks>,
    domains: Vec<String>,
    service_account_domain_prefix: String,
    admin_rules: RuleSet,
    allow_rules: RuleSet,
    deny_rules: RuleSet,
}

impl Resolver {
    /// Build a resolver, resolving placeholders against the process environment
    pub fn new(rules: PlatformRules) -> Result<Self> {
        Self::with_lookup(rules, |name| std::env::var(name).ok())
    }

    /// Build a resolver with a caller-supplied placeholder lookup
    pub fn with_lookup<F>(mut rules: PlatformRules, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let domains = rules
            .service_domains
            .iter()
            .map(|template| resolve_env_placeholders(template, &lookup))
            .collect();
        let service_account_domain_prefix =
            resolve_env_placeholders(&rules.service_account_domain_prefix, &lookup);

        let admin_rules = RuleSet::compile(std::mem::take(&mut rules.admin_access_list))?;
        let allow_rules = RuleSet::compile(std::mem::take(&mut rules.allow_list))?;
        let deny_rules = RuleSet::compile(std::mem::take(&mut rules.deny_list))?;

        debug!(
            platform = %rules.kind,
            admin_rules = admin_rules.len(),
            allow_rules = allow_rules.len(),
            deny_rules = deny_rules.len(),
            "Resolver initialized"
        );

        Ok(Self {
            hooks: rules.kind.hooks(),
            rules,
            domains,
            service_account_domain_prefix,
            admin_rules,
            allow_rules,
            deny_rules,
        })
    }

    /// Replace the platform hooks selected by the platform tag
    pub fn with_hooks(mut self, hooks: Arc<dyn PlatformHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn platform(&self) -> PlatformKind {
        self.rules.kind
    }

    /// Domain templates after environment substitution
    pub fn domain_templates(&self) -> &[String] {
        &self.domains
    }

    /// Service-account domain prefix after environment substitution
    pub fn service_account_domain_prefix(&self) -> &str {
        &self.service_account_domain_prefix
    }

    pub fn map_verb_action(&self, verb: &str) -> String {
        lookup_or_same(&self.rules.verb_mappings, verb)
    }

    pub fn map_resource(&self, resource: &str) -> String {
        lookup_or_same(&self.rules.resource_mappings, resource)
    }

    /// Mapped api group, or empty when group control is off
    pub fn map_api_group(&self, group: &str) -> String {
        if !self.rules.api_group_control_enabled {
            return String::new();
        }
        lookup_or_same(&self.rules.api_group_mappings, group)
    }

    /// Mapped resource name, or empty when name control is off
    pub fn map_resource_name(&self, name: &str) -> String {
        if !self.rules.resource_name_control_enabled {
            return String::new();
        }
        let mut name = lookup_or_same(&self.rules.resource_name_mappings, name);
        for (from, to) in &self.rules.resource_name_replacer {
            name = name.replace(from.as_str(), to);
        }
        name
    }

    pub fn empty_namespace(&self) -> &str {
        &self.rules.empty_namespace
    }

    pub fn non_resource_group(&self) -> &str {
        &self.rules.non_resource_api_group
    }

    pub fn non_resource_namespace(&self) -> &str {
        &self.rules.non_resource_namespace
    }

    /// One domain per configured template for `namespace`
    pub fn build_domains_from_namespace(&self, namespace: &str) -> Vec<String> {
        self.domains
            .iter()
            .map(|template| domain_from_template(template, namespace))
            .collect()
    }

    /// Service-account domain for `namespace`
    pub fn build_service_account_domain(&self, namespace: &str) -> String {
        domain_from_template(&self.service_account_domain_prefix, namespace)
    }

    /// Admin domain for `namespace`
    ///
    /// Unlike the service domains, the template is used as configured and
    /// the placeholder is substituted even for an empty namespace.
    pub fn admin_domain(&self, namespace: &str) -> String {
        trim_edges(
            &self
                .rules
                .admin_domain
                .replace(NAMESPACE_PLACEHOLDER, &sanitize_namespace(namespace)),
        )
    }

    /// Policy-service principal for a cluster identity
    pub fn principal_from_user(&self, user: &str, groups: &[String]) -> String {
        let user = self.hooks.map_identity(user);
        let user = user.as_ref();

        let is_service_account = groups.iter().any(|g| g == SERVICE_ACCOUNT_GROUP);
        if is_service_account {
            for prefix in &self.rules.service_account_prefixes {
                if prefix.is_empty() {
                    continue;
                }
                let Some(rest) = user.strip_prefix(prefix.as_str()) else {
                    continue;
                };

                let rest = rest.strip_prefix(':').unwrap_or(rest);
                let rest = rest.strip_suffix(':').unwrap_or(rest);
                let parts: Vec<&str> = rest.split(':').collect();

                if parts.len() >= 2 {
                    let mut segments = Vec::with_capacity(parts.len());
                    segments.push(self.build_service_account_domain(parts[0]));
                    segments.extend(parts[1..].iter().map(|p| p.to_string()));
                    let joined = segments.join(".");
                    let joined = joined.strip_suffix(':').unwrap_or(&joined);
                    let joined = joined.strip_prefix(':').unwrap_or(joined);
                    return joined.to_string();
                }
                return format!("{}{}", self.service_account_domain_prefix, rest);
            }
        }

        if !user.contains('.') {
            return format!("{}{}", self.rules.user_prefix, user);
        }
        user.to_string()
    }

    /// True when the request is permitted by the allow and deny lists
    ///
    /// Any allow match permits; otherwise any deny match rejects; otherwise
    /// the request is permitted.
    pub fn is_allowed(&self, request: &RequestFields<'_>) -> bool {
        if self.allow_rules.any_match(request) {
            return true;
        }
        !self.deny_rules.any_match(request)
    }

    /// True when any admin rule matches
    pub fn is_admin_access(&self, request: &RequestFields<'_>) -> bool {
        self.admin_rules.any_match(request)
    }
}

/// Sanitize a resource string for the policy service
pub fn trim_resource(resource: &str) -> String {
    let sanitized = resource
        .replace('/', ".")
        .replace("..", "-")
        .replace("-:", ":")
        .replace(":-", ":")
        .replace(".:", ":")
        .replace(":.", ":");
    trim_edges(&sanitized)
}

/// `/` becomes `.`, then `..` becomes `-`
pub fn sanitize_namespace(namespace: &str) -> String {
    namespace.replace('/', ".").replace("..", "-")
}

/// Substitute every `_NAME_` token of a dot-separated template
///
/// All tokens are replaced in one left-to-right pass, so a substituted value
/// is never scanned again. `_namespace_` is left for per-request substitution.
pub fn resolve_env_placeholders<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut replacements: Vec<(&str, String)> = Vec::new();
    for token in template.split('.') {
        if token == NAMESPACE_PLACEHOLDER || replacements.iter().any(|(t, _)| *t == token) {
            continue;
        }
        if let Some(name) = placeholder_name(token) {
            replacements.push((token, lookup(name).unwrap_or_default()));
        }
    }
    if replacements.is_empty() {
        return template.to_string();
    }

    let mut resolved = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(c) = rest.chars().next() {
        match replacements.iter().find(|(t, _)| rest.starts_with(t)) {
            Some((token, value)) => {
                resolved.push_str(value);
                rest = &rest[token.len()..];
            }
            None => {
                resolved.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    resolved
}

fn domain_from_template(template: &str, namespace: &str) -> String {
    let replaced = if namespace.is_empty() {
        template.replace(&format!(".{}", NAMESPACE_PLACEHOLDER), "")
    } else {
        template.replace(NAMESPACE_PLACEHOLDER, &sanitize_namespace(namespace))
    };
    trim_edges(&replaced)
}

fn trim_edges(value: &str) -> String {
    let mut value = value;
    for class in TRIM_CLASSES {
        value = value.strip_suffix(class).unwrap_or(value);
        value = value.strip_prefix(class).unwrap_or(value);
    }
    value.to_string()
}

fn lookup_or_same(table: &std::collections::HashMap<String, String>, key: &str) -> String {
    table.get(key).cloned().unwrap_or_else(|| key.to_string())
}
