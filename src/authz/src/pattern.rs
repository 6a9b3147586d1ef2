//! Five-field wildcard access rules
//!
//! A rule and a request are both flattened into one canonical string
//! `verb-namespace-group-resource-name` (dots in the group become
//! underscores). The rule's canonical string becomes a regular expression by
//! turning every `*` into `.*` and then collapsing `..*` into `.*`. Matching is
//! an unanchored search, so a rule also matches any request whose canonical
//! string merely contains it.

use crate::error::{AuthzError, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Canonical field separator
const SEPARATOR: &str = "-";

/// The five request fields rules are evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFields<'a> {
    pub verb: &'a str,
    pub namespace: &'a str,
    pub api_group: &'a str,
    pub resource: &'a str,
    pub name: &'a str,
}

impl<'a> RequestFields<'a> {
    pub fn new(
        verb: &'a str,
        namespace: &'a str,
        api_group: &'a str,
        resource: &'a str,
        name: &'a str,
    ) -> Self {
        Self {
            verb,
            namespace,
            api_group,
            resource,
            name,
        }
    }

    /// Canonical string matched by [`AccessRule`] patterns
    pub fn canonical(&self) -> String {
        canonical(
            self.verb,
            self.namespace,
            self.api_group,
            self.resource,
            self.name,
        )
    }
}

fn canonical(verb: &str, namespace: &str, api_group: &str, resource: &str, name: &str) -> String {
    [
        verb,
        namespace,
        &api_group.replace('.', "_"),
        resource,
        name,
    ]
    .join(SEPARATOR)
}

/// A wildcard rule over the five request fields
///
/// The compiled pattern is built on first use and shared by every later
/// caller; concurrent first calls compile it exactly once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessRule {
    #[serde(default)]
    pub verb: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub api_group: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub name: String,

    #[serde(skip)]
    compiled: OnceCell<Regex>,
}

impl PartialEq for AccessRule {
    fn eq(&self, other: &Self) -> bool {
        self.verb == other.verb
            && self.namespace == other.namespace
            && self.api_group == other.api_group
            && self.resource == other.resource
            && self.name == other.name
    }
}

impl Eq for AccessRule {}

impl AccessRule {
    pub fn new(
        verb: impl Into<String>,
        namespace: impl Into<String>,
        api_group: impl Into<String>,
        resource: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            verb: verb.into(),
            namespace: namespace.into(),
            api_group: api_group.into(),
            resource: resource.into(),
            name: name.into(),
            compiled: OnceCell::new(),
        }
    }

    /// Canonical string of the rule itself
    pub fn canonical(&self) -> String {
        canonical(
            &self.verb,
            &self.namespace,
            &self.api_group,
            &self.resource,
            &self.name,
        )
    }

    /// Regular expression source derived from the canonical string
    pub fn pattern_source(&self) -> String {
        self.canonical().replace('*', ".*").replace("..*", ".*")
    }

    /// Compiled pattern, built on first call
    pub fn pattern(&self) -> Result<&Regex> {
        self.compiled.get_or_try_init(|| {
            let source = self.pattern_source();
            Regex::new(&source).map_err(|e| AuthzError::InvalidRule {
                rule: source,
                source: e,
            })
        })
    }

    /// Whether the compiled pattern has been built yet
    pub fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }

    /// Unanchored match against the request's canonical string
    ///
    /// A rule whose pattern does not compile never matches.
    pub fn matches(&self, request: &RequestFields<'_>) -> bool {
        self.matches_canonical(&request.canonical())
    }

    fn matches_canonical(&self, canonical: &str) -> bool {
        match self.pattern() {
            Ok(re) => re.is_match(canonical),
            Err(_) => false,
        }
    }
}

/// An ordered list of rules compiled up front
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<AccessRule>,
}

impl RuleSet {
    /// Compile every rule, failing on the first one that is not a valid pattern
    pub fn compile(rules: Vec<AccessRule>) -> Result<Self> {
        for rule in &rules {
            rule.pattern()?;
        }
        Ok(Self { rules })
    }

    /// True if any rule matches; stops at the first hit
    pub fn any_match(&self, request: &RequestFields<'_>) -> bool {
        if self.rules.is_empty() {
            return false;
        }
        let canonical = request.canonical();
        self.rules.iter().any(|r| r.matches_canonical(&canonical))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[AccessRule] {
        &self.rules
    }
}
