//! Error types for request mapping

use thiserror::Error;

/// Mapping and policy-resolution errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Request is missing the attributes needed for mapping
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A configured access rule does not compile to a pattern
    #[error("Invalid access rule {rule:?}")]
    InvalidRule {
        rule: String,
        #[source]
        source: regex::Error,
    },

    /// Request hit the deny list without matching the allow list
    #[error(
        "----{identity}'s request is not allowed----\nVerb:\t{verb}\nNamespace:\t{namespace}\nAPI Group:\t{api_group}\nResource:\t{resource}\nResource Name:\t{name}\n"
    )]
    Rejected {
        identity: String,
        verb: String,
        namespace: String,
        api_group: String,
        resource: String,
        name: String,
    },
}

impl AuthzError {
    /// True for policy rejections, which are final and never retried
    pub fn is_rejection(&self) -> bool {
        matches!(self, AuthzError::Rejected { .. })
    }
}

/// Result type for mapping operations
pub type Result<T> = std::result::Result<T, AuthzError>;
