//! Policy-service client
//!
//! Two calls are used: `GET {url}/principal` resolves a presented token to
//! its domain and service, and `GET {url}/access/{action}/{resource}` asks
//! whether a principal is granted an action on a resource.

use crate::error::{ApiError, Result};
use async_trait::async_trait;
use garm_authz::AccessCheck;
use garm_core::{actual_value, parse_duration};
use reqwest::header::HeaderName;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_AUTH_HEADER: &str = "Athenz-Principal-Auth";

/// Policy-service connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AthenzConfig {
    pub url: String,
    pub auth_header: String,
    pub timeout: String,
    /// PEM bundle trusted for the policy service (`_NAME_` reads the environment)
    pub root_ca: String,
}

impl Default for AthenzConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            auth_header: DEFAULT_AUTH_HEADER.to_string(),
            timeout: "5s".to_string(),
            root_ca: String::new(),
        }
    }
}

/// Identity behind a presented token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyPrincipal {
    pub domain: String,
    pub service: String,
}

#[derive(Debug, Deserialize)]
struct AccessResponse {
    granted: bool,
}

/// Outbound policy-service operations
#[async_trait]
pub trait PolicyClient: Send + Sync {
    /// Resolve `token` to its principal
    async fn authenticate(&self, token: &str) -> Result<PolicyPrincipal>;

    /// Whether `principal` is granted `check`, authenticating with `credential`
    async fn check_access(
        &self,
        credential: &str,
        check: &AccessCheck,
        principal: &str,
    ) -> Result<bool>;
}

/// HTTP client for the policy service
#[derive(Debug, Clone)]
pub struct AthenzClient {
    client: reqwest::Client,
    base: Url,
    auth_header: HeaderName,
    trace: bool,
}

impl AthenzClient {
    pub fn new(config: &AthenzConfig) -> Result<Self> {
        let timeout = parse_duration(&config.timeout)
            .map_err(|e| ApiError::Config(format!("athenz timeout parse failed: {}", e)))?;
        let base = Url::parse(&config.url)
            .map_err(|e| ApiError::Config(format!("invalid athenz url {:?}: {}", config.url, e)))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::Config(format!("invalid athenz url {:?}", config.url)));
        }
        let auth_header = HeaderName::from_bytes(config.auth_header.as_bytes()).map_err(|e| {
            ApiError::Config(format!("invalid auth header {:?}: {}", config.auth_header, e))
        })?;

        let mut builder = reqwest::Client::builder().timeout(timeout);
        let root_ca = actual_value(&config.root_ca);
        if !root_ca.is_empty() {
            let pem = std::fs::read(&root_ca).map_err(|e| {
                ApiError::Config(format!("failed to read athenz root ca {}: {}", root_ca, e))
            })?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }

        Ok(Self {
            client: builder.build()?,
            base,
            auth_header,
            trace: false,
        })
    }

    /// Log every outbound call
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[async_trait]
impl PolicyClient for AthenzClient {
    async fn authenticate(&self, token: &str) -> Result<PolicyPrincipal> {
        let url = self.endpoint(&["principal"]);
        if self.trace {
            info!(target: "athenz", url = %url, "Authenticating token");
        }

        let response = self
            .client
            .get(url)
            .header(self.auth_header.clone(), token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(ApiError::Policy("token is not valid".to_string()))
            }
            status => Err(ApiError::Policy(format!(
                "principal lookup returned {}",
                status
            ))),
        }
    }

    async fn check_access(
        &self,
        credential: &str,
        check: &AccessCheck,
        principal: &str,
    ) -> Result<bool> {
        let mut url = self.endpoint(&["access", check.action.as_str(), check.resource.as_str()]);
        url.query_pairs_mut().append_pair("principal", principal);

        let response = self
            .client
            .get(url.clone())
            .header(self.auth_header.clone(), credential)
            .send()
            .await?;

        let status = response.status();
        let granted = if status.is_success() {
            response.json::<AccessResponse>().await?.granted
        } else if status == StatusCode::NOT_FOUND || status == StatusCode::FORBIDDEN {
            false
        } else {
            return Err(ApiError::Policy(format!("access check returned {}", status)));
        };

        if self.trace {
            info!(
                target: "athenz",
                principal = principal,
                action = %check.action,
                resource = %check.resource,
                granted = granted,
                "Access check"
            );
        }
        Ok(granted)
    }
}
