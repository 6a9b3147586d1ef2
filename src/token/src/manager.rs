//! Periodic credential refresh and lock-free publication

use crate::error::{Result, TokenError};
use crate::ntoken::{validate_shape, NTokenBuilder};
use crate::signer::PemSigner;
use crate::source::{FileTokenSource, SignedTokenSource, TokenSource};
use arc_swap::ArcSwapOption;
use garm_core::{actual_value, parse_duration};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument, Span};

/// Credential parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Policy-service domain of this gateway (`_NAME_` reads the environment)
    pub athenz_domain: String,
    /// Service name within the domain (`_NAME_` reads the environment)
    pub service_name: String,
    /// Token file maintained by an external agent; disables signing
    pub ntoken_path: String,
    /// PEM private key path (`_NAME_` reads the environment)
    pub private_key: String,
    pub validate_token: bool,
    pub refresh_duration: String,
    pub key_version: String,
    pub expiration: String,
}

/// Owns the current credential and the task that refreshes it
pub struct TokenManager {
    source: Arc<dyn TokenSource>,
    refresh_interval: Duration,
    validate: bool,
    current: ArcSwapOption<String>,
    span: Span,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("refresh_interval", &self.refresh_interval)
            .field("validate", &self.validate)
            .field("has_token", &self.current.load().is_some())
            .finish()
    }
}

impl TokenManager {
    /// Create a manager around an arbitrary source
    pub fn new(source: Arc<dyn TokenSource>, refresh_interval: Duration) -> Result<Self> {
        if refresh_interval.is_zero() {
            return Err(TokenError::ZeroRefresh);
        }
        Ok(Self {
            source,
            refresh_interval,
            validate: false,
            current: ArcSwapOption::empty(),
            span: info_span!("token"),
        })
    }

    /// Create a manager from configuration
    ///
    /// A non-empty `ntoken_path` selects the file source and must not be
    /// combined with a private key. Otherwise the private key is loaded and
    /// a signer is bound to the configured domain, service and key version.
    pub fn from_config(config: &TokenConfig) -> Result<Self> {
        let refresh = parse_duration(&config.refresh_duration).map_err(|source| {
            TokenError::InvalidDuration {
                field: "refresh",
                value: config.refresh_duration.clone(),
                source,
            }
        })?;
        let expiration =
            parse_duration(&config.expiration).map_err(|source| TokenError::InvalidDuration {
                field: "expiration",
                value: config.expiration.clone(),
                source,
            })?;

        let source: Arc<dyn TokenSource> = if !config.ntoken_path.is_empty() {
            if !config.private_key.is_empty() {
                return Err(TokenError::InvalidConfig(
                    "ntoken_path and private_key are mutually exclusive".to_string(),
                ));
            }
            Arc::new(FileTokenSource::new(actual_value(&config.ntoken_path)))
        } else {
            let key_path = actual_value(&config.private_key);
            if key_path.is_empty() {
                return Err(TokenError::InvalidConfig(
                    "private_key is required when ntoken_path is not set".to_string(),
                ));
            }
            let signer = PemSigner::from_file(&key_path)?;
            let builder = NTokenBuilder::new(
                actual_value(&config.athenz_domain),
                actual_value(&config.service_name),
                config.key_version.clone(),
                expiration,
            )?;
            Arc::new(SignedTokenSource::new(builder, Arc::new(signer)))
        };

        Ok(Self::new(source, refresh)?.with_validation(config.validate_token))
    }

    /// Check the shape of every produced token before publishing it
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Log refresh activity inside `span`
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Current credential, or [`TokenError::NotFound`] before the first refresh succeeds
    pub fn token(&self) -> Result<String> {
        self.current
            .load_full()
            .map(|token| token.as_ref().clone())
            .ok_or(TokenError::NotFound)
    }

    /// Produce, optionally validate, and publish one new value
    ///
    /// On failure the previously published value stays in place.
    pub async fn refresh(&self) -> Result<()> {
        let token = self.source.load().await?;
        if self.validate {
            validate_shape(&token, chrono::Utc::now().timestamp())?;
        }
        self.current.store(Some(Arc::new(token)));
        Ok(())
    }

    /// Spawn the refresher: one refresh now, then one per interval until cancelled
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let span = self.span.clone();

        tokio::spawn(
            async move {
                let mut ticker = interval(manager.refresh_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                info!(
                    "Token refresher started, interval {:?}",
                    manager.refresh_interval
                );

                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            info!("Token refresher stopped");
                            break;
                        }
                        _ = ticker.tick() => {
                            match manager.refresh().await {
                                Ok(()) => debug!("Token refreshed"),
                                Err(e) => error!(error = %e, "Token update failed"),
                            }
                        }
                    }
                }
            }
            .instrument(span),
        )
    }
}
