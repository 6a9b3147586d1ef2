//! Producers of fresh credential values

use crate::error::{Result, TokenError};
use crate::ntoken::NTokenBuilder;
use crate::signer::TokenSigner;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Produces a new credential value on each call
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn load(&self) -> Result<String>;
}

/// Builds and signs a new token on every load
pub struct SignedTokenSource {
    builder: NTokenBuilder,
    signer: Arc<dyn TokenSigner>,
}

impl SignedTokenSource {
    pub fn new(builder: NTokenBuilder, signer: Arc<dyn TokenSigner>) -> Self {
        Self { builder, signer }
    }
}

#[async_trait]
impl TokenSource for SignedTokenSource {
    async fn load(&self) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        self.builder.build(self.signer.as_ref(), now)
    }
}

/// Reads a token maintained on disk by an external agent
#[derive(Debug, Clone)]
pub struct FileTokenSource {
    path: PathBuf,
}

impl FileTokenSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TokenSource for FileTokenSource {
    async fn load(&self) -> Result<String> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| TokenError::TokenRead {
                path: self.path.display().to_string(),
                source,
            })?;
        Ok(content.trim_end_matches(&['\r', '\n'][..]).to_string())
    }
}
