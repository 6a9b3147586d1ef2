//! Service identity token ("n-token") format
//!
//! A token is a `;` separated list of `key=value` pairs:
//! `v=S1;d=<domain>;n=<service>;k=<key version>;a=<salt>;t=<issued>;e=<expires>;s=<signature>`.
//! The signature covers every field before `;s=` and is encoded with Y64,
//! the URL-safe base64 variant that maps `+/=` to `._-`.

use crate::error::{Result, TokenError};
use crate::signer::TokenSigner;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::HashMap;
use std::time::Duration;

pub const TOKEN_VERSION: &str = "S1";

const REQUIRED_FIELDS: [&str; 7] = ["v", "d", "n", "k", "t", "e", "s"];

/// Builds unsigned token text for a fixed domain, service and key version
#[derive(Debug, Clone)]
pub struct NTokenBuilder {
    domain: String,
    service: String,
    key_version: String,
    expiration: Duration,
}

impl NTokenBuilder {
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        key_version: impl Into<String>,
        expiration: Duration,
    ) -> Result<Self> {
        let builder = Self {
            domain: domain.into(),
            service: service.into(),
            key_version: key_version.into(),
            expiration,
        };

        if builder.domain.is_empty() || builder.service.is_empty() {
            return Err(TokenError::InvalidConfig(format!(
                "failed to create token builder\nAthenzDomain:\t{}\nServiceName:\t{}\nKeyVersion:\t{}",
                builder.domain, builder.service, builder.key_version
            )));
        }
        Ok(builder)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    /// Token text before the signature, issued at `now` (unix seconds)
    pub fn unsigned(&self, now: i64) -> String {
        let salt: u64 = rand::random();
        let lifetime = i64::try_from(self.expiration.as_secs()).unwrap_or(i64::MAX);
        let expires = now.saturating_add(lifetime);
        format!(
            "v={};d={};n={};k={};a={:016x};t={};e={}",
            TOKEN_VERSION, self.domain, self.service, self.key_version, salt, now, expires
        )
    }

    /// Complete signed token issued at `now`
    pub fn build(&self, signer: &dyn TokenSigner, now: i64) -> Result<String> {
        let unsigned = self.unsigned(now);
        let signature = signer.sign(unsigned.as_bytes())?;
        Ok(format!("{};s={}", unsigned, y64_encode(&signature)))
    }
}

/// Fields of a parsed token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NToken {
    pub version: String,
    pub domain: String,
    pub service: String,
    pub key_version: String,
    pub salt: Option<String>,
    pub issued: i64,
    pub expires: i64,
    pub signature: String,
}

impl NToken {
    pub fn principal(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }
}

/// Parse a token and check its shape; the signature itself is not verified
///
/// All of `v d n k t e s` must be present, `t` and `e` must be integers and
/// `e` must be later than `now`.
pub fn validate_shape(token: &str, now: i64) -> Result<NToken> {
    let fields: HashMap<&str, &str> = token
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .collect();

    for key in REQUIRED_FIELDS {
        match fields.get(key) {
            Some(value) if !value.is_empty() => {}
            _ => {
                return Err(TokenError::InvalidToken(format!(
                    "missing field {:?}",
                    key
                )))
            }
        }
    }

    let timestamp = |key: &str| -> Result<i64> {
        let raw = fields.get(key).copied().unwrap_or_default();
        raw.parse()
            .map_err(|_| TokenError::InvalidToken(format!("field {:?} is not a timestamp: {}", key, raw)))
    };
    let issued = timestamp("t")?;
    let expires = timestamp("e")?;
    if expires <= now {
        return Err(TokenError::InvalidToken(format!(
            "token expired at {}",
            expires
        )));
    }

    let field = |key: &str| fields.get(key).map(|v| v.to_string()).unwrap_or_default();
    Ok(NToken {
        version: field("v"),
        domain: field("d"),
        service: field("n"),
        key_version: field("k"),
        salt: fields.get("a").map(|v| v.to_string()),
        issued,
        expires,
        signature: field("s"),
    })
}

/// Base64 with `+` `/` `=` replaced by `.` `_` `-`
pub fn y64_encode(data: &[u8]) -> String {
    STANDARD
        .encode(data)
        .chars()
        .map(|c| match c {
            '+' => '.',
            '/' => '_',
            '=' => '-',
            other => other,
        })
        .collect()
}

pub fn y64_decode(data: &str) -> Result<Vec<u8>> {
    let standard: String = data
        .chars()
        .map(|c| match c {
            '.' => '+',
            '_' => '/',
            '-' => '=',
            other => other,
        })
        .collect();
    STANDARD
        .decode(standard)
        .map_err(|e| TokenError::InvalidToken(format!("bad signature encoding: {}", e)))
}
