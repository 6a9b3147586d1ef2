//! Token signing capability
//!
//! Tokens are signed by an external capability behind [`TokenSigner`]. The
//! bundled [`PemSigner`] handles PEM encoded RSA (PKCS#1 or PKCS#8) and
//! ECDSA P-256 (PKCS#8) keys.

use crate::error::{Result, TokenError};
use ring::rand::SystemRandom;
use ring::signature::{self, EcdsaKeyPair, RsaKeyPair};
use rustls_pemfile::Item;
use std::fmt;
use std::io::BufReader;
use std::path::Path;

/// Produces a signature over the unsigned token text
pub trait TokenSigner: Send + Sync {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>>;
}

enum SigningKey {
    Rsa(RsaKeyPair),
    Ecdsa(EcdsaKeyPair),
}

/// Signer backed by a PEM private key
pub struct PemSigner {
    key: SigningKey,
    rng: SystemRandom,
}

impl fmt::Debug for PemSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let algorithm = match self.key {
            SigningKey::Rsa(_) => "rsa-sha256",
            SigningKey::Ecdsa(_) => "ecdsa-p256-sha256",
        };
        f.debug_struct("PemSigner")
            .field("algorithm", &algorithm)
            .finish()
    }
}

impl PemSigner {
    /// Load the first private key found in a PEM file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| TokenError::KeyRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_pem(&data)
    }

    /// Load the first private key found in PEM data
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let rng = SystemRandom::new();
        let mut reader = BufReader::new(pem);

        loop {
            let item = rustls_pemfile::read_one(&mut reader)
                .map_err(|e| TokenError::InvalidKey(e.to_string()))?;

            let key = match item {
                Some(Item::Pkcs1Key(der)) => RsaKeyPair::from_der(der.secret_pkcs1_der())
                    .map(SigningKey::Rsa)
                    .map_err(|e| TokenError::InvalidKey(format!("rsa key rejected: {}", e)))?,
                Some(Item::Pkcs8Key(der)) => Self::from_pkcs8(der.secret_pkcs8_der(), &rng)?,
                Some(Item::Sec1Key(_)) => {
                    return Err(TokenError::InvalidKey(
                        "SEC1 EC keys are not supported, convert the key to PKCS#8".to_string(),
                    ))
                }
                Some(_) => continue,
                None => {
                    return Err(TokenError::InvalidKey(
                        "no private key found in PEM data".to_string(),
                    ))
                }
            };

            return Ok(Self { key, rng });
        }
    }

    fn from_pkcs8(der: &[u8], rng: &SystemRandom) -> Result<SigningKey> {
        if let Ok(key) =
            EcdsaKeyPair::from_pkcs8(&signature::ECDSA_P256_SHA256_ASN1_SIGNING, der, rng)
        {
            return Ok(SigningKey::Ecdsa(key));
        }
        RsaKeyPair::from_pkcs8(der)
            .map(SigningKey::Rsa)
            .map_err(|e| TokenError::InvalidKey(format!("unsupported PKCS#8 key: {}", e)))
    }
}

impl TokenSigner for PemSigner {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        match &self.key {
            SigningKey::Rsa(key) => {
                let mut sig = vec![0u8; key.public().modulus_len()];
                key.sign(&signature::RSA_PKCS1_SHA256, &self.rng, message, &mut sig)
                    .map_err(|_| TokenError::Signing("rsa signing failed".to_string()))?;
                Ok(sig)
            }
            SigningKey::Ecdsa(key) => key
                .sign(&self.rng, message)
                .map(|sig| sig.as_ref().to_vec())
                .map_err(|_| TokenError::Signing("ecdsa signing failed".to_string())),
        }
    }
}
