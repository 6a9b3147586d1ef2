//! Server transport credentials for the traffic listener
//!
//! Client certificates are mandatory and verified against the configured CA
//! bundle. TLS 1.2 is the minimum version, key exchange prefers P-384, then
//! P-256, then X25519, and neither session tickets nor session-ID resumption
//! are offered.

use crate::error::ServerError;
use garm_core::actual_value;
use rustls::server::{AllowAnyAuthenticatedClient, NoServerSessionStorage};
use rustls::{kx_group, version, Certificate, PrivateKey, RootCertStore, ServerConfig};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

/// TLS paths; each value may be a `_NAME_` environment placeholder
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub cert: String,
    pub key: String,
    pub ca: String,
}

/// Build the server TLS configuration, or `None` when TLS is disabled
pub fn build_server_config(config: &TlsConfig) -> Result<Option<ServerConfig>, ServerError> {
    if !config.enabled {
        return Ok(None);
    }

    let cert_path = required(&config.cert, "cert")?;
    let key_path = required(&config.key, "key")?;
    let ca_path = required(&config.ca, "ca")?;

    let certs = load_certs(&cert_path)?;
    let key = load_private_key(&key_path)?;

    let mut roots = RootCertStore::empty();
    for cert in load_certs(&ca_path)? {
        roots
            .add(&cert)
            .map_err(|e| ServerError::Tls(format!("invalid CA certificate in {}: {}", ca_path, e)))?;
    }
    let verifier = AllowAnyAuthenticatedClient::new(roots).boxed();

    let mut server_config = ServerConfig::builder()
        .with_cipher_suites(rustls::DEFAULT_CIPHER_SUITES)
        .with_kx_groups(&[&kx_group::SECP384R1, &kx_group::SECP256R1, &kx_group::X25519])
        .with_protocol_versions(&[&version::TLS12, &version::TLS13])
        .map_err(|e| ServerError::Tls(e.to_string()))?
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Tls(format!("certificate and key do not match: {}", e)))?;

    server_config.session_storage = Arc::new(NoServerSessionStorage {});
    server_config.send_tls13_tickets = 0;
    server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Some(server_config))
}

fn required(value: &str, field: &str) -> Result<String, ServerError> {
    let resolved = actual_value(value);
    if resolved.is_empty() {
        return Err(ServerError::Tls(format!("tls {} path is not set", field)));
    }
    Ok(resolved)
}

/// Load every certificate from a PEM file
pub fn load_certs(path: &str) -> Result<Vec<Certificate>, ServerError> {
    let file = File::open(path)
        .map_err(|e| ServerError::Tls(format!("failed to open {}: {}", path, e)))?;
    let mut reader = BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .map(|cert| cert.map(|der| Certificate(der.as_ref().to_vec())))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Tls(format!("failed to parse certificates in {}: {}", path, e)))?;

    if certs.is_empty() {
        return Err(ServerError::Tls(format!("no certificates found in {}", path)));
    }
    Ok(certs)
}

/// Load the first private key from a PEM file
pub fn load_private_key(path: &str) -> Result<PrivateKey, ServerError> {
    let file = File::open(path)
        .map_err(|e| ServerError::Tls(format!("failed to open {}: {}", path, e)))?;
    let mut reader = BufReader::new(file);

    match rustls_pemfile::private_key(&mut reader) {
        Ok(Some(key)) => Ok(PrivateKey(key.secret_der().to_vec())),
        Ok(None) => Err(ServerError::Tls(format!("no private key found in {}", path))),
        Err(e) => Err(ServerError::Tls(format!("failed to parse private key in {}: {}", path, e))),
    }
}
