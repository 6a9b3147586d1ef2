//! # Garm Token
//!
//! Lifecycle of the short-lived credential used to call the policy service.
//!
//! A [`TokenManager`] owns a [`TokenSource`] (a signer-backed builder or a
//! file written by an external agent), refreshes it once immediately and then
//! on a fixed period, and publishes each new value atomically. Readers never
//! block the refresher and never observe a partial value.

pub mod error;
pub mod manager;
pub mod ntoken;
pub mod signer;
pub mod source;

pub use error::{Result, TokenError};
pub use manager::{TokenConfig, TokenManager};
pub use ntoken::{validate_shape, NToken, NTokenBuilder};
pub use signer::{PemSigner, TokenSigner};
pub use source::{FileTokenSource, SignedTokenSource, TokenSource};
