//! Webhook listeners for the authorization gateway
//!
//! - `dispatcher`: per-route method filter, timeout and panic containment
//! - `routes` / `handlers`: `/authn` and `/authz` protocol handlers
//! - `athenz`: policy-service client
//! - `health`: liveness listener router
//! - `tls`: server transport credentials
//! - `server`: dual-listener lifecycle

pub mod athenz;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod state;
pub mod tls;

pub use athenz::{AthenzClient, AthenzConfig, PolicyClient, PolicyPrincipal};
pub use dispatcher::Dispatcher;
pub use error::{ApiError, Result, ServerError};
pub use routes::{create_router, Route};
pub use server::{AxumListener, Listener, ListenerKind, ServiceLifecycle};
pub use state::AppState;
pub use tls::TlsConfig;

/// Default dispatcher timeout
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(3);

/// Default bounded shutdown deadline per listener
pub const DEFAULT_SHUTDOWN_DURATION: std::time::Duration = std::time::Duration::from_secs(5);

/// Default wait before the traffic listener starts shutting down
pub const DEFAULT_PROBE_WAIT: std::time::Duration = std::time::Duration::from_secs(3);
