//! # Garm Authorization Mapping
//!
//! Translates cluster access-check requests into access checks against a
//! domain-scoped policy service.
//!
//! ## Components
//!
//! - **pattern**: five-field wildcard rules with cached compiled patterns
//! - **platform**: immutable per-deployment mapping rules
//! - **resolver**: domain construction, principal mapping, field mapping,
//!   allow/deny and admin-path evaluation
//! - **resource_mapper**: per-request orchestration producing access checks
//! - **user_mapper**: policy-service identity to cluster user record
//!
//! ## Example
//!
//! ```rust
//! use garm_authz::{AccessCheckRequest, AthenzResourceMapper, PlatformRules, ResourceMapper, Resolver};
//! use garm_authz::types::ResourceAttributes;
//! use std::sync::Arc;
//!
//! let rules = PlatformRules {
//!     service_domains: vec!["cluster._namespace_".to_string()],
//!     ..Default::default()
//! };
//! let resolver = Arc::new(Resolver::new(rules).unwrap());
//! let mapper = AthenzResourceMapper::new(resolver);
//!
//! let request = AccessCheckRequest {
//!     resource_attributes: Some(ResourceAttributes {
//!         verb: "get".to_string(),
//!         namespace: "team-a".to_string(),
//!         resource: "pods".to_string(),
//!         ..Default::default()
//!     }),
//!     user: "alice".to_string(),
//!     ..Default::default()
//! };
//!
//! let result = mapper.map_resource(&request).unwrap();
//! assert_eq!(result.checks[0].resource, "cluster.team-a:pods");
//! ```

pub mod error;
pub mod pattern;
pub mod platform;
pub mod resolver;
pub mod resource_mapper;
pub mod types;
pub mod user_mapper;

pub use error::{AuthzError, Result};
pub use pattern::{AccessRule, RequestFields, RuleSet};
pub use platform::{DefaultHooks, PlatformHooks, PlatformKind, PlatformRules};
pub use resolver::{Resolver, NAMESPACE_PLACEHOLDER};
pub use resource_mapper::{AthenzResourceMapper, ResourceMapper};
pub use types::{AccessCheck, AccessCheckRequest, AccessCheckResult, UserInfo};
pub use user_mapper::{AthenzUserMapper, UserMapper};
