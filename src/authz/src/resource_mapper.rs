//! Per-request translation into policy-service access checks

use crate::error::{AuthzError, Result};
use crate::pattern::RequestFields;
use crate::resolver::{trim_resource, Resolver};
use crate::types::{AccessCheck, AccessCheckRequest, AccessCheckResult};
use std::sync::Arc;
use tracing::debug;

/// Maps one access-check request to the checks that would grant it
pub trait ResourceMapper: Send + Sync {
    fn map_resource(&self, request: &AccessCheckRequest) -> Result<AccessCheckResult>;
}

/// Resource mapper backed by a [`Resolver`]
#[derive(Debug, Clone)]
pub struct AthenzResourceMapper {
    resolver: Arc<Resolver>,
    trace: bool,
}

/// Request fields before mapping
struct Extracted {
    verb: String,
    namespace: String,
    api_group: String,
    resource: String,
    name: String,
}

impl AthenzResourceMapper {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self {
            resolver,
            trace: false,
        }
    }

    /// Log every mapping decision
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    fn extract(&self, request: &AccessCheckRequest) -> Result<Extracted> {
        if let Some(attrs) = &request.resource_attributes {
            let namespace = if attrs.namespace.is_empty() {
                self.resolver.empty_namespace().to_string()
            } else {
                attrs.namespace.clone()
            };
            let resource = if attrs.subresource.is_empty() {
                attrs.resource.clone()
            } else {
                format!("{}.{}", attrs.resource, attrs.subresource)
            };
            return Ok(Extracted {
                verb: attrs.verb.clone(),
                namespace,
                api_group: attrs.group.clone(),
                resource,
                name: attrs.name.clone(),
            });
        }

        if let Some(attrs) = &request.non_resource_attributes {
            return Ok(Extracted {
                verb: attrs.verb.clone(),
                namespace: self.resolver.non_resource_namespace().to_string(),
                api_group: self.resolver.non_resource_group().to_string(),
                resource: attrs.path.clone(),
                name: String::new(),
            });
        }

        Err(AuthzError::InvalidInput(
            "request has neither resource nor non-resource attributes".to_string(),
        ))
    }
}

impl ResourceMapper for AthenzResourceMapper {
    fn map_resource(&self, request: &AccessCheckRequest) -> Result<AccessCheckResult> {
        let resolver = &self.resolver;
        let original = self.extract(request)?;

        let action = resolver.map_verb_action(&original.verb);
        let group = resolver.map_api_group(&original.api_group);
        let resource = resolver.map_resource(&original.resource);
        let name = resolver.map_resource_name(&original.name);
        let identity = resolver.principal_from_user(&request.user, &request.groups);

        let original_fields = RequestFields::new(
            &original.verb,
            &original.namespace,
            &original.api_group,
            &original.resource,
            &original.name,
        );
        if !resolver.is_allowed(&original_fields) {
            if self.trace {
                debug!(identity = %identity, request = %original_fields.canonical(), "Request rejected by deny list");
            }
            return Err(AuthzError::Rejected {
                identity,
                verb: original.verb,
                namespace: original.namespace,
                api_group: original.api_group,
                resource: original.resource,
                name: original.name,
            });
        }

        let domains = resolver.build_domains_from_namespace(&original.namespace);
        let mapped_fields =
            RequestFields::new(&action, &original.namespace, &group, &resource, &name);

        let checks: Vec<AccessCheck> = if resolver.is_admin_access(&mapped_fields) {
            let admin_domain = resolver.admin_domain(&original.namespace);
            domains
                .iter()
                .flat_map(|domain| {
                    [
                        format!("{}:{}.{}.{}.{}", admin_domain, group, domain, resource, name),
                        format!("{}:{}.{}.{}", admin_domain, group, resource, name),
                    ]
                })
                .map(|candidate| AccessCheck::new(action.clone(), trim_resource(&candidate)))
                .collect()
        } else {
            domains
                .iter()
                .map(|domain| format!("{}:{}.{}.{}", domain, group, resource, name))
                .map(|candidate| AccessCheck::new(action.clone(), trim_resource(&candidate)))
                .collect()
        };

        if self.trace {
            debug!(identity = %identity, checks = ?checks, "Request mapped");
        }

        Ok(AccessCheckResult { identity, checks })
    }
}
