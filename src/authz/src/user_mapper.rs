//! Policy-service identity to cluster user record

use crate::error::Result;
use crate::types::UserInfo;

/// Maps an authenticated (domain, service) pair to a cluster user
pub trait UserMapper: Send + Sync {
    fn map_user(&self, domain: &str, service: &str) -> Result<UserInfo>;
}

/// User mapper naming users `domain.service` with a fixed group list
#[derive(Debug, Clone, Default)]
pub struct AthenzUserMapper {
    groups: Vec<String>,
}

impl AthenzUserMapper {
    pub fn new(groups: Vec<String>) -> Self {
        Self { groups }
    }
}

impl UserMapper for AthenzUserMapper {
    fn map_user(&self, domain: &str, service: &str) -> Result<UserInfo> {
        let principal = format!("{}.{}", domain, service);
        Ok(UserInfo {
            username: principal.clone(),
            uid: principal,
            groups: self.groups.clone(),
        })
    }
}
