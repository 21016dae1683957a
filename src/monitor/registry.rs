use tokio::time::sleep;
use tracing::{info, warn};

use crate::platform::{ChatHandle, PlatformClient, PlatformError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Channel,
    Group,
    Unresolvable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Member,
    NotMember,
    Unknown,
}

/// A configured group and what the platform told us about it this cycle
#[derive(Debug, Clone)]
pub struct Group {
    pub identifier: String,
    pub handle: Option<ChatHandle>,
    pub kind: GroupKind,
    pub membership: Membership,
}

impl Group {
    fn unresolvable(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            handle: None,
            kind: GroupKind::Unresolvable,
            membership: Membership::Unknown,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.kind != GroupKind::Unresolvable
    }
}

/// Resolves configured identifiers into live entities
pub struct GroupRegistry<'a> {
    client: &'a dyn PlatformClient,
}

impl<'a> GroupRegistry<'a> {
    pub fn new(client: &'a dyn PlatformClient) -> Self {
        Self { client }
    }

    /// Resolve one identifier. Rate limits are waited out and retried; any
    /// other failure marks the group unresolvable for this cycle.
    pub async fn resolve_one(&self, identifier: &str) -> Group {
        info!("Checking group: {}", identifier);
        loop {
            match self.client.get_entity(identifier).await {
                Ok(entity) if entity.broadcast => {
                    info!("{} is a channel, membership check not needed", identifier);
                    return Group {
                        identifier: identifier.to_string(),
                        handle: Some(entity.handle),
                        kind: GroupKind::Channel,
                        membership: Membership::Unknown,
                    };
                }
                Ok(entity) => {
                    return Group {
                        identifier: identifier.to_string(),
                        handle: Some(entity.handle),
                        kind: GroupKind::Group,
                        membership: if entity.joined {
                            Membership::Member
                        } else {
                            Membership::NotMember
                        },
                    };
                }
                Err(PlatformError::RateLimited(wait)) => {
                    warn!(
                        "Rate limited while resolving {}, waiting {}s",
                        identifier,
                        wait.as_secs()
                    );
                    sleep(wait).await;
                }
                Err(e) => {
                    warn!(
                        "Group {} is unavailable, skipping it this cycle: {}",
                        identifier, e
                    );
                    return Group::unresolvable(identifier);
                }
            }
        }
    }

    /// Resolve every identifier in order. Never fails as a whole.
    pub async fn resolve(&self, identifiers: &[String]) -> Vec<Group> {
        let mut groups = Vec::with_capacity(identifiers.len());
        for identifier in identifiers {
            groups.push(self.resolve_one(identifier).await);
        }
        groups
    }
}
