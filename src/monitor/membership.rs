use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};

use super::registry::{Group, GroupKind, Membership};
use crate::platform::{PlatformClient, PlatformError};

/// Makes sure the monitoring identity is a member of every group it reads.
///
/// Joins are issued one at a time with a fixed pause after each success.
pub struct MembershipManager<'a> {
    client: &'a dyn PlatformClient,
    join_delay: Duration,
}

impl<'a> MembershipManager<'a> {
    pub fn new(client: &'a dyn PlatformClient, join_delay: Duration) -> Self {
        Self { client, join_delay }
    }

    /// Join `group` if needed. Rate limits suspend and retry the same group;
    /// other failures are logged and leave the group as it was.
    pub async fn ensure_membership(&self, group: &mut Group) {
        match (group.kind, group.membership) {
            (GroupKind::Unresolvable, _) => return,
            (GroupKind::Channel, _) => return,
            (GroupKind::Group, Membership::Member) => {
                info!("Already a member of {}", group.identifier);
                return;
            }
            (GroupKind::Group, _) => {}
        }

        info!("Not a member of {}, trying to join...", group.identifier);
        loop {
            match self.client.join_channel(&group.identifier).await {
                Ok(()) => {
                    info!("Joined {}", group.identifier);
                    group.membership = Membership::Member;
                    // Let the platform propagate the new membership
                    sleep(self.join_delay).await;
                    return;
                }
                Err(PlatformError::RateLimited(wait)) => {
                    warn!(
                        "Rate limited while joining {}, waiting {}s before retrying",
                        group.identifier,
                        wait.as_secs()
                    );
                    sleep(wait).await;
                }
                Err(PlatformError::Protocol(reason)) => {
                    error!("Protocol error joining {}: {}", group.identifier, reason);
                    return;
                }
                Err(e) => {
                    error!("Failed to join {}: {:#}", group.identifier, e);
                    return;
                }
            }
        }
    }

    /// Run the membership pass over all groups, in order.
    pub async fn ensure_all(&self, groups: &mut [Group]) {
        for group in groups.iter_mut() {
            self.ensure_membership(group).await;
        }
    }
}
