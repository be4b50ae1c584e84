//! Refreshes cached entitlement flags for a group's members.

use crate::providers::DirectoryStore;
use campus_gsr_core::{Entitlement, GroupId, Result, User};
use campus_gsr_upstream::{UpstreamClient, Upstreams};
use std::sync::Arc;

/// Outcome of one refresh run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Memberships written.
    pub refreshed: usize,
    /// Upstream checks that failed and were recorded as unknown.
    pub failed: usize,
}

/// Asks Wharton and engineering whether each member is entitled and writes
/// the tri-state flags to both the membership and the user.
pub struct EntitlementRefresher {
    directory: Arc<dyn DirectoryStore>,
    wharton: Arc<dyn UpstreamClient>,
    engineering: Arc<dyn UpstreamClient>,
}

impl EntitlementRefresher {
    /// Create a refresher over the production upstreams.
    #[must_use]
    pub fn new(directory: Arc<dyn DirectoryStore>, upstreams: &Upstreams) -> Self {
        Self {
            directory,
            wharton: Arc::clone(&upstreams.wharton),
            engineering: Arc::clone(&upstreams.engineering),
        }
    }

    async fn check(client: &dyn UpstreamClient, user: &User, failed: &mut usize) -> Entitlement {
        match client.entitlement(user).await {
            Ok(entitled) => entitled.into(),
            Err(e) => {
                *failed += 1;
                tracing::warn!(provider = %client.provider(), user_id = %user.id, error = %e, "Entitlement check failed");
                Entitlement::Unknown
            }
        }
    }

    /// Refresh every accepted member of `group`.
    ///
    /// # Errors
    ///
    /// `Storage` if the directory cannot be read or written. Upstream
    /// failures never abort the batch.
    #[tracing::instrument(skip(self))]
    pub async fn refresh_group(&self, group: GroupId) -> Result<RefreshSummary> {
        let mut summary = RefreshSummary::default();
        for member in self.directory.members(group).await?.into_iter().filter(|m| m.accepted) {
            let is_wharton = Self::check(self.wharton.as_ref(), &member.user, &mut summary.failed).await;
            let is_engineering = Self::check(self.engineering.as_ref(), &member.user, &mut summary.failed).await;

            self.directory
                .set_member_entitlements(group, member.user.id, is_wharton, is_engineering)
                .await?;
            self.directory
                .set_user_entitlements(member.user.id, is_wharton, is_engineering)
                .await?;
            summary.refreshed += 1;
        }
        tracing::info!(refreshed = summary.refreshed, failed = summary.failed, "Entitlements refreshed");
        Ok(summary)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mocks::{InMemoryDirectory, MockUpstream};
    use campus_gsr_core::Provider;
    use campus_gsr_testing::fixtures;

    #[tokio::test]
    async fn writes_flags_and_survives_upstream_failures() {
        let directory = Arc::new(InMemoryDirectory::new());
        let group = directory.insert_group("Study Buddies").unwrap();
        let alice = fixtures::user("alice", "alice@wharton.upenn.edu");
        let bob = fixtures::user("bob", "bob@seas.upenn.edu");
        let carol = fixtures::user("carol", "carol@sas.upenn.edu");
        let mut pending = fixtures::member(&carol, group.id);
        pending.accepted = false;
        directory.add_member(fixtures::member(&alice, group.id)).unwrap();
        directory.add_member(fixtures::member(&bob, group.id)).unwrap();
        directory.add_member(pending).unwrap();

        let wharton = MockUpstream::new(Provider::Wharton);
        wharton.entitle("alice").unwrap();
        let engineering = MockUpstream::new(Provider::Engineering);
        engineering.entitle("bob").unwrap();
        engineering.fail_entitlement_for("alice").unwrap();
        let upstreams = Upstreams {
            wharton: Arc::new(wharton),
            libcal: Arc::new(MockUpstream::new(Provider::LibCal)),
            engineering: Arc::new(engineering),
        };

        let refresher = EntitlementRefresher::new(directory.clone(), &upstreams);
        let summary = refresher.refresh_group(group.id).await.unwrap();
        assert_eq!(summary, RefreshSummary { refreshed: 2, failed: 1 });

        let members = directory.members(group.id).await.unwrap();
        let flags = |id| {
            let m = members.iter().find(|m| m.user.id == id).unwrap();
            (m.is_wharton, m.is_engineering)
        };
        assert_eq!(flags(alice.id), (Entitlement::Yes, Entitlement::Unknown));
        assert_eq!(flags(bob.id), (Entitlement::No, Entitlement::Yes));
        assert_eq!(flags(carol.id), (Entitlement::Unknown, Entitlement::Unknown));

        let stored = directory.user(bob.id).await.unwrap().unwrap();
        assert_eq!(stored.is_engineering, Entitlement::Yes);
    }
}
