//! Users, groups and memberships as the booking core sees them.

use async_trait::async_trait;
use campus_gsr_core::{Entitlement, Group, GroupId, GroupMember, Result, User, UserId};

/// Read access to users and groups, plus the cached entitlement flags.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// User by ID.
    ///
    /// # Errors
    ///
    /// `Storage` on database failure.
    async fn user(&self, id: UserId) -> Result<Option<User>>;

    /// Group by ID.
    ///
    /// # Errors
    ///
    /// `Storage` on database failure.
    async fn group(&self, id: GroupId) -> Result<Option<Group>>;

    /// All memberships of a group, accepted or not.
    ///
    /// # Errors
    ///
    /// `Storage` on database failure.
    async fn members(&self, group: GroupId) -> Result<Vec<GroupMember>>;

    /// Overwrite the cached flags on one membership.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the membership does not exist
    /// - `Storage` on database failure
    async fn set_member_entitlements(
        &self,
        group: GroupId,
        user: UserId,
        is_wharton: Entitlement,
        is_engineering: Entitlement,
    ) -> Result<()>;

    /// Overwrite the cached flags on a user.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the user does not exist
    /// - `Storage` on database failure
    async fn set_user_entitlements(&self, user: UserId, is_wharton: Entitlement, is_engineering: Entitlement) -> Result<()>;
}
