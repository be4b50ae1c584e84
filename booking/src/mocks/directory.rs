//! Mock users and groups.

use super::lock;
use crate::providers::DirectoryStore;
use async_trait::async_trait;
use campus_gsr_core::{Entitlement, Group, GroupId, GroupMember, GsrError, Result, User, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Directory {
    users: HashMap<UserId, User>,
    groups: HashMap<GroupId, Group>,
    members: Vec<GroupMember>,
}

/// Mock directory of users, groups and memberships.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    inner: Arc<Mutex<Directory>>,
}

impl InMemoryDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a user.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn insert_user(&self, user: User) -> Result<()> {
        lock(&self.inner)?.users.insert(user.id, user);
        Ok(())
    }

    /// Create a group named `name`.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn insert_group(&self, name: &str) -> Result<Group> {
        let group = Group {
            id: GroupId::new(),
            name: name.to_string(),
        };
        lock(&self.inner)?.groups.insert(group.id, group.clone());
        Ok(group)
    }

    /// Add a membership, registering its user as well.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn add_member(&self, member: GroupMember) -> Result<()> {
        let mut inner = lock(&self.inner)?;
        inner.users.entry(member.user.id).or_insert_with(|| member.user.clone());
        inner.members.push(member);
        Ok(())
    }
}

#[async_trait]
impl DirectoryStore for InMemoryDirectory {
    async fn user(&self, id: UserId) -> Result<Option<User>> {
        Ok(lock(&self.inner)?.users.get(&id).cloned())
    }

    async fn group(&self, id: GroupId) -> Result<Option<Group>> {
        Ok(lock(&self.inner)?.groups.get(&id).cloned())
    }

    async fn members(&self, group: GroupId) -> Result<Vec<GroupMember>> {
        Ok(lock(&self.inner)?
            .members
            .iter()
            .filter(|m| m.group == group)
            .cloned()
            .collect())
    }

    async fn set_member_entitlements(
        &self,
        group: GroupId,
        user: UserId,
        is_wharton: Entitlement,
        is_engineering: Entitlement,
    ) -> Result<()> {
        let mut inner = lock(&self.inner)?;
        let member = inner
            .members
            .iter_mut()
            .find(|m| m.group == group && m.user.id == user)
            .ok_or_else(|| GsrError::NotFound("Membership not found".to_string()))?;
        member.is_wharton = is_wharton;
        member.is_engineering = is_engineering;
        Ok(())
    }

    async fn set_user_entitlements(&self, user: UserId, is_wharton: Entitlement, is_engineering: Entitlement) -> Result<()> {
        let mut inner = lock(&self.inner)?;
        let row = inner
            .users
            .get_mut(&user)
            .ok_or_else(|| GsrError::NotFound(format!("User {user} not found")))?;
        row.is_wharton = is_wharton;
        row.is_engineering = is_engineering;
        for member in inner.members.iter_mut().filter(|m| m.user.id == user) {
            member.user.is_wharton = is_wharton;
            member.user.is_engineering = is_engineering;
        }
        Ok(())
    }
}
