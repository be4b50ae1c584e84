//! Users, groups and memberships on `PostgreSQL`.

use crate::db_error;
use async_trait::async_trait;
use campus_gsr_booking::DirectoryStore;
use campus_gsr_core::{Entitlement, Group, GroupId, GroupMember, GsrError, Result, User, UserId};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

fn user_from_row(row: &PgRow, wharton: &str, engineering: &str) -> Result<User> {
    let map = db_error("Failed to decode user");
    let directory_id: Option<i64> = row.try_get("directory_id").map_err(&map)?;
    Ok(User {
        id: UserId(row.try_get("id").map_err(&map)?),
        username: row.try_get("username").map_err(&map)?,
        first_name: row.try_get("first_name").map_err(&map)?,
        last_name: row.try_get("last_name").map_err(&map)?,
        email: row.try_get("email").map_err(&map)?,
        directory_id: directory_id.and_then(|id| u64::try_from(id).ok()),
        is_wharton: row.try_get::<Option<bool>, _>(wharton).map_err(&map)?.into(),
        is_engineering: row.try_get::<Option<bool>, _>(engineering).map_err(&map)?.into(),
    })
}

/// `PostgreSQL` directory of users and groups.
#[derive(Clone)]
pub struct PostgresDirectory {
    pool: PgPool,
}

impl PostgresDirectory {
    /// Create a directory over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or update a user.
    ///
    /// # Errors
    ///
    /// `Conflict` if another user has the username; `Storage` otherwise.
    pub async fn upsert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO gsr_users
                (id, username, first_name, last_name, email, directory_id, is_wharton, is_engineering)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                username = EXCLUDED.username,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                email = EXCLUDED.email,
                directory_id = EXCLUDED.directory_id,
                is_wharton = EXCLUDED.is_wharton,
                is_engineering = EXCLUDED.is_engineering
            ",
        )
        .bind(user.id.0)
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(user.directory_id.and_then(|id| i64::try_from(id).ok()))
        .bind(user.is_wharton.as_option())
        .bind(user.is_engineering.as_option())
        .execute(&self.pool)
        .await
        .map_err(db_error("User"))?;
        Ok(())
    }

    /// Create a group.
    ///
    /// # Errors
    ///
    /// `Conflict` on duplicate ID; `Storage` otherwise.
    pub async fn insert_group(&self, group: &Group) -> Result<()> {
        sqlx::query("INSERT INTO gsr_groups (id, name) VALUES ($1, $2)")
            .bind(group.id.0)
            .bind(&group.name)
            .execute(&self.pool)
            .await
            .map_err(db_error("Group"))?;
        Ok(())
    }

    /// Insert or update a membership. The user must exist.
    ///
    /// # Errors
    ///
    /// `Storage` on failure, including unknown user or group.
    pub async fn upsert_member(&self, member: &GroupMember) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO gsr_group_members
                (group_id, user_id, accepted, pennkey_allowed, is_wharton, is_engineering)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (group_id, user_id) DO UPDATE SET
                accepted = EXCLUDED.accepted,
                pennkey_allowed = EXCLUDED.pennkey_allowed,
                is_wharton = EXCLUDED.is_wharton,
                is_engineering = EXCLUDED.is_engineering
            ",
        )
        .bind(member.group.0)
        .bind(member.user.id.0)
        .bind(member.accepted)
        .bind(member.pennkey_allowed)
        .bind(member.is_wharton.as_option())
        .bind(member.is_engineering.as_option())
        .execute(&self.pool)
        .await
        .map_err(db_error("Membership"))?;
        Ok(())
    }
}

#[async_trait]
impl DirectoryStore for PostgresDirectory {
    async fn user(&self, id: UserId) -> Result<Option<User>> {
        sqlx::query(
            r"
            SELECT id, username, first_name, last_name, email, directory_id, is_wharton, is_engineering
            FROM gsr_users WHERE id = $1
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("Failed to load user"))?
        .map(|row| user_from_row(&row, "is_wharton", "is_engineering"))
        .transpose()
    }

    async fn group(&self, id: GroupId) -> Result<Option<Group>> {
        let row = sqlx::query("SELECT id, name FROM gsr_groups WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to load group"))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let map = db_error("Failed to decode group");
        Ok(Some(Group {
            id: GroupId(row.try_get("id").map_err(&map)?),
            name: row.try_get("name").map_err(&map)?,
        }))
    }

    async fn members(&self, group: GroupId) -> Result<Vec<GroupMember>> {
        let rows = sqlx::query(
            r"
            SELECT u.id, u.username, u.first_name, u.last_name, u.email, u.directory_id,
                   u.is_wharton AS user_is_wharton, u.is_engineering AS user_is_engineering,
                   m.accepted, m.pennkey_allowed, m.is_wharton, m.is_engineering
            FROM gsr_group_members m
            JOIN gsr_users u ON u.id = m.user_id
            WHERE m.group_id = $1
            ORDER BY u.username
            ",
        )
        .bind(group.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load members"))?;

        let map = db_error("Failed to decode membership");
        rows.iter()
            .map(|row| -> Result<GroupMember> {
                Ok(GroupMember {
                    user: user_from_row(row, "user_is_wharton", "user_is_engineering")?,
                    group,
                    accepted: row.try_get("accepted").map_err(&map)?,
                    pennkey_allowed: row.try_get("pennkey_allowed").map_err(&map)?,
                    is_wharton: row.try_get::<Option<bool>, _>("is_wharton").map_err(&map)?.into(),
                    is_engineering: row.try_get::<Option<bool>, _>("is_engineering").map_err(&map)?.into(),
                })
            })
            .collect()
    }

    async fn set_member_entitlements(
        &self,
        group: GroupId,
        user: UserId,
        is_wharton: Entitlement,
        is_engineering: Entitlement,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE gsr_group_members SET is_wharton = $3, is_engineering = $4 WHERE group_id = $1 AND user_id = $2",
        )
        .bind(group.0)
        .bind(user.0)
        .bind(is_wharton.as_option())
        .bind(is_engineering.as_option())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to update membership"))?;
        if result.rows_affected() == 0 {
            return Err(GsrError::NotFound("Membership not found".to_string()));
        }
        Ok(())
    }

    async fn set_user_entitlements(&self, user: UserId, is_wharton: Entitlement, is_engineering: Entitlement) -> Result<()> {
        let result = sqlx::query("UPDATE gsr_users SET is_wharton = $2, is_engineering = $3 WHERE id = $1")
            .bind(user.0)
            .bind(is_wharton.as_option())
            .bind(is_engineering.as_option())
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to update user"))?;
        if result.rows_affected() == 0 {
            return Err(GsrError::NotFound(format!("User {user} not found")));
        }
        Ok(())
    }
}
