//! Share codes on `PostgreSQL`.

use crate::db_error;
use async_trait::async_trait;
use campus_gsr_booking::ShareCodeStore;
use campus_gsr_core::{BookingId, Result, ShareCode, UserId};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

fn share_code_from_row(row: &PgRow) -> Result<ShareCode> {
    let map = db_error("Failed to decode share code");
    Ok(ShareCode {
        code: row.try_get("code").map_err(&map)?,
        booking: BookingId(row.try_get("booking_id").map_err(&map)?),
        owner: UserId(row.try_get("owner").map_err(&map)?),
        created_at: row.try_get("created_at").map_err(&map)?,
    })
}

/// `PostgreSQL` share code store.
///
/// Both the code and the booking are unique; either collision surfaces as
/// `Conflict`.
#[derive(Clone)]
pub struct PostgresShareCodeStore {
    pool: PgPool,
}

impl PostgresShareCodeStore {
    /// Create a store over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ShareCodeStore for PostgresShareCodeStore {
    async fn insert(&self, code: &ShareCode) -> Result<()> {
        sqlx::query("INSERT INTO gsr_share_codes (code, booking_id, owner, created_at) VALUES ($1, $2, $3, $4)")
            .bind(&code.code)
            .bind(code.booking.0)
            .bind(code.owner.0)
            .bind(code.created_at)
            .execute(&self.pool)
            .await
            .map_err(db_error("Share code"))?;
        Ok(())
    }

    async fn by_code(&self, code: &str) -> Result<Option<ShareCode>> {
        sqlx::query("SELECT code, booking_id, owner, created_at FROM gsr_share_codes WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to load share code"))?
            .as_ref()
            .map(share_code_from_row)
            .transpose()
    }

    async fn by_booking(&self, booking: BookingId) -> Result<Option<ShareCode>> {
        sqlx::query("SELECT code, booking_id, owner, created_at FROM gsr_share_codes WHERE booking_id = $1")
            .bind(booking.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to load share code"))?
            .as_ref()
            .map(share_code_from_row)
            .transpose()
    }

    async fn delete(&self, code: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM gsr_share_codes WHERE code = $1")
            .bind(code)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to delete share code"))?;
        Ok(result.rows_affected() > 0)
    }
}
