//! Reservation ledger on `PostgreSQL`.

use crate::db_error;
use async_trait::async_trait;
use campus_gsr_booking::ReservationStore;
use campus_gsr_core::{
    Booking, BookingId, GroupId, GsrError, Reservation, ReservationId, Result, RoomId, UserId,
};
use chrono::{DateTime, TimeDelta, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

macro_rules! booking_columns {
    () => {
        "id, reservation_id, user_id, upstream_id, room_id, upstream_room_id, room_name, start_time, end_time, cancelled"
    };
}

macro_rules! reservation_columns {
    () => {
        "id, start_time, end_time, creator, group_id, cancelled, reminder_sent"
    };
}

fn booking_from_row(row: &PgRow) -> Result<Booking> {
    let map = db_error("Failed to decode booking");
    Ok(Booking {
        id: BookingId(row.try_get("id").map_err(&map)?),
        reservation: ReservationId(row.try_get("reservation_id").map_err(&map)?),
        user: UserId(row.try_get("user_id").map_err(&map)?),
        upstream_id: row.try_get("upstream_id").map_err(&map)?,
        room: RoomId(row.try_get("room_id").map_err(&map)?),
        upstream_room_id: row.try_get("upstream_room_id").map_err(&map)?,
        room_name: row.try_get("room_name").map_err(&map)?,
        start: row.try_get("start_time").map_err(&map)?,
        end: row.try_get("end_time").map_err(&map)?,
        cancelled: row.try_get("cancelled").map_err(&map)?,
    })
}

fn reservation_from_row(row: &PgRow) -> Result<Reservation> {
    let map = db_error("Failed to decode reservation");
    Ok(Reservation {
        id: ReservationId(row.try_get("id").map_err(&map)?),
        start: row.try_get("start_time").map_err(&map)?,
        end: row.try_get("end_time").map_err(&map)?,
        creator: UserId(row.try_get("creator").map_err(&map)?),
        group: row.try_get::<Option<Uuid>, _>("group_id").map_err(&map)?.map(GroupId),
        cancelled: row.try_get("cancelled").map_err(&map)?,
        reminder_sent: row.try_get("reminder_sent").map_err(&map)?,
        bookings: Vec::new(),
    })
}

async fn insert_booking(tx: &mut Transaction<'_, Postgres>, booking: &Booking) -> Result<()> {
    sqlx::query(concat!(
        "INSERT INTO gsr_bookings (",
        booking_columns!(),
        ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
    ))
    .bind(booking.id.0)
    .bind(booking.reservation.0)
    .bind(booking.user.0)
    .bind(&booking.upstream_id)
    .bind(booking.room.0)
    .bind(booking.upstream_room_id)
    .bind(&booking.room_name)
    .bind(booking.start)
    .bind(booking.end)
    .bind(booking.cancelled)
    .execute(&mut **tx)
    .await
    .map_err(db_error("Failed to insert booking"))?;
    Ok(())
}

/// `PostgreSQL` reservation ledger.
#[derive(Clone)]
pub struct PostgresReservationStore {
    pool: PgPool,
}

impl PostgresReservationStore {
    /// Create a store over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn bookings_where(&self, sql: &'static str, id: Uuid) -> Result<Vec<Booking>> {
        sqlx::query(sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to load bookings"))?
            .iter()
            .map(booking_from_row)
            .collect()
    }

    async fn with_bookings(&self, mut reservation: Reservation) -> Result<Reservation> {
        reservation.bookings = self.bookings_for_reservation(reservation.id).await?;
        Ok(reservation)
    }
}

#[async_trait]
impl ReservationStore for PostgresReservationStore {
    async fn create_reservation(&self, reservation: &Reservation, first: &Booking) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_error("Failed to begin transaction"))?;

        sqlx::query(concat!(
            "INSERT INTO gsr_reservations (",
            reservation_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(reservation.id.0)
        .bind(reservation.start)
        .bind(reservation.end)
        .bind(reservation.creator.0)
        .bind(reservation.group.map(|g| g.0))
        .bind(reservation.cancelled)
        .bind(reservation.reminder_sent)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to insert reservation"))?;
        insert_booking(&mut tx, first).await?;

        tx.commit().await.map_err(db_error("Failed to commit reservation"))?;
        tracing::debug!(reservation_id = %reservation.id, "Reservation stored");
        Ok(())
    }

    async fn append_booking(&self, booking: &Booking) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_error("Failed to begin transaction"))?;

        sqlx::query("SELECT id FROM gsr_reservations WHERE id = $1 FOR UPDATE")
            .bind(booking.reservation.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error("Failed to lock reservation"))?
            .ok_or_else(|| GsrError::NotFound(format!("Reservation {} not found", booking.reservation)))?;
        insert_booking(&mut tx, booking).await?;

        tx.commit().await.map_err(db_error("Failed to commit booking"))?;
        Ok(())
    }

    async fn booking(&self, id: BookingId) -> Result<Option<Booking>> {
        sqlx::query(concat!("SELECT ", booking_columns!(), " FROM gsr_bookings WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to load booking"))?
            .as_ref()
            .map(booking_from_row)
            .transpose()
    }

    async fn booking_by_upstream_id(&self, upstream_id: &str) -> Result<Option<Booking>> {
        sqlx::query(concat!("SELECT ", booking_columns!(), " FROM gsr_bookings WHERE upstream_id = $1"))
            .bind(upstream_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to load booking"))?
            .as_ref()
            .map(booking_from_row)
            .transpose()
    }

    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        let row = sqlx::query(concat!("SELECT ", reservation_columns!(), " FROM gsr_reservations WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to load reservation"))?;
        match row {
            Some(row) => Ok(Some(self.with_bookings(reservation_from_row(&row)?).await?)),
            None => Ok(None),
        }
    }

    async fn bookings_for_reservation(&self, id: ReservationId) -> Result<Vec<Booking>> {
        self.bookings_where(
            concat!(
                "SELECT ",
                booking_columns!(),
                " FROM gsr_bookings WHERE reservation_id = $1 ORDER BY start_time"
            ),
            id.0,
        )
        .await
    }

    async fn cancel_booking(&self, id: BookingId) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(db_error("Failed to begin transaction"))?;

        let reservation_id: Uuid = sqlx::query(
            r"
            SELECT r.id FROM gsr_reservations r
            JOIN gsr_bookings b ON b.reservation_id = r.id
            WHERE b.id = $1
            FOR UPDATE OF r
            ",
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Failed to lock reservation"))?
        .ok_or_else(|| GsrError::NotFound(format!("Booking {id} not found")))?
        .try_get("id")
        .map_err(db_error("Failed to decode reservation id"))?;

        sqlx::query("UPDATE gsr_bookings SET cancelled = TRUE WHERE id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to cancel booking"))?;

        let all_cancelled: bool = sqlx::query(
            "SELECT COALESCE(bool_and(cancelled), TRUE) AS all_cancelled FROM gsr_bookings WHERE reservation_id = $1",
        )
        .bind(reservation_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("Failed to check siblings"))?
        .try_get("all_cancelled")
        .map_err(db_error("Failed to decode sibling state"))?;

        if all_cancelled {
            sqlx::query("UPDATE gsr_reservations SET cancelled = TRUE WHERE id = $1")
                .bind(reservation_id)
                .execute(&mut *tx)
                .await
                .map_err(db_error("Failed to cancel reservation"))?;
        }

        tx.commit().await.map_err(db_error("Failed to commit cancellation"))?;
        tracing::debug!(booking_id = %id, all_cancelled, "Booking marked cancelled");
        Ok(all_cancelled)
    }

    async fn active_bookings_for_user(&self, user: UserId, now: DateTime<Utc>) -> Result<Vec<Booking>> {
        sqlx::query(concat!(
            "SELECT ",
            booking_columns!(),
            " FROM gsr_bookings WHERE user_id = $1 AND NOT cancelled AND end_time >= $2 ORDER BY start_time"
        ))
        .bind(user.0)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load active bookings"))?
        .iter()
        .map(booking_from_row)
        .collect()
    }

    async fn bookings_for_user_between(
        &self,
        user: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Booking>> {
        sqlx::query(concat!(
            "SELECT ",
            booking_columns!(),
            " FROM gsr_bookings WHERE user_id = $1 AND NOT cancelled AND start_time < $3 AND end_time > $2",
            " ORDER BY start_time"
        ))
        .bind(user.0)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load bookings"))?
        .iter()
        .map(booking_from_row)
        .collect()
    }

    async fn list_bookings(&self, user: UserId, include_created: bool, now: DateTime<Utc>) -> Result<Vec<Booking>> {
        sqlx::query(concat!(
            "SELECT ",
            booking_columns!(),
            " FROM gsr_bookings WHERE NOT cancelled AND end_time >= $2 AND (user_id = $1 OR ($3 AND reservation_id IN",
            " (SELECT id FROM gsr_reservations WHERE creator = $1))) ORDER BY start_time"
        ))
        .bind(user.0)
        .bind(now)
        .bind(include_created)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to list bookings"))?
        .iter()
        .map(booking_from_row)
        .collect()
    }

    async fn due_reminders(&self, now: DateTime<Utc>, lead: TimeDelta) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            reservation_columns!(),
            " FROM gsr_reservations WHERE NOT cancelled AND NOT reminder_sent",
            " AND start_time >= $1 AND start_time < $2 ORDER BY start_time"
        ))
        .bind(now)
        .bind(now + lead)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load due reminders"))?;

        let mut due = Vec::with_capacity(rows.len());
        for row in &rows {
            due.push(self.with_bookings(reservation_from_row(row)?).await?);
        }
        Ok(due)
    }

    async fn mark_reminder_sent(&self, id: ReservationId) -> Result<()> {
        let result = sqlx::query("UPDATE gsr_reservations SET reminder_sent = TRUE WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to mark reminder"))?;
        if result.rows_affected() == 0 {
            return Err(GsrError::NotFound(format!("Reservation {id} not found")));
        }
        Ok(())
    }
}
