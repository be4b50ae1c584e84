//! `PostgreSQL` storage for the campus GSR booking service.
//!
//! Implements every storage trait from `campus-gsr-booking` on sqlx:
//!
//! - [`PostgresReservationStore`]: reservations and bookings
//! - [`PostgresShareCodeStore`]: share codes
//! - [`PostgresDirectory`]: users, groups and memberships
//!
//! Multi-row writes run in one transaction.
//!
//! # Example
//!
//! ```no_run
//! use campus_gsr_postgres::{connect, migrate, PostgresReservationStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = connect("postgres://localhost/campus_gsr", 10).await?;
//! migrate(&pool).await?;
//! let reservations = PostgresReservationStore::new(pool);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod directory;
mod reservations;
mod share_codes;

pub use directory::PostgresDirectory;
pub use reservations::PostgresReservationStore;
pub use share_codes::PostgresShareCodeStore;

use campus_gsr_core::{GsrError, Result};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`GsrError::Storage`] if the database is unreachable.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| GsrError::Storage(format!("Failed to connect: {e}")))
}

/// Run database migrations.
///
/// # Errors
///
/// Returns [`GsrError::Storage`] if migrations fail.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| GsrError::Storage(format!("Migration failed: {e}")))?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Map a sqlx error, turning unique violations into `Conflict`.
fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> GsrError {
    move |e| {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                return GsrError::Conflict(format!("{context}: already exists"));
            }
        }
        GsrError::Storage(format!("{context}: {e}"))
    }
}
