//! GSR booking HTTP server.
//!
//! Reads configuration from the environment (and `.env`), migrates the
//! database, and serves the API until Ctrl+C or SIGTERM.

use anyhow::Context;
use campus_gsr_booking::{BookingOrchestrator, RoomCatalog, ShareCodeRegistry};
use campus_gsr_core::{Clock, GsrConfig, RandomSource, SystemClock, ThreadRandom};
use campus_gsr_postgres::{PostgresDirectory, PostgresReservationStore, PostgresShareCodeStore};
use campus_gsr_upstream::Upstreams;
use campus_gsr_web::{router, AppState};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,campus_gsr=debug,sqlx=warn")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GsrConfig::from_env();

    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.server.metrics_port));
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!(%metrics_addr, "Prometheus metrics exporter installed");

    let pool = campus_gsr_postgres::connect(&config.server.database_url, config.server.max_connections)
        .await
        .context("Failed to connect to PostgreSQL")?;
    campus_gsr_postgres::migrate(&pool)
        .await
        .context("Failed to run migrations")?;
    info!("Database ready");

    let catalog = Arc::new(
        RoomCatalog::from_path(&config.server.catalog_path, &config.policy.location_blacklist)
            .context("Failed to load room catalog")?,
    );
    info!(rooms = catalog.active().count(), "Room catalog loaded");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let random: Arc<dyn RandomSource> = Arc::new(ThreadRandom);
    let upstreams = Upstreams::from_config(&config, Arc::clone(&clock));

    let reservations = Arc::new(PostgresReservationStore::new(pool.clone()));
    let share_codes = Arc::new(PostgresShareCodeStore::new(pool.clone()));
    let directory = Arc::new(PostgresDirectory::new(pool));

    let orchestrator = Arc::new(BookingOrchestrator::new(
        Arc::clone(&catalog),
        upstreams,
        reservations.clone(),
        directory.clone(),
        Arc::clone(&clock),
        Arc::clone(&random),
        config.policy.clone(),
    ));
    let registry = Arc::new(ShareCodeRegistry::new(share_codes, reservations, catalog, clock, random));

    let app = router(AppState::new(orchestrator, registry, directory));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid HOST/PORT")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("Unable to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received, draining connections");
}
