use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use freejar::config::AppConfig;
use freejar::db;
use freejar::handlers;
use freejar::services::booking::BookingService;
use freejar::services::clock::SystemClock;
use freejar::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let booking = BookingService::from_config(&config)?;
    tracing::info!(
        opens_at = %booking.window.display_time(),
        window_minutes = config.booking_window_minutes,
        slots_per_day = booking.slots_per_day,
        "free jar booking configured"
    );

    let conn = db::init_db(&config.database_url)?;

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        booking,
        clock: Box::new(SystemClock),
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/free-jar/book", post(handlers::customer::book_free_jar))
        .route(
            "/api/free-jar/status/:customer_id",
            get(handlers::customer::get_status),
        )
        .route(
            "/api/free-jar/history/:customer_id",
            get(handlers::customer::get_history),
        )
        .route(
            "/api/assistant/:assistant_id/free-jars",
            get(handlers::assistant::get_free_jars),
        )
        .route(
            "/api/free-jar/bookings/:id/claim",
            post(handlers::assistant::claim_free_jar),
        )
        .route(
            "/api/free-jar/bookings/:id/deliver",
            post(handlers::assistant::deliver_free_jar),
        )
        .route("/api/admin/attempts", get(handlers::admin::get_attempts))
        .route("/api/admin/slots", get(handlers::admin::get_slots))
        .route(
            "/api/admin/slots/:date/active",
            post(handlers::admin::set_slot_active),
        )
        .route("/api/admin/bookings", get(handlers::admin::get_bookings))
        .route(
            "/api/admin/bookings/:id/cancel",
            post(handlers::admin::cancel_booking),
        )
        .route(
            "/api/admin/expire-bookings",
            post(handlers::admin::expire_bookings),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
