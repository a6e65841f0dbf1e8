use std::{net::SocketAddr, path::Path as FsPath, sync::Arc};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use server_api::{ApiContext, BookingOrigin};
use shared::{
    domain::{Booking, BookingId, NewBooking},
    error::{ApiError, ErrorCode},
    protocol::{BookingsResponse, HealthResponse, StatsResponse},
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod generator;
mod ws;

use app_state::AppState;
use config::load_settings;
use generator::MockBookingGenerator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let api = ApiContext::new(settings.observer_queue_capacity);

    match settings.generation_interval() {
        Some(period) => {
            info!(period_secs = period.as_secs(), "mock booking generator enabled");
            tokio::spawn(generator::run(api.clone(), period, MockBookingGenerator::new()));
        }
        None => info!("mock booking generator disabled"),
    }

    let static_dir = FsPath::new(&settings.static_dir);
    let static_dir = if static_dir.is_dir() {
        Some(static_dir)
    } else {
        warn!(dir = %settings.static_dir, "static directory not found; serving API only");
        None
    };

    let app = build_router(Arc::new(AppState { api }), static_dir);

    let addr: SocketAddr = settings.server_bind.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

fn build_router(state: Arc<AppState>, static_dir: Option<&FsPath>) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/health", get(http_health))
        .route("/api/bookings", get(http_list_bookings).post(http_create_booking))
        .route("/api/bookings/:booking_id", get(http_get_booking))
        .route("/api/stats", get(http_stats))
        .route("/ws", get(ws::ws_handler))
        .with_state(state);

    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                warn!(%error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}

fn error_response(error: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = match error.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(error))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let status = state.api.server_status().await;
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        uptime_secs: status.server_uptime_secs,
        connected_clients: status.connected_clients,
        total_bookings: status.total_bookings,
    })
}

async fn http_list_bookings(State(state): State<Arc<AppState>>) -> Json<BookingsResponse> {
    let bookings = state.api.bookings().await;
    Json(BookingsResponse {
        success: true,
        total: bookings.len(),
        bookings,
        timestamp: Utc::now(),
    })
}

async fn http_get_booking(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<i64>,
) -> Result<Json<Booking>, (StatusCode, Json<ApiError>)> {
    state
        .api
        .booking(BookingId(booking_id))
        .await
        .map(Json)
        .map_err(error_response)
}

async fn http_create_booking(
    State(state): State<Arc<AppState>>,
    Json(fields): Json<NewBooking>,
) -> Result<(StatusCode, Json<Booking>), (StatusCode, Json<ApiError>)> {
    let booking = state
        .api
        .create_booking(fields, BookingOrigin::Http)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn http_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        success: true,
        stats: state.api.dashboard_stats().await,
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
