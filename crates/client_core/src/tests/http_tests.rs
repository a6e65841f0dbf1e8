use super::*;
use axum::{http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use shared::{
    domain::{BookingId, BookingStatus, PartySize},
    error::{ApiError, ErrorCode},
    protocol::{BookingStats, DashboardStats},
};
use tokio::net::TcpListener;

fn sample() -> Booking {
    Booking {
        id: BookingId(5),
        venue_name: "Heritage Hall".into(),
        party_type: "Awards Ceremony".into(),
        customer_name: "Nicole Harris".into(),
        time: "Wed, Apr 9, 6:00 PM".into(),
        party_size: PartySize(64),
        status: BookingStatus::Pending,
        timestamp: Utc::now(),
        updated_at: None,
        updated_by: None,
    }
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn fetches_each_projection() {
    let app = Router::new()
        .route(
            "/api/bookings",
            get(|| async {
                Json(BookingsResponse {
                    success: true,
                    bookings: vec![sample()],
                    total: 1,
                    timestamp: Utc::now(),
                })
            })
            .post(|Json(fields): Json<NewBooking>| async move {
                if fields.missing_fields().is_empty() {
                    Ok((StatusCode::CREATED, Json(sample())))
                } else {
                    Err((
                        StatusCode::BAD_REQUEST,
                        Json(ApiError::new(ErrorCode::Validation, "missing fields")),
                    ))
                }
            }),
        )
        .route(
            "/api/stats",
            get(|| async {
                Json(StatsResponse {
                    success: true,
                    stats: DashboardStats {
                        bookings: BookingStats {
                            total_bookings: 1,
                            pending_bookings: 1,
                            ..BookingStats::default()
                        },
                        connected_clients: 3,
                        server_uptime_secs: 12,
                    },
                    timestamp: Utc::now(),
                })
            }),
        )
        .route(
            "/api/health",
            get(|| async {
                Json(HealthResponse {
                    status: "healthy".into(),
                    timestamp: Utc::now(),
                    uptime_secs: 12,
                    connected_clients: 3,
                    total_bookings: 1,
                })
            }),
        );
    let base = serve(app).await;
    let http = Client::new();

    let listing = fetch_bookings(&http, &format!("{base}/")).await.expect("bookings");
    assert_eq!(listing.total, 1);
    assert_eq!(listing.bookings[0].party_size, PartySize(64));

    let stats = fetch_stats(&http, &base).await.expect("stats");
    assert_eq!(stats.stats.connected_clients, 3);
    assert_eq!(stats.stats.bookings.pending_bookings, 1);

    let health = fetch_health(&http, &base).await.expect("health");
    assert_eq!(health.status, "healthy");

    let created = create_booking(&http, &base, &NewBooking::default()).await;
    assert!(created.is_err());
}

#[tokio::test]
async fn unreachable_server_is_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let result = fetch_health(&Client::new(), &format!("http://{addr}")).await;
    assert!(result.is_err());
}
