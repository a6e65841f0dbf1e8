use super::*;
use std::time::Duration;

use axum::{body, body::Body, http::Request};
use futures::{SinkExt, StreamExt};
use shared::{
    domain::{BookingStatus, PartySize},
    protocol::{ActionFailureReason, BookingAction, ServerEvent},
};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn fields(size: u32) -> NewBooking {
    NewBooking {
        venue_name: "Crystal Hall".into(),
        party_type: "Birthday Party".into(),
        customer_name: "Kevin Moore".into(),
        time: "Sat, Jun 14, 7:30 PM".into(),
        party_size: PartySize(size),
    }
}

fn test_app() -> (Router, ApiContext) {
    let api = ApiContext::new(32);
    let app = build_router(Arc::new(AppState { api: api.clone() }), None);
    (app, api)
}

async fn json_body<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

async fn spawn_server() -> (SocketAddr, ApiContext) {
    spawn_server_with(ApiContext::new(32)).await
}

async fn spawn_server_with(api: ApiContext) -> (SocketAddr, ApiContext) {
    let app = build_router(Arc::new(AppState { api: api.clone() }), None);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (addr, api)
}

async fn connect(addr: SocketAddr) -> Socket {
    let (socket, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("ws connect");
    socket
}

async fn next_event(socket: &mut Socket) -> ServerEvent {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("event before timeout")
            .expect("stream open")
            .expect("ws frame");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("server event");
        }
    }
}

async fn send_json(socket: &mut Socket, value: serde_json::Value) {
    socket
        .send(Message::Text(value.to_string()))
        .await
        .expect("send frame");
}

#[tokio::test]
async fn healthz_reports_ok() {
    let (app, _api) = test_app();
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn create_route_validates_and_lists_bookings() {
    let (app, api) = test_app();

    let malformed = Request::post("/api/bookings")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({ "venue_name": "Sky Deck", "party_size": 0 }).to_string(),
        ))
        .expect("request");
    let response = app.clone().oneshot(malformed).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ApiError = json_body(response).await;
    assert_eq!(error.code, ErrorCode::Validation);
    assert!(api.bookings().await.is_empty());

    let valid = Request::post("/api/bookings")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&fields(12)).expect("encode")))
        .expect("request");
    let response = app.clone().oneshot(valid).await.expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Booking = json_body(response).await;
    assert_eq!(created.status, BookingStatus::Pending);
    assert_eq!(created.party_size, PartySize(12));

    let list = Request::get("/api/bookings")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(list).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let listing: BookingsResponse = json_body(response).await;
    assert!(listing.success);
    assert_eq!(listing.total, 1);
    assert_eq!(listing.bookings[0].id, created.id);

    let single = Request::get(format!("/api/bookings/{}", created.id.0))
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(single).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let missing = Request::get("/api/bookings/999")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(missing).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stats_and_health_reflect_store() {
    let (app, api) = test_app();
    let booking = api
        .create_booking(fields(12), BookingOrigin::Http)
        .await
        .expect("create");
    api.create_booking(fields(30), BookingOrigin::Http)
        .await
        .expect("create");
    api.request_action(shared::domain::ActorId::new_random(), booking.id, BookingAction::Decline)
        .await;

    let response = app
        .clone()
        .oneshot(Request::get("/api/stats").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    let stats: StatsResponse = json_body(response).await;
    assert!(stats.success);
    assert_eq!(stats.stats.bookings.total_bookings, 2);
    assert_eq!(stats.stats.bookings.pending_bookings, 1);
    assert_eq!(stats.stats.bookings.declined_bookings, 1);

    let response = app
        .oneshot(Request::get("/api/health").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    let health: HealthResponse = json_body(response).await;
    assert_eq!(health.status, "healthy");
    assert_eq!(health.total_bookings, 2);
    assert_eq!(health.connected_clients, 0);
}

#[tokio::test]
async fn static_directory_is_served_as_fallback() {
    let dir = std::env::temp_dir().join(format!(
        "live_bookings_static_{}",
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir");
    std::fs::write(dir.join("index.html"), "<h1>bookings</h1>").expect("write index");

    let app = build_router(
        Arc::new(AppState {
            api: ApiContext::new(8),
        }),
        Some(dir.as_path()),
    );
    let response = app
        .oneshot(Request::get("/").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"<h1>bookings</h1>");

    std::fs::remove_dir_all(&dir).expect("cleanup");
}

#[tokio::test]
async fn websocket_confirm_then_decline_resolves_once() {
    let (addr, api) = spawn_server().await;
    let booking = api
        .create_booking(fields(12), BookingOrigin::Generator)
        .await
        .expect("create");

    let mut socket = connect(addr).await;
    match next_event(&mut socket).await {
        ServerEvent::SnapshotDelivered { bookings, stats } => {
            assert_eq!(bookings.len(), 1);
            assert_eq!(stats.bookings.pending_bookings, 1);
            assert_eq!(stats.connected_clients, 1);
        }
        other => panic!("expected snapshot, got {other:?}"),
    }

    send_json(
        &mut socket,
        serde_json::json!({
            "type": "request_action",
            "payload": { "booking_id": booking.id.0, "action": "confirm" }
        }),
    )
    .await;
    match next_event(&mut socket).await {
        ServerEvent::BookingUpdated { booking: updated } => {
            assert_eq!(updated.id, booking.id);
            assert_eq!(updated.status, BookingStatus::Confirmed);
            assert!(updated.updated_by.is_some());
        }
        other => panic!("expected booking_updated, got {other:?}"),
    }
    assert!(matches!(
        next_event(&mut socket).await,
        ServerEvent::ActionSucceeded { action: BookingAction::Confirm, booking_id } if booking_id == booking.id
    ));
    assert!(matches!(
        next_event(&mut socket).await,
        ServerEvent::StatsUpdated { .. }
    ));

    send_json(
        &mut socket,
        serde_json::json!({
            "type": "request_action",
            "payload": { "booking_id": booking.id.0, "action": "decline" }
        }),
    )
    .await;
    match next_event(&mut socket).await {
        ServerEvent::ActionFailed {
            action,
            booking_id,
            reason,
        } => {
            assert_eq!(action, BookingAction::Decline);
            assert_eq!(booking_id, booking.id);
            assert_eq!(reason, ActionFailureReason::NotPending);
        }
        other => panic!("expected action_failed, got {other:?}"),
    }

    let stored = api.booking(booking.id).await.expect("booking");
    assert_eq!(stored.status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn websocket_answers_ping_status_and_bad_frames() {
    let (addr, _api) = spawn_server().await;
    let mut socket = connect(addr).await;
    assert!(matches!(
        next_event(&mut socket).await,
        ServerEvent::SnapshotDelivered { .. }
    ));

    socket
        .send(Message::Text("{\"type\":\"launch_rockets\"}".to_string()))
        .await
        .expect("send frame");
    match next_event(&mut socket).await {
        ServerEvent::Error(error) => assert_eq!(error.code, ErrorCode::Validation),
        other => panic!("expected error, got {other:?}"),
    }

    send_json(&mut socket, serde_json::json!({ "type": "ping" })).await;
    assert!(matches!(
        next_event(&mut socket).await,
        ServerEvent::Pong { .. }
    ));

    send_json(
        &mut socket,
        serde_json::json!({ "type": "request_server_status" }),
    )
    .await;
    match next_event(&mut socket).await {
        ServerEvent::ServerStatus(status) => {
            assert_eq!(status.connected_clients, 1);
            assert_eq!(status.total_bookings, 0);
            assert!(status.last_booking_generated.is_none());
        }
        other => panic!("expected server_status, got {other:?}"),
    }

    send_json(
        &mut socket,
        serde_json::json!({
            "type": "create_booking",
            "payload": { "booking": { "venue_name": "Sky Deck" } }
        }),
    )
    .await;
    match next_event(&mut socket).await {
        ServerEvent::Error(error) => assert_eq!(error.code, ErrorCode::Validation),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn websocket_fans_out_creations_to_every_observer() {
    let (addr, api) = spawn_server().await;
    let mut first = connect(addr).await;
    let mut second = connect(addr).await;
    assert!(matches!(
        next_event(&mut first).await,
        ServerEvent::SnapshotDelivered { .. }
    ));
    assert!(matches!(
        next_event(&mut second).await,
        ServerEvent::SnapshotDelivered { .. }
    ));

    send_json(
        &mut first,
        serde_json::json!({
            "type": "create_booking",
            "payload": { "booking": fields(40) }
        }),
    )
    .await;

    for socket in [&mut first, &mut second] {
        match next_event(socket).await {
            ServerEvent::BookingCreated { booking } => {
                assert_eq!(booking.party_size, PartySize(40));
                assert_eq!(booking.status, BookingStatus::Pending);
            }
            other => panic!("expected booking_created, got {other:?}"),
        }
        match next_event(socket).await {
            ServerEvent::StatsUpdated { stats } => {
                assert_eq!(stats.bookings.total_bookings, 1);
                assert_eq!(stats.connected_clients, 2);
            }
            other => panic!("expected stats_updated, got {other:?}"),
        }
    }

    first.close(None).await.expect("close");
    drop(first);
    let mut remaining = api.connected_clients().await;
    for _ in 0..50 {
        if remaining == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        remaining = api.connected_clients().await;
    }
    assert_eq!(remaining, 1);
}

#[tokio::test]
async fn websocket_closes_socket_of_dropped_observer() {
    let (addr, api) = spawn_server_with(ApiContext::new(1)).await;
    let mut socket = connect(addr).await;
    assert!(matches!(
        next_event(&mut socket).await,
        ServerEvent::SnapshotDelivered { .. }
    ));

    // Each creation queues two events, more than a one-slot queue can hold.
    for size in [12, 20, 30, 40, 60] {
        api.create_booking(fields(size), BookingOrigin::Generator)
            .await
            .expect("create");
    }
    assert_eq!(api.connected_clients().await, 0);

    let mut events = 0;
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(_))) => events += 1,
                Some(Ok(Message::Close(frame))) => return frame,
                Some(Ok(_)) => {}
                None | Some(Err(_)) => return None,
            }
        }
    })
    .await
    .expect("socket closed before timeout");
    assert!(events <= 1, "at most one queued event survives, got {events}");
    if let Some(frame) = closed {
        assert_eq!(u16::from(frame.code), 1013);
    }

    let after_close = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("stream finished");
    assert!(!matches!(after_close, Some(Ok(Message::Text(_)))));
}
