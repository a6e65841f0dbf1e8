//! WebSocket client for the live booking feed.
//!
//! [`BookingClient`] keeps a [`ViewProjector`] in step with the server's event
//! stream, tracks confirm/decline requests that are still waiting for an
//! outcome and republishes everything as [`ClientEvent`]s.

use std::{sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use shared::{
    domain::{Booking, BookingId, NewBooking},
    protocol::{BookingAction, ClientRequest, ServerEvent, ServerStatus},
};
use thiserror::Error;
use tokio::{
    net::TcpStream,
    sync::{broadcast, mpsc, Mutex, RwLock},
    task::JoinHandle,
    time::Instant,
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

pub mod http;
pub mod pending;
pub mod view;

pub use pending::{PendingActions, DEFAULT_ACTION_TIMEOUT};
pub use view::{FilterCriteria, PartySizeBucket, PartySizeFilter, StatusFilter, ViewProjector};

pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const OUTBOUND_QUEUE: usize = 64;

type FeedStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url {0}: expected http(s):// or ws(s)://")]
    InvalidServerUrl(String),
    #[error("failed to connect websocket {url}: {source}")]
    Connect {
        url: String,
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[error("connection to server closed")]
    Disconnected,
    #[error("action already pending for booking {0}")]
    ActionPending(BookingId),
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    Server(ServerEvent),
    /// The filtered view changed; carries the number of visible bookings.
    ViewChanged { visible: usize },
    /// No outcome arrived in time; the pending indicator was reverted.
    ActionTimedOut {
        booking_id: BookingId,
        action: BookingAction,
    },
    /// The link dropped; a reconnect follows unless attempts are disabled.
    Disconnected,
    /// A new link is up. A fresh snapshot replaces the view.
    Reconnected { attempt: u32 },
    /// Reconnect attempts are exhausted. No further events follow.
    Closed,
    Error(String),
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub ping_interval: Duration,
    pub action_timeout: Duration,
    pub criteria: FilterCriteria,
    /// Consecutive failed reconnects tolerated before giving up. Zero disables
    /// reconnecting.
    pub reconnect_attempts: u32,
    /// Base delay; attempt `n` waits `n * reconnect_delay`.
    pub reconnect_delay: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL,
            action_timeout: DEFAULT_ACTION_TIMEOUT,
            criteria: FilterCriteria::default(),
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

struct Shared {
    view: RwLock<ViewProjector>,
    pending: Mutex<PendingActions>,
    server_status: RwLock<Option<ServerStatus>>,
    events: broadcast::Sender<ClientEvent>,
}

impl Shared {
    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    async fn apply(&self, event: &ServerEvent) {
        let view_changed = match event {
            ServerEvent::SnapshotDelivered { bookings, stats } => {
                let mut view = self.view.write().await;
                view.load_snapshot(bookings.clone(), Some(*stats));
                Some(view.filtered().len())
            }
            ServerEvent::BookingCreated { booking } => {
                let mut view = self.view.write().await;
                view.on_created(booking.clone());
                Some(view.filtered().len())
            }
            ServerEvent::BookingUpdated { booking } => {
                let mut view = self.view.write().await;
                view.on_updated(booking.clone())
                    .then(|| view.filtered().len())
            }
            ServerEvent::StatsUpdated { stats } => {
                self.view.write().await.set_stats(*stats);
                None
            }
            ServerEvent::ActionSucceeded { booking_id, .. }
            | ServerEvent::ActionFailed { booking_id, .. } => {
                self.pending.lock().await.resolve(*booking_id);
                None
            }
            ServerEvent::ServerStatus(status) => {
                *self.server_status.write().await = Some(status.clone());
                None
            }
            ServerEvent::Pong { .. } => None,
            ServerEvent::Error(error) => {
                warn!(%error, "server rejected request");
                None
            }
        };

        self.emit(ClientEvent::Server(event.clone()));
        if let Some(visible) = view_changed {
            self.emit(ClientEvent::ViewChanged { visible });
        }
    }

    async fn expire_pending(&self) {
        let expired = self.pending.lock().await.expire(Instant::now());
        for (booking_id, action) in expired {
            info!(booking_id = booking_id.0, action = action.as_str(), "action timed out");
            self.emit(ClientEvent::ActionTimedOut { booking_id, action });
        }
    }
}

pub struct BookingClient {
    shared: Arc<Shared>,
    outbound: mpsc::Sender<ClientRequest>,
    tasks: Vec<JoinHandle<()>>,
}

impl BookingClient {
    pub async fn connect(server_url: &str) -> Result<Self, ClientError> {
        Self::connect_with(server_url, ClientOptions::default()).await
    }

    pub async fn connect_with(server_url: &str, options: ClientOptions) -> Result<Self, ClientError> {
        let ws_url = websocket_url(server_url)?;
        let (ws_stream, _) =
            connect_async(ws_url.as_str())
                .await
                .map_err(|source| ClientError::Connect {
                    url: ws_url.to_string(),
                    source,
                })?;
        info!(url = %ws_url, "connected to booking feed");

        let mut view = ViewProjector::new();
        view.set_criteria(options.criteria);
        let (events, _) = broadcast::channel(1024);
        let shared = Arc::new(Shared {
            view: RwLock::new(view),
            pending: Mutex::new(PendingActions::new(options.action_timeout)),
            server_status: RwLock::new(None),
            events,
        });
        let (outbound, mut outbound_rx) = mpsc::channel::<ClientRequest>(OUTBOUND_QUEUE);

        let link_shared = Arc::clone(&shared);
        let reconnect = Reconnect {
            attempts: options.reconnect_attempts,
            delay: options.reconnect_delay,
        };
        let link = tokio::spawn(async move {
            let mut stream = ws_stream;
            let mut resync = false;
            loop {
                match run_session(&link_shared, stream, &mut outbound_rx, resync).await {
                    SessionEnd::ClientDropped => return,
                    SessionEnd::Lost => {}
                }
                info!("booking feed closed");
                link_shared.emit(ClientEvent::Disconnected);

                let Some((next, attempt)) = reconnect.run(&ws_url).await else {
                    warn!(url = %ws_url, "giving up on booking feed");
                    link_shared.emit(ClientEvent::Closed);
                    return;
                };
                link_shared.emit(ClientEvent::Reconnected { attempt });
                stream = next;
                resync = true;
            }
        });

        let ping_outbound = outbound.clone();
        let ping_interval = options.ping_interval;
        let pinger = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
            loop {
                ticker.tick().await;
                debug!("ping");
                if ping_outbound.send(ClientRequest::Ping).await.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            shared,
            outbound,
            tasks: vec![link, pinger],
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    pub async fn confirm(&self, booking_id: BookingId) -> Result<(), ClientError> {
        self.request_action(booking_id, BookingAction::Confirm).await
    }

    pub async fn decline(&self, booking_id: BookingId) -> Result<(), ClientError> {
        self.request_action(booking_id, BookingAction::Decline).await
    }

    /// Sends the action and marks it pending until an outcome arrives or the
    /// action timeout passes.
    pub async fn request_action(
        &self,
        booking_id: BookingId,
        action: BookingAction,
    ) -> Result<(), ClientError> {
        let timeout = {
            let mut pending = self.shared.pending.lock().await;
            if !pending.begin(booking_id, action, Instant::now()) {
                return Err(ClientError::ActionPending(booking_id));
            }
            pending.timeout()
        };

        if let Err(err) = self.send(ClientRequest::RequestAction { booking_id, action }).await {
            self.shared.pending.lock().await.resolve(booking_id);
            return Err(err);
        }

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            shared.expire_pending().await;
        });
        Ok(())
    }

    pub async fn create_booking(&self, booking: NewBooking) -> Result<(), ClientError> {
        self.send(ClientRequest::CreateBooking { booking }).await
    }

    pub async fn request_snapshot(&self) -> Result<(), ClientError> {
        self.send(ClientRequest::RequestSnapshot).await
    }

    pub async fn request_server_status(&self) -> Result<(), ClientError> {
        self.send(ClientRequest::RequestServerStatus).await
    }

    pub async fn ping(&self) -> Result<(), ClientError> {
        self.send(ClientRequest::Ping).await
    }

    /// Replaces the filter predicates and re-filters in one step.
    pub async fn set_filters(&self, criteria: FilterCriteria) -> usize {
        let visible = {
            let mut view = self.shared.view.write().await;
            view.set_criteria(criteria);
            view.filtered().len()
        };
        self.shared.emit(ClientEvent::ViewChanged { visible });
        visible
    }

    pub async fn filtered(&self) -> Vec<Booking> {
        self.shared.view.read().await.filtered().to_vec()
    }

    pub async fn booking(&self, booking_id: BookingId) -> Option<Booking> {
        self.shared.view.read().await.get(booking_id).cloned()
    }

    /// Read access to the whole projection.
    pub async fn view<T>(&self, f: impl FnOnce(&ViewProjector) -> T) -> T {
        f(&*self.shared.view.read().await)
    }

    pub async fn pending_action(&self, booking_id: BookingId) -> Option<BookingAction> {
        self.shared.pending.lock().await.get(booking_id)
    }

    pub async fn last_server_status(&self) -> Option<ServerStatus> {
        self.shared.server_status.read().await.clone()
    }

    async fn send(&self, request: ClientRequest) -> Result<(), ClientError> {
        self.outbound
            .send(request)
            .await
            .map_err(|_| ClientError::Disconnected)
    }
}

impl Drop for BookingClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

enum SessionEnd {
    Lost,
    ClientDropped,
}

/// Pumps one websocket link until it drops or the client goes away. After a
/// reconnect the server status is requested again; the server pushes a fresh
/// snapshot on its own.
async fn run_session(
    shared: &Shared,
    stream: FeedStream,
    outbound: &mut mpsc::Receiver<ClientRequest>,
    resync: bool,
) -> SessionEnd {
    let (mut writer, mut reader) = stream.split();
    if resync {
        if let Err(err) = send_request(&mut writer, &ClientRequest::RequestServerStatus).await {
            shared.emit(ClientEvent::Error(format!("websocket send failed: {err}")));
            return SessionEnd::Lost;
        }
    }

    loop {
        tokio::select! {
            request = outbound.recv() => {
                let Some(request) = request else {
                    let _ = writer.close().await;
                    return SessionEnd::ClientDropped;
                };
                if let Err(err) = send_request(&mut writer, &request).await {
                    shared.emit(ClientEvent::Error(format!("websocket send failed: {err}")));
                    return SessionEnd::Lost;
                }
            }
            msg = reader.next() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => shared.apply(&event).await,
                    Err(err) => {
                        shared.emit(ClientEvent::Error(format!("invalid server event: {err}")));
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "server closed booking feed");
                    return SessionEnd::Lost;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    shared.emit(ClientEvent::Error(format!("websocket receive failed: {err}")));
                    return SessionEnd::Lost;
                }
                None => return SessionEnd::Lost,
            }
        }
    }
}

async fn send_request<S>(writer: &mut S, request: &ClientRequest) -> Result<(), S::Error>
where
    S: futures::Sink<Message> + Unpin,
{
    let text = match serde_json::to_string(request) {
        Ok(v) => v,
        Err(error) => {
            warn!(%error, "failed to encode client request");
            return Ok(());
        }
    };
    writer.send(Message::Text(text)).await
}

#[derive(Debug, Clone, Copy)]
struct Reconnect {
    attempts: u32,
    delay: Duration,
}

impl Reconnect {
    /// Retries with a linearly growing delay. Returns the new stream and the
    /// attempt that succeeded.
    async fn run(&self, ws_url: &Url) -> Option<(FeedStream, u32)> {
        for attempt in 1..=self.attempts {
            tokio::time::sleep(self.delay * attempt).await;
            match connect_async(ws_url.as_str()).await {
                Ok((stream, _)) => {
                    info!(url = %ws_url, attempt, "reconnected to booking feed");
                    return Some((stream, attempt));
                }
                Err(error) => warn!(url = %ws_url, attempt, %error, "reconnect failed"),
            }
        }
        None
    }
}

/// Maps an http(s) base url to the feed endpoint, e.g.
/// `http://host:3000` to `ws://host:3000/ws`.
pub fn websocket_url(server_url: &str) -> Result<Url, ClientError> {
    let invalid = || ClientError::InvalidServerUrl(server_url.to_string());
    let mut url = Url::parse(server_url).map_err(|_| invalid())?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(invalid()),
    };
    url.set_scheme(scheme).map_err(|_| invalid())?;
    url.set_path("/ws");
    url.set_query(None);
    Ok(url)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
