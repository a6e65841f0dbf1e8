//! Authoritative booking service shared by the WebSocket and HTTP layers.
//!
//! [`ApiContext`] keeps the store and the observer hub behind one lock. Every
//! create, transition, registration and snapshot runs to completion while
//! holding it, which gives a single-writer order to all mutations and makes
//! each observer's snapshot line up exactly with the live events that follow.

use std::{sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use shared::{
    domain::{ActorId, Booking, BookingId, NewBooking},
    error::{ApiError, ErrorCode},
    protocol::{BookingAction, DashboardStats, ServerEvent, ServerStatus},
};
use storage::{BookingStore, StoreError};
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

pub mod actions;
pub mod hub;

pub use actions::{ActionOutcome, ActionProcessor};
pub use hub::{BroadcastHub, DEFAULT_QUEUE_CAPACITY};

/// Who asked for a booking to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingOrigin {
    Generator,
    Actor(ActorId),
    Http,
}

struct Core {
    store: BookingStore,
    hub: BroadcastHub,
    last_booking_generated: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct ApiContext {
    core: Arc<Mutex<Core>>,
    started_at: Instant,
}

impl ApiContext {
    pub fn new(queue_capacity: usize) -> Self {
        Self::with_store(BookingStore::new(), queue_capacity)
    }

    pub fn with_store(store: BookingStore, queue_capacity: usize) -> Self {
        Self {
            core: Arc::new(Mutex::new(Core {
                store,
                hub: BroadcastHub::new(queue_capacity),
                last_booking_generated: None,
            })),
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Registers `actor` and queues its baseline snapshot ahead of any live
    /// event.
    pub async fn connect(&self, actor: ActorId) -> mpsc::Receiver<ServerEvent> {
        let mut core = self.core.lock().await;
        let events = core.hub.register(actor);
        let snapshot = self.snapshot_event(&core);
        core.hub.send_to(actor, snapshot);
        info!(%actor, connected_clients = core.hub.len(), "observer connected");
        events
    }

    pub async fn disconnect(&self, actor: ActorId) -> bool {
        let mut core = self.core.lock().await;
        let removed = core.hub.deregister(actor);
        if removed {
            info!(%actor, connected_clients = core.hub.len(), "observer disconnected");
        }
        removed
    }

    pub async fn create_booking(
        &self,
        fields: NewBooking,
        origin: BookingOrigin,
    ) -> Result<Booking, ApiError> {
        let mut core = self.core.lock().await;
        let booking = core.store.create(fields).map_err(store_error)?;
        if origin == BookingOrigin::Generator {
            core.last_booking_generated = Some(booking.timestamp);
        }
        info!(
            booking_id = booking.id.0,
            venue = %booking.venue_name,
            party_type = %booking.party_type,
            party_size = booking.party_size.0,
            ?origin,
            "booking created"
        );

        core.hub.broadcast(&ServerEvent::BookingCreated {
            booking: booking.clone(),
        });
        let stats = ServerEvent::StatsUpdated {
            stats: self.dashboard(&core),
        };
        core.hub.broadcast(&stats);
        Ok(booking)
    }

    /// Applies a confirm/decline request and routes the outcome to `actor`
    /// only. Successful transitions are followed by a stats broadcast.
    pub async fn request_action(
        &self,
        actor: ActorId,
        booking_id: BookingId,
        action: BookingAction,
    ) -> ActionOutcome {
        let mut guard = self.core.lock().await;
        let core = &mut *guard;
        let outcome = ActionProcessor::new(&mut core.store, &mut core.hub)
            .apply(actor, booking_id, action);

        if !core.hub.send_to(actor, outcome.to_event()) {
            warn!(%actor, booking_id = booking_id.0, "action outcome undeliverable");
        }
        if outcome.is_success() {
            let stats = ServerEvent::StatsUpdated {
                stats: self.dashboard(core),
            };
            core.hub.broadcast(&stats);
        }
        outcome
    }

    /// Queues a reply for one observer, behind anything already queued for it.
    pub async fn send_to(&self, actor: ActorId, event: ServerEvent) -> bool {
        self.core.lock().await.hub.send_to(actor, event)
    }

    /// Re-sends the current snapshot to one observer.
    pub async fn request_snapshot(&self, actor: ActorId) -> bool {
        let mut core = self.core.lock().await;
        let snapshot = self.snapshot_event(&core);
        core.hub.send_to(actor, snapshot)
    }

    pub async fn bookings(&self) -> Vec<Booking> {
        self.core.lock().await.store.snapshot()
    }

    pub async fn booking(&self, id: BookingId) -> Result<Booking, ApiError> {
        self.core.lock().await.store.get(id).map_err(store_error)
    }

    pub async fn dashboard_stats(&self) -> DashboardStats {
        let core = self.core.lock().await;
        self.dashboard(&core)
    }

    pub async fn connected_clients(&self) -> usize {
        self.core.lock().await.hub.len()
    }

    pub async fn server_status(&self) -> ServerStatus {
        let core = self.core.lock().await;
        ServerStatus {
            connected_clients: core.hub.len(),
            total_bookings: core.store.len(),
            server_uptime_secs: self.uptime_secs(),
            last_booking_generated: core.last_booking_generated,
        }
    }

    fn dashboard(&self, core: &Core) -> DashboardStats {
        DashboardStats {
            bookings: core.store.stats(),
            connected_clients: core.hub.len(),
            server_uptime_secs: self.uptime_secs(),
        }
    }

    fn snapshot_event(&self, core: &Core) -> ServerEvent {
        ServerEvent::SnapshotDelivered {
            bookings: core.store.snapshot(),
            stats: self.dashboard(core),
        }
    }
}

pub fn store_error(err: StoreError) -> ApiError {
    let code = match &err {
        StoreError::NotFound(_) => ErrorCode::NotFound,
        StoreError::Malformed(_) => ErrorCode::Validation,
    };
    ApiError::new(code, err.to_string())
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
