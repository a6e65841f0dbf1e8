use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{Booking, BookingId, BookingStatus, NewBooking},
    error::ApiError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingAction {
    Confirm,
    Decline,
}

impl BookingAction {
    pub fn target_status(self) -> BookingStatus {
        match self {
            Self::Confirm => BookingStatus::Confirmed,
            Self::Decline => BookingStatus::Declined,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Confirm => "confirm",
            Self::Decline => "decline",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionFailureReason {
    NotFound,
    NotPending,
}

impl ActionFailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::NotPending => "not_pending",
        }
    }
}

/// Per-status counts over the current booking window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingStats {
    pub total_bookings: usize,
    pub pending_bookings: usize,
    pub confirmed_bookings: usize,
    pub declined_bookings: usize,
}

impl BookingStats {
    pub fn from_bookings<'a>(bookings: impl IntoIterator<Item = &'a Booking>) -> Self {
        let mut stats = Self::default();
        for booking in bookings {
            stats.total_bookings += 1;
            match booking.status {
                BookingStatus::Pending => stats.pending_bookings += 1,
                BookingStatus::Confirmed => stats.confirmed_bookings += 1,
                BookingStatus::Declined => stats.declined_bookings += 1,
            }
        }
        stats
    }
}

/// Store counts plus the server-side figures shown on dashboards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    #[serde(flatten)]
    pub bookings: BookingStats,
    pub connected_clients: usize,
    pub server_uptime_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub connected_clients: usize,
    pub total_bookings: usize,
    pub server_uptime_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_booking_generated: Option<DateTime<Utc>>,
}

/// Body of `GET /api/bookings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingsResponse {
    pub success: bool,
    pub bookings: Vec<Booking>,
    pub total: usize,
    pub timestamp: DateTime<Utc>,
}

/// Body of `GET /api/stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: DashboardStats,
    pub timestamp: DateTime<Utc>,
}

/// Body of `GET /api/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: u64,
    pub connected_clients: usize,
    pub total_bookings: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientRequest {
    CreateBooking {
        booking: NewBooking,
    },
    RequestAction {
        booking_id: BookingId,
        action: BookingAction,
    },
    RequestSnapshot,
    Ping,
    RequestServerStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    SnapshotDelivered {
        bookings: Vec<Booking>,
        stats: DashboardStats,
    },
    BookingCreated {
        booking: Booking,
    },
    BookingUpdated {
        booking: Booking,
    },
    ActionSucceeded {
        action: BookingAction,
        booking_id: BookingId,
    },
    ActionFailed {
        action: BookingAction,
        booking_id: BookingId,
        reason: ActionFailureReason,
    },
    StatsUpdated {
        stats: DashboardStats,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
    ServerStatus(ServerStatus),
    Error(ApiError),
}
