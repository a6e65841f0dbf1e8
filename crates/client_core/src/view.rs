//! Client-side filtered projection of the live booking window.
//!
//! [`ViewProjector`] keeps the full local collection (newest first, bounded
//! like the server window) and an incrementally maintained filtered view. The
//! view always equals what [`ViewProjector::apply_filters`] computes from
//! scratch.

use std::{collections::VecDeque, fmt, str::FromStr};

use shared::{
    domain::{Booking, BookingId, BookingStatus, BOOKING_WINDOW},
    protocol::{BookingStats, DashboardStats},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartySizeBucket {
    Small,
    Medium,
    Large,
    XLarge,
}

impl PartySizeBucket {
    /// Small 2-10, medium 11-25, large 26-50, xlarge above 50. Sizes below 2
    /// belong to no bucket.
    pub fn contains(self, size: u32) -> bool {
        match self {
            Self::Small => (2..=10).contains(&size),
            Self::Medium => (11..=25).contains(&size),
            Self::Large => (26..=50).contains(&size),
            Self::XLarge => size > 50,
        }
    }

    pub fn for_size(size: u32) -> Option<Self> {
        [Self::Small, Self::Medium, Self::Large, Self::XLarge]
            .into_iter()
            .find(|bucket| bucket.contains(size))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::XLarge => "xlarge",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Only(BookingStatus),
}

impl StatusFilter {
    pub fn matches(self, status: BookingStatus) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => wanted == status,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            other => other.parse::<BookingStatus>().map(Self::Only),
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Only(status) => write!(f, "{status}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PartySizeFilter {
    #[default]
    All,
    Bucket(PartySizeBucket),
}

impl PartySizeFilter {
    pub fn matches(self, size: u32) -> bool {
        match self {
            Self::All => true,
            Self::Bucket(bucket) => bucket.contains(size),
        }
    }
}

impl FromStr for PartySizeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bucket = match s.trim().to_ascii_lowercase().as_str() {
            "all" => return Ok(Self::All),
            "small" => PartySizeBucket::Small,
            "medium" => PartySizeBucket::Medium,
            "large" => PartySizeBucket::Large,
            "xlarge" => PartySizeBucket::XLarge,
            other => return Err(format!("unknown party size bucket: {other}")),
        };
        Ok(Self::Bucket(bucket))
    }
}

impl fmt::Display for PartySizeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Bucket(bucket) => f.write_str(bucket.as_str()),
        }
    }
}

/// The three independent predicates a booking must pass to be shown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    pub search: String,
    pub status: StatusFilter,
    pub party_size: PartySizeFilter,
}

impl FilterCriteria {
    pub fn is_active(&self) -> bool {
        !self.search.trim().is_empty()
            || self.status != StatusFilter::All
            || self.party_size != PartySizeFilter::All
    }

    pub fn matches(&self, booking: &Booking) -> bool {
        self.matches_search(booking)
            && self.status.matches(booking.status)
            && self.party_size.matches(booking.party_size.0)
    }

    fn matches_search(&self, booking: &Booking) -> bool {
        let term = self.search.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        let haystack = format!(
            "{}\n{}\n{}\n{}",
            booking.venue_name, booking.party_type, booking.customer_name, booking.id
        )
        .to_lowercase();
        haystack.contains(&term)
    }
}

#[derive(Debug, Clone)]
pub struct ViewProjector {
    bookings: VecDeque<Booking>,
    visible: Vec<Booking>,
    criteria: FilterCriteria,
    capacity: usize,
    stats: Option<DashboardStats>,
}

impl Default for ViewProjector {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewProjector {
    pub fn new() -> Self {
        Self::with_capacity(BOOKING_WINDOW)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bookings: VecDeque::new(),
            visible: Vec::new(),
            criteria: FilterCriteria::default(),
            capacity: capacity.max(1),
            stats: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    /// Full local collection, newest first.
    pub fn bookings(&self) -> impl Iterator<Item = &Booking> {
        self.bookings.iter()
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    pub fn get(&self, id: BookingId) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    /// Bookings currently passing every predicate, newest first.
    pub fn filtered(&self) -> &[Booking] {
        &self.visible
    }

    pub fn is_visible(&self, id: BookingId) -> bool {
        self.visible.iter().any(|b| b.id == id)
    }

    /// Last stats reported by the server, if any.
    pub fn stats(&self) -> Option<&DashboardStats> {
        self.stats.as_ref()
    }

    pub fn set_stats(&mut self, stats: DashboardStats) {
        self.stats = Some(stats);
    }

    /// Counts over the local collection.
    pub fn local_stats(&self) -> BookingStats {
        BookingStats::from_bookings(&self.bookings)
    }

    pub fn load_snapshot(&mut self, bookings: Vec<Booking>, stats: Option<DashboardStats>) {
        self.bookings = bookings.into_iter().take(self.capacity).collect();
        if stats.is_some() {
            self.stats = stats;
        }
        self.visible = self.apply_filters();
    }

    /// Prepends a new booking. A known id is treated as an update.
    pub fn on_created(&mut self, booking: Booking) {
        if self.get(booking.id).is_some() {
            self.on_updated(booking);
            return;
        }

        if self.criteria.matches(&booking) {
            self.visible.insert(0, booking.clone());
        }
        self.bookings.push_front(booking);

        while self.bookings.len() > self.capacity {
            if let Some(evicted) = self.bookings.pop_back() {
                self.visible.retain(|b| b.id != evicted.id);
            }
        }
    }

    /// Replaces a known booking and re-evaluates its visibility. Returns
    /// `false` for an unknown id, which leaves everything untouched.
    pub fn on_updated(&mut self, booking: Booking) -> bool {
        let Some(index) = self.bookings.iter().position(|b| b.id == booking.id) else {
            return false;
        };

        let passes = self.criteria.matches(&booking);
        let shown_at = self.visible.iter().position(|b| b.id == booking.id);
        match (shown_at, passes) {
            (Some(at), true) => self.visible[at] = booking.clone(),
            (Some(at), false) => {
                self.visible.remove(at);
            }
            (None, true) => {
                let at = self
                    .bookings
                    .iter()
                    .take(index)
                    .filter(|b| self.criteria.matches(b))
                    .count();
                self.visible.insert(at, booking.clone());
            }
            (None, false) => {}
        }
        self.bookings[index] = booking;
        true
    }

    pub fn set_criteria(&mut self, criteria: FilterCriteria) {
        self.criteria = criteria;
        self.visible = self.apply_filters();
    }

    /// The filtered view computed from scratch over the full collection.
    pub fn apply_filters(&self) -> Vec<Booking> {
        self.bookings
            .iter()
            .filter(|b| self.criteria.matches(b))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;
