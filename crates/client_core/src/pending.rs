use std::{collections::HashMap, time::Duration};

use shared::{domain::BookingId, protocol::BookingAction};
use tokio::time::Instant;

pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingAction {
    pub action: BookingAction,
    pub deadline: Instant,
}

/// Actions sent to the server that have not seen an outcome yet. At most one
/// per booking; entries past their deadline are dropped by [`expire`].
///
/// [`expire`]: PendingActions::expire
#[derive(Debug)]
pub struct PendingActions {
    timeout: Duration,
    entries: HashMap<BookingId, PendingAction>,
}

impl Default for PendingActions {
    fn default() -> Self {
        Self::new(DEFAULT_ACTION_TIMEOUT)
    }
}

impl PendingActions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            entries: HashMap::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns `false` if an action for `booking_id` is still outstanding.
    pub fn begin(&mut self, booking_id: BookingId, action: BookingAction, now: Instant) -> bool {
        if let Some(existing) = self.entries.get(&booking_id) {
            if existing.deadline > now {
                return false;
            }
        }
        self.entries.insert(
            booking_id,
            PendingAction {
                action,
                deadline: now + self.timeout,
            },
        );
        true
    }

    pub fn resolve(&mut self, booking_id: BookingId) -> Option<BookingAction> {
        self.entries.remove(&booking_id).map(|p| p.action)
    }

    pub fn get(&self, booking_id: BookingId) -> Option<BookingAction> {
        self.entries.get(&booking_id).map(|p| p.action)
    }

    /// Removes and returns every entry whose deadline is at or before `now`.
    pub fn expire(&mut self, now: Instant) -> Vec<(BookingId, BookingAction)> {
        let mut expired: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(id, p)| (*id, p.action))
            .collect();
        for (id, _) in &expired {
            self.entries.remove(id);
        }
        expired.sort_by_key(|(id, _)| *id);
        expired
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
