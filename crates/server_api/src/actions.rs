use shared::{
    domain::{ActorId, Booking, BookingId},
    protocol::{ActionFailureReason, BookingAction, ServerEvent},
};
use storage::BookingStore;
use tracing::{debug, info};

use crate::hub::BroadcastHub;

/// Result of one confirm/decline request, addressed to the requester only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Success {
        action: BookingAction,
        booking: Booking,
    },
    Failure {
        action: BookingAction,
        booking_id: BookingId,
        reason: ActionFailureReason,
    },
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn to_event(&self) -> ServerEvent {
        match self {
            Self::Success { action, booking } => ServerEvent::ActionSucceeded {
                action: *action,
                booking_id: booking.id,
            },
            Self::Failure {
                action,
                booking_id,
                reason,
            } => ServerEvent::ActionFailed {
                action: *action,
                booking_id: *booking_id,
                reason: *reason,
            },
        }
    }
}

/// Applies confirm/decline requests. Borrows the store and hub for the
/// duration of one request, so callers must already hold the writer lock.
pub struct ActionProcessor<'a> {
    store: &'a mut BookingStore,
    hub: &'a mut BroadcastHub,
}

impl<'a> ActionProcessor<'a> {
    pub fn new(store: &'a mut BookingStore, hub: &'a mut BroadcastHub) -> Self {
        Self { store, hub }
    }

    /// Transitions the booking and, on success only, broadcasts the updated
    /// record once. Rejections produce no broadcast.
    pub fn apply(
        &mut self,
        actor: ActorId,
        booking_id: BookingId,
        action: BookingAction,
    ) -> ActionOutcome {
        match self.store.transition(booking_id, action, actor) {
            Ok(booking) => {
                info!(
                    booking_id = booking.id.0,
                    %actor,
                    status = %booking.status,
                    "booking resolved"
                );
                self.hub.broadcast(&ServerEvent::BookingUpdated {
                    booking: booking.clone(),
                });
                ActionOutcome::Success { action, booking }
            }
            Err(rejection) => {
                debug!(
                    booking_id = booking_id.0,
                    %actor,
                    action = action.as_str(),
                    %rejection,
                    "booking action rejected"
                );
                ActionOutcome::Failure {
                    action,
                    booking_id,
                    reason: rejection.reason(),
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/actions_tests.rs"]
mod tests;
