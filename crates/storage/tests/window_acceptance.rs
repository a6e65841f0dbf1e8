use std::collections::HashMap;

use rand::{rngs::StdRng, Rng, SeedableRng};
use shared::{
    domain::{ActorId, BookingId, BookingStatus, NewBooking, PartySize, BOOKING_WINDOW},
    protocol::BookingAction,
};
use storage::{BookingStore, Rejection};

fn fields(n: u32) -> NewBooking {
    NewBooking {
        venue_name: format!("Venue {n}"),
        party_type: "Charity Gala".to_string(),
        customer_name: "Kevin Moore".to_string(),
        time: "Mon, Apr 7, 6:00 PM".to_string(),
        party_size: PartySize(n % 120 + 1),
    }
}

#[test]
fn random_workload_keeps_terminal_statuses_and_window_order() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut store = BookingStore::new();
    let actors: Vec<ActorId> = (0..4).map(|_| ActorId::new_random()).collect();
    let mut resolved: HashMap<BookingId, BookingStatus> = HashMap::new();
    let mut created = 0u32;

    for _ in 0..2_000 {
        if rng.gen_bool(0.3) {
            created += 1;
            store.create(fields(created)).expect("create");
        } else if created > 0 {
            let id = BookingId(rng.gen_range(1..=i64::from(created) + 2));
            let action = if rng.gen_bool(0.5) {
                BookingAction::Confirm
            } else {
                BookingAction::Decline
            };
            let actor = actors[rng.gen_range(0..actors.len())];
            match store.transition(id, action, actor) {
                Ok(booking) => {
                    assert!(resolved.insert(id, booking.status).is_none());
                    assert_eq!(booking.status, action.target_status());
                }
                Err(Rejection::InvalidState { status, .. }) => {
                    assert_eq!(resolved.get(&id), Some(&status));
                }
                Err(Rejection::NotFound(_)) => {
                    assert!(store.get(id).is_err());
                }
            }
        }

        let snapshot = store.snapshot();
        assert!(snapshot.len() <= BOOKING_WINDOW);
        assert!(snapshot.windows(2).all(|pair| pair[0].id > pair[1].id));
        for booking in &snapshot {
            match resolved.get(&booking.id) {
                Some(status) => assert_eq!(booking.status, *status),
                None => assert_eq!(booking.status, BookingStatus::Pending),
            }
        }
    }

    assert_eq!(store.total_created(), u64::from(created));
}
