//! Random booking factory that feeds the store on a fixed period.

use std::{collections::HashSet, ops::RangeInclusive, time::Duration};

use chrono::{DateTime, Local, TimeDelta};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use server_api::{ApiContext, BookingOrigin};
use shared::domain::{NewBooking, PartySize};
use tracing::{debug, info, warn};

const VENUES: &[&str] = &[
    "The Grand Ballroom",
    "Sunset Terrace",
    "Garden Pavilion",
    "Crystal Hall",
    "Rooftop Lounge",
    "Marina View",
    "Heritage Hall",
    "Sky Deck",
    "Vineyard Room",
    "Coastal Club",
    "Metropolitan Suite",
    "Riverside Pavilion",
    "Golden Gate Hall",
    "Oceanfront Terrace",
    "Downtown Loft",
    "Historic Manor",
    "Azure Banquet Hall",
    "Emerald Gardens",
    "Platinum Pavilion",
    "Diamond Terrace",
    "Sapphire Lounge",
    "Ruby Conference Center",
    "Pearl Event Space",
    "Opal Ballroom",
    "Topaz Meeting Hall",
    "Amber Reception Room",
    "Jade Garden Venue",
    "Onyx Event Center",
];

const EVENT_TYPES: &[&str] = &[
    "Wedding Reception",
    "Corporate Meeting",
    "Birthday Party",
    "Anniversary Celebration",
    "Business Conference",
    "Product Launch",
    "Graduation Party",
    "Retirement Celebration",
    "Holiday Party",
    "Team Building Event",
    "Charity Gala",
    "Art Exhibition",
    "Wine Tasting",
    "Networking Event",
    "Awards Ceremony",
    "Fashion Show",
    "Book Launch",
    "Fundraising Dinner",
    "Cultural Festival",
    "Music Concert",
    "Dance Performance",
    "Comedy Show",
    "Cooking Class",
    "Workshop Seminar",
    "Trade Show",
    "Job Fair",
    "Health & Wellness Fair",
    "Technology Summit",
    "Educational Workshop",
    "Community Meeting",
    "Sports Banquet",
    "Reunion Party",
];

const CUSTOMER_NAMES: &[&str] = &[
    "Sarah Johnson",
    "Michael Chen",
    "Emily Rodriguez",
    "David Thompson",
    "Jessica Williams",
    "Robert Anderson",
    "Amanda Davis",
    "Christopher Lee",
    "Michelle Brown",
    "Daniel Wilson",
    "Ashley Garcia",
    "Matthew Martinez",
    "Lauren Taylor",
    "Kevin Moore",
    "Stephanie Jackson",
    "Brandon White",
    "Nicole Harris",
    "Justin Clark",
    "Rachel Lewis",
    "Tyler Robinson",
    "Samantha Walker",
    "Jonathan Hall",
    "Megan Allen",
    "Ryan Young",
    "Brittany King",
    "Alexander Wright",
    "Danielle Lopez",
    "Nicholas Hill",
    "Kimberly Scott",
    "Andrew Green",
];

const MAX_PICK_ATTEMPTS: usize = 50;
const BOOKING_HORIZON_DAYS: i64 = 30;

type Combination = (&'static str, &'static str, &'static str);

pub struct MockBookingGenerator<R = StdRng> {
    rng: R,
    used_combinations: HashSet<Combination>,
}

impl MockBookingGenerator<StdRng> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl Default for MockBookingGenerator<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> MockBookingGenerator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            used_combinations: HashSet::new(),
        }
    }

    pub fn used_combinations(&self) -> usize {
        self.used_combinations.len()
    }

    pub fn next_booking(&mut self) -> NewBooking {
        self.next_booking_at(Local::now())
    }

    /// Picks a venue/event/customer triple not handed out recently. Once most
    /// triples are used the history is cleared; after
    /// [`MAX_PICK_ATTEMPTS`] misses a repeat is accepted.
    pub fn next_booking_at(&mut self, now: DateTime<Local>) -> NewBooking {
        self.reset_if_exhausted();

        let mut combination = self.pick();
        let mut attempts = 1;
        while self.used_combinations.contains(&combination) && attempts < MAX_PICK_ATTEMPTS {
            combination = self.pick();
            attempts += 1;
        }
        self.used_combinations.insert(combination);

        let (venue, event_type, customer) = combination;
        let party_size = self.rng.gen_range(party_size_range(event_type));
        NewBooking {
            venue_name: venue.to_string(),
            party_type: event_type.to_string(),
            customer_name: customer.to_string(),
            time: booking_time(&mut self.rng, now),
            party_size: PartySize(party_size),
        }
    }

    fn pick(&mut self) -> Combination {
        (
            VENUES.choose(&mut self.rng).copied().unwrap_or(VENUES[0]),
            EVENT_TYPES.choose(&mut self.rng).copied().unwrap_or(EVENT_TYPES[0]),
            CUSTOMER_NAMES
                .choose(&mut self.rng)
                .copied()
                .unwrap_or(CUSTOMER_NAMES[0]),
        )
    }

    fn reset_if_exhausted(&mut self) {
        let total = total_combinations();
        if self.used_combinations.len() * 5 > total * 4 {
            self.used_combinations.clear();
            info!("reset used booking combinations");
        }
    }
}

pub fn total_combinations() -> usize {
    VENUES.len() * EVENT_TYPES.len() * CUSTOMER_NAMES.len()
}

/// Head-count range for an event type, keyed on words in its name.
pub fn party_size_range(event_type: &str) -> RangeInclusive<u32> {
    let mentions = |words: [&str; 3]| words.iter().any(|w| event_type.contains(w));
    if mentions(["Wedding", "Gala", "Conference"]) {
        50..=149
    } else if mentions(["Corporate", "Meeting", "Workshop"]) {
        10..=39
    } else if mentions(["Birthday", "Anniversary", "Party"]) {
        15..=54
    } else {
        20..=79
    }
}

/// A day within the next month, between noon and 11:30 PM on the hour or
/// half hour, e.g. `Tue, Mar 4, 7:30 PM`.
fn booking_time(rng: &mut impl Rng, now: DateTime<Local>) -> String {
    let offset_ms = rng.gen_range(0..BOOKING_HORIZON_DAYS * 24 * 60 * 60 * 1000);
    let day = (now + TimeDelta::milliseconds(offset_ms)).date_naive();
    let hour = rng.gen_range(12..=23);
    let minute = if rng.gen_bool(0.5) { 0 } else { 30 };
    match day.and_hms_opt(hour, minute, 0) {
        Some(at) => at.format("%a, %b %-d, %-I:%M %p").to_string(),
        None => day.format("%a, %b %-d").to_string(),
    }
}

/// Creates one booking every `period` until the task is dropped. The first
/// booking arrives one period after start.
pub async fn run<R>(api: ApiContext, period: Duration, mut generator: MockBookingGenerator<R>)
where
    R: Rng + Send + 'static,
{
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    let mut generated: u64 = 0;
    loop {
        ticker.tick().await;
        match api
            .create_booking(generator.next_booking(), BookingOrigin::Generator)
            .await
        {
            Ok(booking) => {
                generated += 1;
                debug!(
                    booking_id = booking.id.0,
                    generated,
                    used_combinations = generator.used_combinations(),
                    "generator tick"
                );
            }
            Err(error) => warn!(%error, "generator produced a rejected booking"),
        }
    }
}

#[cfg(test)]
#[path = "tests/generator_tests.rs"]
mod tests;
