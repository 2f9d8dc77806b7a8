//! Random round content

use super::types::Event;
use rand::Rng;
use rust_decimal::Decimal;

/// Payout buckets as (cumulative probability in percent, cents range)
///
/// The first bucket is the losing fruit and always pays exactly zero.
const BUCKETS: [(u32, std::ops::Range<i64>); 5] = [
    (20, 0..1),
    (70, 0..51),
    (80, 51..100),
    (90, 100..200),
    (100, 200..500),
];

const MAX_ASSET_ID: u8 = 10;
const MAX_DELAY_MS: u32 = 1_000;
const FLIGHT_MS: std::ops::RangeInclusive<u32> = 1_200..=1_800;

/// Draw one multiplier from the payout table, at two decimal places
pub fn sample_multiplier<R: Rng + ?Sized>(rng: &mut R) -> Decimal {
    let roll = rng.gen_range(0..100u32);
    let cents = BUCKETS
        .iter()
        .find(|(upper, _)| roll < *upper)
        .map(|(_, range)| rng.gen_range(range.clone()))
        .unwrap_or(0);
    Decimal::new(cents, 2)
}

/// Build the events of a new round
///
/// The count is uniform in `[min_events, max_events]`; ids start at 1.
pub fn generate_events<R: Rng + ?Sized>(rng: &mut R, min_events: usize, max_events: usize) -> Vec<Event> {
    let upper = max_events.max(min_events);
    let count = rng.gen_range(min_events..=upper);

    (1..=count as u32)
        .map(|event_id| Event {
            event_id,
            multiplier: sample_multiplier(rng),
            asset_id: rng.gen_range(0..=MAX_ASSET_ID),
            delay: rng.gen_range(0..MAX_DELAY_MS),
            flight_duration: rng.gen_range(FLIGHT_MS),
        })
        .collect()
}
