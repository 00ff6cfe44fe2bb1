use crate::common::enums::Direction;
use crate::observation::observation::{Observation, PricePoint};

/// Turn a date-ordered closing series into next-day observations.
///
/// Every interior day yields one observation: its key is the move into that
/// day, its direction and magnitude describe the move out of it. The first
/// and last points only serve as neighbours. Series shorter than three
/// points yield nothing. The iterator borrows the series, so calling again
/// restarts from scratch.
pub fn extract(series: &[PricePoint]) -> impl Iterator<Item = Observation> + '_ {
    series.windows(3).map(|w| {
        let (prev, cur, next) = (&w[0], &w[1], &w[2]);
        let delta_next = next.close - cur.close;
        Observation {
            bucket_key: cur.close - prev.close,
            date: cur.date,
            direction: Direction::of_delta(delta_next),
            magnitude: delta_next.abs(),
        }
    })
}

/// Number of observations `extract` yields for a series of `len` points
pub fn observation_count(len: usize) -> usize {
    len.saturating_sub(2)
}
