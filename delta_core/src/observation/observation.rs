use chrono::NaiveDate;

use crate::common::enums::Direction;

/// One closing price
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }
}

/// What happened the day after a previous-day delta of `bucket_key`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub bucket_key: f64,
    pub date: NaiveDate,
    pub direction: Direction,
    /// Always non-negative
    pub magnitude: f64,
}

impl Observation {
    pub fn new(bucket_key: f64, date: NaiveDate, direction: Direction, magnitude: f64) -> Self {
        Self {
            bucket_key,
            date,
            direction,
            magnitude: magnitude.abs(),
        }
    }

    /// Magnitude counted toward the drop statistics, 0 for a rise
    pub fn drop_contribution(&self) -> f64 {
        match self.direction {
            Direction::Drop => self.magnitude,
            Direction::Rise => 0.0,
        }
    }

    /// Magnitude counted toward the rise statistics, 0 for a drop
    pub fn rise_contribution(&self) -> f64 {
        match self.direction {
            Direction::Rise => self.magnitude,
            Direction::Drop => 0.0,
        }
    }
}
