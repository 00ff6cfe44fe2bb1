use chrono::NaiveDate;
use std::collections::BTreeSet;
use strum_macros::Display;

use crate::observation::observation::Observation;

/// Outcome of handing one observation to a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum MergeOutcome {
    Created,
    Merged,
    Duplicate,
}

/// Aggregate of every observation filed under one previous-day delta
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeBucketRecord {
    pub bucket_key: f64,
    pub avg_drop: f64,
    pub avg_rise: f64,
    pub max_drop: f64,
    pub max_rise: f64,
    pub occurrences: BTreeSet<NaiveDate>,
}

impl ChangeBucketRecord {
    pub fn from_observation(bucket_key: f64, obs: &Observation) -> Self {
        let drop = obs.drop_contribution();
        let rise = obs.rise_contribution();
        Self {
            bucket_key,
            avg_drop: drop,
            avg_rise: rise,
            max_drop: drop,
            max_rise: rise,
            occurrences: BTreeSet::from([obs.date]),
        }
    }

    /// Fold one more dated observation into the running statistics.
    ///
    /// A date already on record leaves the bucket untouched. Drop and rise
    /// keep separate running means; the direction that did not happen
    /// contributes 0 to its own mean.
    pub fn merge(&mut self, obs: &Observation) -> MergeOutcome {
        if self.occurrences.contains(&obs.date) {
            return MergeOutcome::Duplicate;
        }

        let n = self.occurrences.len() as f64;
        let drop = obs.drop_contribution();
        let rise = obs.rise_contribution();

        self.avg_drop = (self.avg_drop * n + drop) / (n + 1.0);
        self.avg_rise = (self.avg_rise * n + rise) / (n + 1.0);
        self.max_drop = self.max_drop.max(drop);
        self.max_rise = self.max_rise.max(rise);
        self.occurrences.insert(obs.date);

        MergeOutcome::Merged
    }

    pub fn occurrence_count(&self) -> usize {
        self.occurrences.len()
    }

    pub fn first_seen(&self) -> Option<NaiveDate> {
        self.occurrences.first().copied()
    }

    pub fn last_seen(&self) -> Option<NaiveDate> {
        self.occurrences.last().copied()
    }

    /// Dates of this bucket inside `[start, end]`
    pub fn occurrences_between(&self, start: NaiveDate, end: NaiveDate) -> usize {
        self.occurrences.range(start..=end).count()
    }
}
