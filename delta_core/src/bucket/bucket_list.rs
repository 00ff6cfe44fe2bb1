use chrono::NaiveDate;
use std::cmp::Ordering;
use std::ops::Index;
use tracing::debug;

use crate::bucket::bucket_record::{ChangeBucketRecord, MergeOutcome};
use crate::common::stats_error::{Result, StatsError};
use crate::config::store_config::KeyPolicy;
use crate::observation::observation::Observation;

/// Bucket records of one instrument, strictly ascending by key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BucketList {
    lst: Vec<ChangeBucketRecord>,
}

/// In-range share of one bucket
#[derive(Debug, Clone, PartialEq)]
pub struct RangeBucket {
    pub bucket_key: f64,
    pub count: usize,
}

/// Distribution of bucket keys observed inside a date range
#[derive(Debug, Clone, PartialEq)]
pub struct RangeSummary {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub buckets: Vec<RangeBucket>,
    pub total: usize,
}

impl BucketList {
    pub fn new() -> Self {
        Self { lst: Vec::new() }
    }

    /// Build from records that must already be strictly ascending
    pub fn from_sorted(lst: Vec<ChangeBucketRecord>) -> Result<Self> {
        for (idx, pair) in lst.windows(2).enumerate() {
            if pair[0].bucket_key.partial_cmp(&pair[1].bucket_key) != Some(Ordering::Less) {
                return Err(StatsError::Parameter(format!(
                    "bucket {} key {} does not follow {}",
                    idx + 1,
                    pair[1].bucket_key,
                    pair[0].bucket_key
                )));
            }
        }
        Ok(Self { lst })
    }

    /// Build from records in any order, keeping the first record of a repeated key
    pub fn from_unsorted(mut lst: Vec<ChangeBucketRecord>) -> (Self, usize) {
        lst.retain(|r| !r.bucket_key.is_nan());
        lst.sort_by(|a, b| a.bucket_key.total_cmp(&b.bucket_key));
        let before = lst.len();
        lst.dedup_by(|b, a| a.bucket_key == b.bucket_key);
        let dropped = before - lst.len();
        (Self { lst }, dropped)
    }

    /// Index of the first record whose key is not below `key`
    fn lower_bound(&self, key: f64) -> usize {
        self.lst.partition_point(|r| r.bucket_key < key)
    }

    fn position(&self, key: f64) -> std::result::Result<usize, usize> {
        let idx = self.lower_bound(key);
        match self.lst.get(idx) {
            Some(r) if r.bucket_key == key => Ok(idx),
            _ => Err(idx),
        }
    }

    pub fn get(&self, key: f64) -> Option<&ChangeBucketRecord> {
        self.position(key).ok().map(|idx| &self.lst[idx])
    }

    /// File one observation under its (policy-adjusted) key.
    ///
    /// A new key is inserted where it keeps the list ascending; a known key
    /// merges the observation unless its date is already on record.
    pub fn insert_or_merge(&mut self, obs: &Observation, policy: KeyPolicy) -> Result<MergeOutcome> {
        let key = policy.apply(obs.bucket_key);
        if !key.is_finite() || !obs.magnitude.is_finite() || obs.magnitude < 0.0 {
            return Err(StatsError::Parameter(format!(
                "invalid observation on {}: key={} magnitude={}",
                obs.date, obs.bucket_key, obs.magnitude
            )));
        }

        let outcome = match self.position(key) {
            Ok(idx) => self.lst[idx].merge(obs),
            Err(idx) => {
                self.lst.insert(idx, ChangeBucketRecord::from_observation(key, obs));
                MergeOutcome::Created
            }
        };
        debug!(
            "key={} date={} {} {} -> {}",
            key, obs.date, obs.direction, obs.magnitude, outcome
        );
        Ok(outcome)
    }

    /// Count bucket occurrences that fall inside `[start, end]`
    pub fn summarize(&self, start: NaiveDate, end: NaiveDate) -> Result<RangeSummary> {
        if start > end {
            return Err(StatsError::Parameter(format!(
                "range start {} is after end {}",
                start, end
            )));
        }
        let buckets: Vec<RangeBucket> = self
            .lst
            .iter()
            .filter_map(|r| match r.occurrences_between(start, end) {
                0 => None,
                count => Some(RangeBucket {
                    bucket_key: r.bucket_key,
                    count,
                }),
            })
            .collect();
        let total = buckets.iter().map(|b| b.count).sum();
        Ok(RangeSummary {
            start,
            end,
            buckets,
            total,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangeBucketRecord> {
        self.lst.iter()
    }

    pub fn len(&self) -> usize {
        self.lst.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lst.is_empty()
    }

    pub fn into_inner(self) -> Vec<ChangeBucketRecord> {
        self.lst
    }
}

impl Index<usize> for BucketList {
    type Output = ChangeBucketRecord;

    fn index(&self, index: usize) -> &Self::Output {
        &self.lst[index]
    }
}

impl<'a> IntoIterator for &'a BucketList {
    type Item = &'a ChangeBucketRecord;
    type IntoIter = std::slice::Iter<'a, ChangeBucketRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.lst.iter()
    }
}
