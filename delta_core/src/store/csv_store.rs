//! One CSV file per instrument holding its bucket records.
//!
//! Layout: a header row followed by one row per bucket in ascending key
//! order, columns `bucket_key,avg_drop,avg_rise,max_drop,max_rise,occurrences`.
//! Occurrences are ISO dates joined by the configured separator. Every write
//! replaces the whole file through a temporary sibling and a rename, so a
//! failed call leaves the previous version in place.

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::bucket::bucket_list::{BucketList, RangeSummary};
use crate::bucket::bucket_record::{ChangeBucketRecord, MergeOutcome};
use crate::common::{
    stats_error::{Result, StatsError},
    time::{parse_date, to_date_str},
    utils::store_name,
};
use crate::config::store_config::StoreConfig;
use crate::observation::observation::Observation;

pub const HEADER: [&str; 6] = [
    "bucket_key",
    "avg_drop",
    "avg_rise",
    "max_drop",
    "max_rise",
    "occurrences",
];

const STORE_EXT: &str = "csv";

/// Result of a lenient load
#[derive(Debug, Clone)]
pub struct LoadedStore {
    pub buckets: BucketList,
    /// Corrupt or duplicate rows left out
    pub skipped: usize,
}

/// Per-outcome counts of a batch merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeTally {
    pub created: usize,
    pub merged: usize,
    pub duplicates: usize,
}

impl MergeTally {
    pub fn record(&mut self, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Created => self.created += 1,
            MergeOutcome::Merged => self.merged += 1,
            MergeOutcome::Duplicate => self.duplicates += 1,
        }
    }

    pub fn changed(&self) -> bool {
        self.created + self.merged > 0
    }
}

#[derive(Debug, Clone)]
pub struct CsvStore {
    config: StoreConfig,
}

impl CsvStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn path(&self, instrument: &str) -> Result<PathBuf> {
        let name = store_name(instrument)?;
        Ok(self
            .config
            .data_dir
            .join(format!("{}.{}", name, STORE_EXT)))
    }

    pub fn exists(&self, instrument: &str) -> Result<bool> {
        Ok(self.path(instrument)?.is_file())
    }

    /// Create an empty store. An existing store is left untouched and
    /// reported as `AlreadyInitialized`.
    pub fn initialize(&self, instrument: &str) -> Result<()> {
        let path = self.path(instrument)?;
        if path.exists() {
            return Err(StatsError::AlreadyInitialized {
                instrument: instrument.to_string(),
            });
        }
        self.write(&path, &BucketList::new())?;
        info!("initialized store for {} at {:?}", instrument, path);
        Ok(())
    }

    /// Load every record, failing on the first corrupt row
    pub fn load_strict(&self, instrument: &str) -> Result<BucketList> {
        let path = self.existing_path(instrument)?;
        let mut records = Vec::new();
        for row in self.read_rows(&path)? {
            let (line, record) = row?;
            records.push(self.decode(line, &record)?);
        }
        BucketList::from_sorted(records).map_err(|e| StatsError::malformed(0, e.to_string()))
    }

    /// Load every readable record, skipping corrupt rows.
    ///
    /// Fails outright when the file or its header cannot be read.
    pub fn load(&self, instrument: &str) -> Result<LoadedStore> {
        let path = self.existing_path(instrument)?;
        let mut records = Vec::new();
        let mut skipped = 0;
        for row in self.read_rows(&path)? {
            let decoded = row.and_then(|(line, record)| self.decode(line, &record));
            match decoded {
                Ok(rec) => records.push(rec),
                Err(e) => {
                    warn!("{}: skipping row: {}", instrument, e);
                    skipped += 1;
                }
            }
        }
        let (buckets, dropped) = BucketList::from_unsorted(records);
        if dropped > 0 {
            warn!("{}: dropped {} rows with repeated keys", instrument, dropped);
        }
        Ok(LoadedStore {
            buckets,
            skipped: skipped + dropped,
        })
    }

    /// File one observation and persist the result.
    ///
    /// An instrument without a store gets one on the fly.
    pub fn insert_or_merge(&self, instrument: &str, obs: &Observation) -> Result<MergeOutcome> {
        let tally = self.insert_or_merge_many(instrument, std::iter::once(*obs))?;
        Ok(if tally.created > 0 {
            MergeOutcome::Created
        } else if tally.merged > 0 {
            MergeOutcome::Merged
        } else {
            MergeOutcome::Duplicate
        })
    }

    /// File a batch of observations under a single load/store cycle.
    ///
    /// Nothing is written unless every observation is accepted.
    pub fn insert_or_merge_many<I>(&self, instrument: &str, observations: I) -> Result<MergeTally>
    where
        I: IntoIterator<Item = Observation>,
    {
        let path = self.path(instrument)?;
        let mut buckets = if path.exists() {
            self.load_strict(instrument)?
        } else {
            debug!("{}: no store yet, starting empty", instrument);
            BucketList::new()
        };

        let policy = self.config.key_policy();
        let mut tally = MergeTally::default();
        for obs in observations {
            tally.record(buckets.insert_or_merge(&obs, policy)?);
        }

        if tally.changed() || !path.exists() {
            self.write(&path, &buckets)?;
            info!(
                "{}: {} buckets saved (+{} new, {} merged, {} duplicate)",
                instrument,
                buckets.len(),
                tally.created,
                tally.merged,
                tally.duplicates
            );
        }
        Ok(tally)
    }

    /// Record filed under `delta` once the key policy is applied
    pub fn get(&self, instrument: &str, delta: f64) -> Result<Option<ChangeBucketRecord>> {
        let key = self.config.key_policy().apply(delta);
        let loaded = self.load(instrument)?;
        Ok(loaded.buckets.get(key).cloned())
    }

    pub fn query(&self, instrument: &str, start: NaiveDate, end: NaiveDate) -> Result<RangeSummary> {
        self.load(instrument)?.buckets.summarize(start, end)
    }

    /// Store names present in the data directory
    pub fn instruments(&self) -> Result<Vec<String>> {
        let dir = &self.config.data_dir;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some(STORE_EXT) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn existing_path(&self, instrument: &str) -> Result<PathBuf> {
        let path = self.path(instrument)?;
        if !path.is_file() {
            return Err(StatsError::NotFound {
                instrument: instrument.to_string(),
            });
        }
        Ok(path)
    }

    /// Open a store and check its header; rows come back with their line numbers
    fn read_rows(&self, path: &Path) -> Result<impl Iterator<Item = Result<(u64, StringRecord)>>> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let headers = rdr.headers()?;
        if headers.iter().map(str::trim).ne(HEADER.iter().copied()) {
            return Err(StatsError::malformed(
                1,
                format!("unexpected header {:?}", headers.iter().collect::<Vec<_>>()),
            ));
        }

        Ok(rdr.into_records().map(|row| -> Result<(u64, StringRecord)> {
            let record = row?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            Ok((line, record))
        }))
    }

    fn decode(&self, line: u64, record: &StringRecord) -> Result<ChangeBucketRecord> {
        if record.len() != HEADER.len() {
            return Err(StatsError::malformed(
                line,
                format!("expected {} columns, found {}", HEADER.len(), record.len()),
            ));
        }

        let number = |idx: usize| -> Result<f64> {
            let raw = record[idx].trim();
            let value: f64 = raw
                .parse()
                .map_err(|_| StatsError::malformed(line, format!("{} is not a number: {:?}", HEADER[idx], raw)))?;
            if !value.is_finite() {
                return Err(StatsError::malformed(line, format!("{} is not finite: {:?}", HEADER[idx], raw)));
            }
            Ok(value)
        };
        let magnitude = |idx: usize| -> Result<f64> {
            let value = number(idx)?;
            if value < 0.0 {
                return Err(StatsError::malformed(line, format!("{} is negative: {}", HEADER[idx], value)));
            }
            Ok(value)
        };

        let occurrences = record[5]
            .split(self.config.occurrence_separator)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| parse_date(s).map_err(|e| StatsError::malformed(line, format!("occurrences: {}", e))))
            .collect::<Result<BTreeSet<NaiveDate>>>()?;
        if occurrences.is_empty() {
            return Err(StatsError::malformed(line, "no occurrences"));
        }

        Ok(ChangeBucketRecord {
            bucket_key: number(0)?,
            avg_drop: magnitude(1)?,
            avg_rise: magnitude(2)?,
            max_drop: magnitude(3)?,
            max_rise: magnitude(4)?,
            occurrences,
        })
    }

    fn encode(&self, rec: &ChangeBucketRecord) -> [String; 6] {
        let sep = self.config.occurrence_separator.to_string();
        let occurrences = rec
            .occurrences
            .iter()
            .map(to_date_str)
            .collect::<Vec<_>>()
            .join(sep.as_str());
        [
            rec.bucket_key.to_string(),
            rec.avg_drop.to_string(),
            rec.avg_rise.to_string(),
            rec.max_drop.to_string(),
            rec.max_rise.to_string(),
            occurrences,
        ]
    }

    /// Replace the store at `path` with `buckets`
    fn write(&self, path: &Path, buckets: &BucketList) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension(format!("{}.tmp", STORE_EXT));
        let written = self.write_to(&tmp, buckets);
        if let Err(e) = written {
            fs::remove_file(&tmp).ok();
            return Err(e);
        }
        if let Err(e) = fs::rename(&tmp, path) {
            fs::remove_file(&tmp).ok();
            return Err(e.into());
        }
        Ok(())
    }

    fn write_to(&self, tmp: &Path, buckets: &BucketList) -> Result<()> {
        let mut wtr = WriterBuilder::new().from_path(tmp)?;
        wtr.write_record(HEADER)?;
        for rec in buckets {
            wtr.write_record(&self.encode(rec))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::enums::Direction;
    use crate::common::stats_error::ErrCode;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn create_test_store() -> (CsvStore, PathBuf) {
        let unique_id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let temp_dir = std::env::temp_dir().join(format!(
            "delta_core_store_{}_{}",
            std::process::id(),
            unique_id
        ));
        fs::remove_dir_all(&temp_dir).ok();
        let config = StoreConfig::new(Some(temp_dir.clone()), None, None).unwrap();
        (CsvStore::new(config), temp_dir)
    }

    fn cleanup_test_dir(temp_dir: PathBuf) {
        fs::remove_dir_all(temp_dir).ok();
    }

    fn obs(key: f64, d: &str, dir: Direction, mag: f64) -> Observation {
        Observation::new(key, parse_date(d).unwrap(), dir, mag)
    }

    #[test]
    fn test_initialize_twice_keeps_data() {
        let (store, temp_dir) = create_test_store();
        store.initialize("TSLA").unwrap();
        store
            .insert_or_merge("TSLA", &obs(1.5, "2024-01-02", Direction::Rise, 2.0))
            .unwrap();

        let err = store.initialize("tsla").unwrap_err();
        assert_eq!(err.errcode(), ErrCode::AlreadyInitialized);
        assert_eq!(store.load_strict("TSLA").unwrap().len(), 1);
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_initialize_writes_header_only() {
        let (store, temp_dir) = create_test_store();
        store.initialize("AAPL").unwrap();
        let content = fs::read_to_string(store.path("AAPL").unwrap()).unwrap();
        assert_eq!(content, "bucket_key,avg_drop,avg_rise,max_drop,max_rise,occurrences\n");
        assert!(store.load_strict("AAPL").unwrap().is_empty());
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_insert_creates_missing_store() {
        let (store, temp_dir) = create_test_store();
        assert!(!store.exists("MSFT").unwrap());
        let outcome = store
            .insert_or_merge("MSFT", &obs(-0.5, "2024-01-02", Direction::Drop, 0.25))
            .unwrap();
        assert_eq!(outcome, MergeOutcome::Created);
        assert!(store.exists("MSFT").unwrap());
        assert_eq!(store.instruments().unwrap(), vec!["msft".to_string()]);
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_persisted_layout() {
        let (store, temp_dir) = create_test_store();
        store
            .insert_or_merge("TSLA", &obs(1.5, "2024-01-09", Direction::Drop, 1.0))
            .unwrap();
        store
            .insert_or_merge("TSLA", &obs(1.5, "2024-01-02", Direction::Rise, 2.0))
            .unwrap();
        store
            .insert_or_merge("TSLA", &obs(-0.1, "2024-01-03", Direction::Rise, 0.1))
            .unwrap();

        let content = fs::read_to_string(store.path("TSLA").unwrap()).unwrap();
        assert_eq!(
            content,
            "bucket_key,avg_drop,avg_rise,max_drop,max_rise,occurrences\n\
             -0.1,0,0.1,0,0.1,2024-01-03\n\
             1.5,0.5,1,1,2,2024-01-02;2024-01-09\n"
        );
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_numbers_round_trip_exactly() {
        let (store, temp_dir) = create_test_store();
        let key = 0.3 - 0.1;
        store
            .insert_or_merge("X", &obs(key, "2024-01-02", Direction::Rise, 1.0 / 3.0))
            .unwrap();
        store
            .insert_or_merge("X", &obs(key, "2024-01-03", Direction::Drop, 2.0 / 7.0))
            .unwrap();
        let loaded = store.load_strict("X").unwrap();
        assert_eq!(loaded[0].bucket_key, key);
        assert_eq!(loaded[0].avg_rise, (1.0 / 3.0) / 2.0);
        assert_eq!(loaded[0].avg_drop, (2.0 / 7.0) / 2.0);
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_duplicate_does_not_rewrite() {
        let (store, temp_dir) = create_test_store();
        let o = obs(1.5, "2024-01-02", Direction::Rise, 2.0);
        store.insert_or_merge("TSLA", &o).unwrap();
        let before = fs::read_to_string(store.path("TSLA").unwrap()).unwrap();
        assert_eq!(store.insert_or_merge("TSLA", &o).unwrap(), MergeOutcome::Duplicate);
        let after = fs::read_to_string(store.path("TSLA").unwrap()).unwrap();
        assert_eq!(before, after);
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_corrupt_row_fails_merge_and_keeps_file() {
        let (store, temp_dir) = create_test_store();
        store.initialize("BAD").unwrap();
        let path = store.path("BAD").unwrap();
        let corrupt = "bucket_key,avg_drop,avg_rise,max_drop,max_rise,occurrences\n\
                       1.0,0,1,0,1,2024-01-02\n\
                       abc,0,1,0,1,2024-01-03\n\
                       2.0,0,1,0,1\n\
                       3.0,0,1,0,1,2024-01-04\n";
        fs::write(&path, corrupt).unwrap();

        let err = store
            .insert_or_merge("BAD", &obs(5.0, "2024-02-01", Direction::Rise, 1.0))
            .unwrap_err();
        assert_eq!(err.errcode(), ErrCode::MalformedRecord);
        assert_eq!(fs::read_to_string(&path).unwrap(), corrupt);

        let loaded = store.load("BAD").unwrap();
        assert_eq!(loaded.skipped, 2);
        let keys: Vec<f64> = loaded.buckets.iter().map(|r| r.bucket_key).collect();
        assert_eq!(keys, vec![1.0, 3.0]);
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_bad_header_fails_load() {
        let (store, temp_dir) = create_test_store();
        store.initialize("HDR").unwrap();
        fs::write(store.path("HDR").unwrap(), "key,count\n1.0,2\n").unwrap();
        assert_eq!(store.load("HDR").unwrap_err().errcode(), ErrCode::MalformedRecord);
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_unsorted_file_is_malformed_for_merge() {
        let (store, temp_dir) = create_test_store();
        store.initialize("ORD").unwrap();
        fs::write(
            store.path("ORD").unwrap(),
            "bucket_key,avg_drop,avg_rise,max_drop,max_rise,occurrences\n\
             2.0,0,1,0,1,2024-01-02\n\
             1.0,0,1,0,1,2024-01-03\n",
        )
        .unwrap();
        assert_eq!(store.load_strict("ORD").unwrap_err().errcode(), ErrCode::MalformedRecord);
        let loaded = store.load("ORD").unwrap();
        assert_eq!(loaded.buckets[0].bucket_key, 1.0);
        assert_eq!(loaded.skipped, 0);
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_read_operations_need_a_store() {
        let (store, temp_dir) = create_test_store();
        assert_eq!(store.load("NONE").unwrap_err().errcode(), ErrCode::NotFound);
        assert_eq!(store.get("NONE", 1.0).unwrap_err().errcode(), ErrCode::NotFound);
        let d = parse_date("2024-01-01").unwrap();
        assert_eq!(store.query("NONE", d, d).unwrap_err().errcode(), ErrCode::NotFound);
        assert!(store.instruments().unwrap().is_empty());
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_rejected_batch_writes_nothing() {
        let (store, temp_dir) = create_test_store();
        let batch = vec![
            obs(1.0, "2024-01-02", Direction::Rise, 1.0),
            obs(f64::NAN, "2024-01-03", Direction::Rise, 1.0),
        ];
        assert!(store.insert_or_merge_many("NAN", batch).is_err());
        assert!(!store.exists("NAN").unwrap());
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_negative_magnitude_never_reaches_disk() {
        let (store, temp_dir) = create_test_store();
        let negative = Observation {
            bucket_key: 1.0,
            date: parse_date("2024-01-02").unwrap(),
            direction: Direction::Drop,
            magnitude: -2.0,
        };
        assert_eq!(store.insert_or_merge("NEG", &negative).unwrap_err().errcode(), ErrCode::ParaError);
        assert!(!store.exists("NEG").unwrap());

        store
            .insert_or_merge("NEG", &obs(1.0, "2024-01-03", Direction::Drop, 2.0))
            .unwrap();
        let loaded = store.load("NEG").unwrap();
        assert_eq!(loaded.skipped, 0);
        assert_eq!(loaded.buckets[0].max_drop, 2.0);
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_failed_rename_removes_temp_file() {
        let (store, temp_dir) = create_test_store();
        // a non-empty directory where the store file should go
        let path = store.path("DIR").unwrap();
        fs::create_dir_all(path.join("inner")).unwrap();

        assert!(store.write(&path, &BucketList::new()).is_err());
        let tmp = path.with_extension(format!("{}.tmp", STORE_EXT));
        assert!(!tmp.exists());
        assert!(path.is_dir());
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_custom_separator() {
        let (_, temp_dir) = create_test_store();
        let config = StoreConfig::new(Some(temp_dir.clone()), None, Some('|')).unwrap();
        let store = CsvStore::new(config);
        store
            .insert_or_merge("SEP", &obs(1.0, "2024-01-02", Direction::Rise, 1.0))
            .unwrap();
        store
            .insert_or_merge("SEP", &obs(1.0, "2024-01-05", Direction::Rise, 1.0))
            .unwrap();
        let content = fs::read_to_string(store.path("SEP").unwrap()).unwrap();
        assert!(content.contains("2024-01-02|2024-01-05"));
        assert_eq!(store.load_strict("SEP").unwrap()[0].occurrence_count(), 2);
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_get_applies_key_policy() {
        let (_, temp_dir) = create_test_store();
        let config = StoreConfig::new(Some(temp_dir.clone()), Some(2), None).unwrap();
        let store = CsvStore::new(config);
        store
            .insert_or_merge("Q", &obs(0.3 - 0.1, "2024-01-02", Direction::Drop, 0.5))
            .unwrap();
        let rec = store.get("Q", 0.2).unwrap().unwrap();
        assert_eq!(rec.bucket_key, 0.2);
        assert_eq!(rec.max_drop, 0.5);
        assert!(store.get("Q", 0.21).unwrap().is_none());
        cleanup_test_dir(temp_dir);
    }
}
