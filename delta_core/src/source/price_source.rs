use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::common::{
    stats_error::{Result, StatsError},
    time::parse_stamp,
    utils::store_name,
};
use crate::observation::observation::PricePoint;

/// Daily closing prices for an instrument
pub trait PriceSource {
    /// Closes from `start` through `end` (latest available when `None`), ordered by date
    fn closes(&self, instrument: &str, start: NaiveDate, end: Option<NaiveDate>) -> Result<Vec<PricePoint>>;
}

/// Sort by date, keep the last close of a repeated date, clip to the range
fn normalize(mut points: Vec<PricePoint>, start: NaiveDate, end: Option<NaiveDate>) -> Vec<PricePoint> {
    points.retain(|p| p.date >= start && end.map_or(true, |e| p.date <= e));
    points.sort_by_key(|p| p.date);
    points.reverse();
    points.dedup_by_key(|p| p.date);
    points.reverse();
    points
}

/// Prices kept in memory, keyed by lower-cased instrument id
#[derive(Debug, Clone, Default)]
pub struct MemoryPriceSource {
    series: HashMap<String, Vec<PricePoint>>,
}

impl MemoryPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, instrument: &str, points: Vec<PricePoint>) -> Result<()> {
        self.series.insert(store_name(instrument)?, points);
        Ok(())
    }
}

impl PriceSource for MemoryPriceSource {
    fn closes(&self, instrument: &str, start: NaiveDate, end: Option<NaiveDate>) -> Result<Vec<PricePoint>> {
        let points = self
            .series
            .get(&store_name(instrument)?)
            .ok_or_else(|| StatsError::NotFound {
                instrument: instrument.to_string(),
            })?;
        Ok(normalize(points.clone(), start, end))
    }
}

const DATE_COLUMNS: [&str; 4] = ["date", "timestamp", "datetime", "time"];
const CLOSE_COLUMNS: [&str; 3] = ["close", "adj_close", "adj close"];
// timestamp,open,high,low,close,volume
const BAR_CLOSE_IDX: usize = 4;

/// Reads `<dir>/<instrument>.csv`.
///
/// Columns are found by header name (`date`/`timestamp` and `close`), falling
/// back to the `timestamp,open,high,low,close,volume` bar layout.
#[derive(Debug, Clone)]
pub struct CsvPriceSource {
    dir: PathBuf,
}

impl CsvPriceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn columns(headers: &StringRecord) -> Result<(usize, usize)> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.contains(&h.trim().to_ascii_lowercase().as_str()))
        };
        match (find(&DATE_COLUMNS), find(&CLOSE_COLUMNS)) {
            (Some(date), Some(close)) => Ok((date, close)),
            _ if headers.len() > BAR_CLOSE_IDX => Ok((0, BAR_CLOSE_IDX)),
            _ => Err(StatsError::SourceFormat(format!(
                "no date/close columns in {:?}",
                headers.iter().collect::<Vec<_>>()
            ))),
        }
    }

    fn parse_record(record: &StringRecord, date_idx: usize, close_idx: usize) -> Result<PricePoint> {
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let (Some(stamp), Some(close)) = (record.get(date_idx), record.get(close_idx)) else {
            return Err(StatsError::SourceFormat(format!("line {}: missing columns", line)));
        };
        let date = parse_stamp(stamp).map_err(|e| StatsError::SourceFormat(format!("line {}: {}", line, e)))?;
        let close: f64 = close
            .trim()
            .parse()
            .map_err(|_| StatsError::SourceFormat(format!("line {}: close {:?} is not a number", line, close)))?;
        if !close.is_finite() || close <= 0.0 {
            return Err(StatsError::SourceFormat(format!("line {}: close={} is not a price", line, close)));
        }
        Ok(PricePoint::new(date, close))
    }
}

impl PriceSource for CsvPriceSource {
    fn closes(&self, instrument: &str, start: NaiveDate, end: Option<NaiveDate>) -> Result<Vec<PricePoint>> {
        let path = self.dir.join(format!("{}.csv", store_name(instrument)?));
        if !path.is_file() {
            return Err(StatsError::NotFound {
                instrument: instrument.to_string(),
            });
        }

        let mut rdr = ReaderBuilder::new().flexible(true).from_path(&path)?;
        let (date_idx, close_idx) = Self::columns(rdr.headers()?)?;
        let mut points = Vec::new();
        for result in rdr.records() {
            let record = result?;
            points.push(Self::parse_record(&record, date_idx, close_idx)?);
        }
        Ok(normalize(points, start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir() -> PathBuf {
        let unique_id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "delta_core_prices_{}_{}",
            std::process::id(),
            unique_id
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_memory_source_orders_and_clips() {
        let mut source = MemoryPriceSource::new();
        source
            .insert(
                "TSLA",
                vec![
                    PricePoint::new(date("2024-01-03"), 3.0),
                    PricePoint::new(date("2024-01-01"), 1.0),
                    PricePoint::new(date("2024-01-02"), 2.0),
                    PricePoint::new(date("2024-01-02"), 2.5),
                    PricePoint::new(date("2024-01-04"), 4.0),
                ],
            )
            .unwrap();

        let all = source.closes("tsla", date("2024-01-01"), None).unwrap();
        let closes: Vec<f64> = all.iter().map(|p| p.close).collect();
        assert_eq!(closes, vec![1.0, 2.5, 3.0, 4.0]);

        let clipped = source
            .closes("TSLA", date("2024-01-02"), Some(date("2024-01-03")))
            .unwrap();
        assert_eq!(clipped.len(), 2);
        assert_eq!(clipped[0].date, date("2024-01-02"));

        assert!(matches!(
            source.closes("AAPL", date("2024-01-01"), None),
            Err(StatsError::NotFound { .. })
        ));
    }

    #[test]
    fn test_csv_source_named_columns() {
        let dir = temp_dir();
        fs::write(
            dir.join("aapl.csv"),
            "Date,Open,Close,Volume\n2024-01-02,1,10.5,100\n2024-01-03,1,11.0,100\n2024-01-04,1,10.0,100\n",
        )
        .unwrap();
        let source = CsvPriceSource::new(&dir);
        let points = source.closes("AAPL", date("2024-01-01"), None).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[1], PricePoint::new(date("2024-01-03"), 11.0));
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_csv_source_bar_layout() {
        let dir = temp_dir();
        fs::write(
            dir.join("btc.csv"),
            "t,o,h,l,c,v\n2024-01-02 00:00:00,1,2,0.5,1.5,7\n2024-01-03 00:00:00,1,2,0.5,1.75,7\n",
        )
        .unwrap();
        let source = CsvPriceSource::new(&dir);
        let points = source.closes("BTC", date("2024-01-01"), None).unwrap();
        assert_eq!(points[0].close, 1.5);
        assert_eq!(points[1].date, date("2024-01-03"));
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_csv_source_rejects_bad_prices() {
        let dir = temp_dir();
        fs::write(dir.join("bad.csv"), "date,close\n2024-01-02,-1\n").unwrap();
        fs::write(dir.join("nan.csv"), "date,close\n2024-01-02,abc\n").unwrap();
        fs::write(dir.join("cols.csv"), "a,b\n2024-01-02,1\n").unwrap();
        let source = CsvPriceSource::new(&dir);
        let start = date("2024-01-01");
        assert!(matches!(source.closes("bad", start, None), Err(StatsError::SourceFormat(_))));
        assert!(matches!(source.closes("nan", start, None), Err(StatsError::SourceFormat(_))));
        assert!(matches!(source.closes("cols", start, None), Err(StatsError::SourceFormat(_))));
        assert!(matches!(source.closes("missing", start, None), Err(StatsError::NotFound { .. })));
        fs::remove_dir_all(dir).ok();
    }
}
