use chrono::NaiveDate;
use tracing::{error, info, warn};

use crate::common::stats_error::{ErrCode, Result};
use crate::observation::extractor::{extract, observation_count};
use crate::source::price_source::PriceSource;
use crate::store::csv_store::{CsvStore, MergeTally};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub instrument: String,
    pub points: usize,
    pub observations: usize,
    pub tally: MergeTally,
}

/// Fetch one instrument's closes and fold every observation into its store.
///
/// A series too short to yield observations is reported, not treated as an
/// error, and leaves the store untouched.
pub fn ingest(
    store: &CsvStore,
    source: &dyn PriceSource,
    instrument: &str,
    start: NaiveDate,
    end: Option<NaiveDate>,
) -> Result<IngestReport> {
    let series = source.closes(instrument, start, end)?;
    let observations = observation_count(series.len());

    let tally = if observations == 0 {
        warn!(
            "{}: {} with {} price points from {}",
            instrument,
            ErrCode::EmptySeries,
            series.len(),
            start
        );
        MergeTally::default()
    } else {
        store.insert_or_merge_many(instrument, extract(&series))?
    };

    info!(
        "{}: {} points, {} observations, {} new buckets, {} merged, {} duplicate",
        instrument,
        series.len(),
        observations,
        tally.created,
        tally.merged,
        tally.duplicates
    );
    Ok(IngestReport {
        instrument: instrument.to_string(),
        points: series.len(),
        observations,
        tally,
    })
}

/// Ingest several instruments in turn; a failed one is logged and skipped
pub fn backfill(
    store: &CsvStore,
    source: &dyn PriceSource,
    instruments: &[String],
    start: NaiveDate,
    end: Option<NaiveDate>,
) -> Vec<(String, Result<IngestReport>)> {
    instruments
        .iter()
        .map(|instrument| {
            let result = ingest(store, source, instrument, start, end);
            match &result {
                Err(e) if e.is_price_err() => warn!("{}: skipped, bad prices: {} ({})", instrument, e, e.errcode()),
                Err(e) => error!("{}: skipped, {} ({})", instrument, e, e.errcode()),
                Ok(_) => {}
            }
            (instrument.clone(), result)
        })
        .collect()
}
