pub mod bucket;
pub mod common;
pub mod config;
pub mod observation;
pub mod pipeline;
pub mod source;
pub mod store;

pub use bucket::bucket_list::{BucketList, RangeBucket, RangeSummary};
pub use bucket::bucket_record::{ChangeBucketRecord, MergeOutcome};
pub use common::enums::Direction;
pub use common::stats_error::{ErrCode, Result, StatsError};
pub use config::store_config::{KeyPolicy, StoreConfig};
pub use observation::extractor::extract;
pub use observation::observation::{Observation, PricePoint};
pub use pipeline::ingest::{backfill, ingest, IngestReport};
pub use source::price_source::{CsvPriceSource, MemoryPriceSource, PriceSource};
pub use store::csv_store::{CsvStore, LoadedStore, MergeTally};
