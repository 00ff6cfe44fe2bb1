use strum_macros::{Display, EnumString};
use thiserror::Error;

/// Error codes for the statistics store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[repr(i32)]
pub enum ErrCode {
    // Store errors (0-99)
    #[strum(serialize = "_STORE_ERR_BEGIN")]
    StoreErrBegin = 0,
    #[strum(serialize = "ALREADY_INITIALIZED")]
    AlreadyInitialized = 1,
    #[strum(serialize = "NOT_FOUND")]
    NotFound = 2,
    #[strum(serialize = "MALFORMED_RECORD")]
    MalformedRecord = 3,
    #[strum(serialize = "PARA_ERROR")]
    ParaError = 4,
    #[strum(serialize = "_STORE_ERR_END")]
    StoreErrEnd = 99,

    // Price data errors (100-199)
    #[strum(serialize = "_PRICE_ERR_BEGIN")]
    PriceErrBegin = 100,
    #[strum(serialize = "EMPTY_SERIES")]
    EmptySeries = 101,
    #[strum(serialize = "SRC_DATA_FORMAT_ERROR")]
    SrcDataFormatError = 102,
    #[strum(serialize = "_PRICE_ERR_END")]
    PriceErrEnd = 199,

    // Transport errors (200-299)
    #[strum(serialize = "_IO_ERR_BEGIN")]
    IoErrBegin = 200,
    #[strum(serialize = "IO_ERROR")]
    IoError = 201,
    #[strum(serialize = "CSV_ERROR")]
    CsvError = 202,
    #[strum(serialize = "_IO_ERR_END")]
    IoErrEnd = 299,
}

impl ErrCode {
    pub fn is_price_err(&self) -> bool {
        let code = *self as i32;
        code > Self::PriceErrBegin as i32 && code < Self::PriceErrEnd as i32
    }
}

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("store for {instrument} already initialized")]
    AlreadyInitialized { instrument: String },

    #[error("no data for {instrument}")]
    NotFound { instrument: String },

    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },

    #[error("{instrument} has {len} price points, need at least 3")]
    EmptySeries { instrument: String, len: usize },

    #[error("bad price data: {0}")]
    SourceFormat(String),

    #[error("invalid parameter: {0}")]
    Parameter(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl StatsError {
    pub fn errcode(&self) -> ErrCode {
        match self {
            StatsError::AlreadyInitialized { .. } => ErrCode::AlreadyInitialized,
            StatsError::NotFound { .. } => ErrCode::NotFound,
            StatsError::MalformedRecord { .. } => ErrCode::MalformedRecord,
            StatsError::EmptySeries { .. } => ErrCode::EmptySeries,
            StatsError::SourceFormat(_) => ErrCode::SrcDataFormatError,
            StatsError::Parameter(_) => ErrCode::ParaError,
            StatsError::Io(_) => ErrCode::IoError,
            StatsError::Csv(_) => ErrCode::CsvError,
        }
    }

    pub fn malformed(line: u64, reason: impl Into<String>) -> Self {
        StatsError::MalformedRecord {
            line,
            reason: reason.into(),
        }
    }

    /// Failure of the price data rather than of the store
    pub fn is_price_err(&self) -> bool {
        self.errcode().is_price_err()
    }
}

pub type Result<T> = std::result::Result<T, StatsError>;
