use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::common::{
    stats_error::{Result, StatsError},
    utils::round_to,
};

pub const MAX_KEY_DECIMALS: u32 = 12;

/// How an observed delta becomes a bucket key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPolicy {
    /// The delta is the key, bit for bit
    Exact,
    /// The delta is rounded to this many decimals first
    Decimals(u32),
}

impl KeyPolicy {
    pub fn apply(&self, delta: f64) -> f64 {
        match self {
            KeyPolicy::Exact => delta,
            KeyPolicy::Decimals(n) => round_to(delta, *n),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Directory holding one CSV per instrument
    pub data_dir: PathBuf,

    /// Round keys to this many decimals; exact keys when absent
    pub key_decimals: Option<u32>,

    /// Separator between dates inside the occurrences column
    pub occurrence_separator: char,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            key_decimals: None,
            occurrence_separator: ';',
        }
    }
}

impl StoreConfig {
    /// Create a new StoreConfig, falling back to defaults for missing values
    pub fn new(
        data_dir: Option<PathBuf>,
        key_decimals: Option<u32>,
        occurrence_separator: Option<char>,
    ) -> Result<Self> {
        let default = Self::default();
        let config = Self {
            data_dir: data_dir.unwrap_or(default.data_dir),
            key_decimals: key_decimals.or(default.key_decimals),
            occurrence_separator: occurrence_separator.unwrap_or(default.occurrence_separator),
        };
        config.check()?;
        Ok(config)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)
            .map_err(|e| StatsError::Parameter(format!("config: {}", e)))?;
        config.check()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn key_policy(&self) -> KeyPolicy {
        match self.key_decimals {
            Some(n) => KeyPolicy::Decimals(n),
            None => KeyPolicy::Exact,
        }
    }

    pub fn check(&self) -> Result<()> {
        if let Some(n) = self.key_decimals {
            if n > MAX_KEY_DECIMALS {
                return Err(StatsError::Parameter(format!(
                    "key_decimals={} exceeds {}",
                    n, MAX_KEY_DECIMALS
                )));
            }
        }
        let sep = self.occurrence_separator;
        if matches!(sep, ',' | '"' | '\n' | '\r' | '-') || sep.is_ascii_digit() {
            return Err(StatsError::Parameter(format!(
                "occurrence_separator {:?} clashes with the CSV or date syntax",
                sep
            )));
        }
        Ok(())
    }
}
