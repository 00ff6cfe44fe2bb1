use crate::common::stats_error::{Result, StatsError};

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Normalize an instrument id into the lower-cased name its store is filed under
pub fn store_name(instrument: &str) -> Result<String> {
    let id = instrument.trim();
    if id.is_empty() {
        return Err(StatsError::Parameter("empty instrument id".to_string()));
    }
    if let Some(c) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '^' | '=')))
    {
        return Err(StatsError::Parameter(format!(
            "instrument id {:?} contains {:?}",
            instrument, c
        )));
    }
    if id.chars().all(|c| c == '.') {
        return Err(StatsError::Parameter(format!(
            "instrument id {:?} is not a file name",
            instrument
        )));
    }
    Ok(id.to_ascii_lowercase())
}
