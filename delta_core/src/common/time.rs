use chrono::{NaiveDate, NaiveDateTime};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse an ISO `YYYY-MM-DD` date
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|e| format!("{:?}: {}", s, e))
}

/// Parse the date part of a price stamp.
///
/// Supports "YYYY-MM-DD", "YYYY-MM-DD HH:MM:SS", "YYYY-MM-DDTHH:MM:SS" and "YYYYMMDD".
pub fn parse_stamp(s: &str) -> Result<NaiveDate, String> {
    let s = s.trim();
    if !s.contains('-') {
        return NaiveDate::parse_from_str(s, "%Y%m%d").map_err(|e| format!("{:?}: {}", s, e));
    }
    if s.len() == 10 {
        return parse_date(s);
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .map(|dt| dt.date())
        .map_err(|e| format!("{:?}: {}", s, e))
}

pub fn to_date_str(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}
