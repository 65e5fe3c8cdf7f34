//! Reporting-date utilities
//!
//! Both upstream collaborators deliver dates as `YYYY-MM-DD` strings and
//! both occasionally deliver garbage. A malformed date is never fatal to a
//! run: it simply disables date-based indexing and bonuses for that record,
//! so parsing here is lenient and returns `None` on failure.

use chrono::NaiveDate;
use tracing::warn;

/// Parse a `YYYY-MM-DD` date string, returning `None` on failure.
pub fn parse_lenient(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            warn!(raw = %trimmed, "Invalid date format in input record");
            None
        }
    }
}

/// Absolute difference between two dates in whole days.
pub fn days_apart(a: NaiveDate, b: NaiveDate) -> i64 {
    (a - b).num_days().abs()
}

/// Serde adapter for `Option<NaiveDate>` fields fed from collaborator data.
///
/// Deserializes `YYYY-MM-DD` strings leniently (malformed values become
/// `None`) and serializes back to the same string format.
pub mod lenient_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(date) => serializer.serialize_some(&date.format("%Y-%m-%d").to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(super::parse_lenient))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_date() {
        assert_eq!(
            parse_lenient("2025-01-04"),
            NaiveDate::from_ymd_opt(2025, 1, 4)
        );
    }

    #[test]
    fn test_parse_trims_whitespace() {
        assert_eq!(
            parse_lenient(" 2025-01-04 "),
            NaiveDate::from_ymd_opt(2025, 1, 4)
        );
    }

    #[test]
    fn test_parse_malformed_date_returns_none() {
        assert_eq!(parse_lenient("04/01/2025"), None);
        assert_eq!(parse_lenient("not-a-date"), None);
        assert_eq!(parse_lenient(""), None);
    }

    #[test]
    fn test_days_apart_symmetric() {
        let a = NaiveDate::from_ymd_opt(2025, 1, 4).unwrap();
        let b = NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();
        assert_eq!(days_apart(a, b), 3);
        assert_eq!(days_apart(b, a), 3);
        assert_eq!(days_apart(a, a), 0);
    }

    #[test]
    fn test_lenient_date_roundtrip() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Record {
            #[serde(with = "lenient_date")]
            date: Option<NaiveDate>,
        }

        let record: Record = serde_json::from_str(r#"{"date":"2025-03-15"}"#).unwrap();
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2025, 3, 15));
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"date":"2025-03-15"}"#
        );
    }

    #[test]
    fn test_lenient_date_malformed_becomes_none() {
        #[derive(serde::Deserialize)]
        struct Record {
            #[serde(with = "lenient_date")]
            date: Option<NaiveDate>,
        }

        let record: Record = serde_json::from_str(r#"{"date":"garbage"}"#).unwrap();
        assert_eq!(record.date, None);

        let record: Record = serde_json::from_str(r#"{"date":null}"#).unwrap();
        assert_eq!(record.date, None);
    }
}
