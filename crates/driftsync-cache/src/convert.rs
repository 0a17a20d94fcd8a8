//! Column conversion helpers shared by the stores

use chrono::{DateTime, Utc};

use crate::CacheError;

/// Parse a DateTime<Utc> from an RFC 3339 string
pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite's own datetime() format
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

pub(crate) fn parse_optional_datetime(
    s: Option<String>,
) -> Result<Option<DateTime<Utc>>, CacheError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

/// SQLite integers are signed; inode numbers and sizes are stored bit-for-bit
pub(crate) fn to_db_u64(value: u64) -> i64 {
    value as i64
}

pub(crate) fn from_db_u64(value: i64) -> u64 {
    value as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_and_sqlite_formats() {
        assert!(parse_datetime("2026-10-19T08:30:00+00:00").is_ok());
        assert!(parse_datetime("2026-10-19 08:30:00").is_ok());
        assert!(parse_datetime("yesterday").is_err());
        assert_eq!(parse_optional_datetime(Some(String::new())).unwrap(), None);
    }

    #[test]
    fn large_inodes_survive_storage() {
        let ino = u64::MAX - 7;
        assert_eq!(from_db_u64(to_db_u64(ino)), ino);
    }
}
