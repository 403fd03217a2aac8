//! SQL builders for every table, rendered with `SqliteQueryBuilder`

use chrono::{DateTime, SecondsFormat, Utc};

pub mod ddl;
pub mod devices;
pub mod download_tokens;
pub mod metadata;
pub mod recordings;
pub mod subscriptions;

/// Timestamps are stored as fixed-width RFC 3339 text so that lexical order is time order
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Inverse of [`format_timestamp`]
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("Invalid timestamp '{}': {}", value, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_text_orders_like_time() {
        let earlier = parse_timestamp("2025-03-01T09:00:00Z").unwrap();
        let later = earlier + chrono::Duration::milliseconds(1500);
        let (a, b) = (format_timestamp(&earlier), format_timestamp(&later));
        assert!(a < b);
        assert_eq!(parse_timestamp(&b).unwrap(), later);
    }

    #[test]
    fn test_ddl_statements_are_idempotent() {
        for statement in ddl::all_statements() {
            assert!(statement.contains("IF NOT EXISTS"), "{}", statement);
        }
    }
}
