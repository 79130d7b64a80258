//! Timestamp helpers.
//!
//! Used as `#[serde(with = "crate::utils::time")]` on `OffsetDateTime` fields,
//! and for the stamps that appear in saved transcript names and headers.

use serde::{Deserialize, Deserializer, Serializer};
use time::OffsetDateTime;
use time::format_description::FormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

const FILE_STAMP: &[FormatItem<'static>] =
    format_description!("[year][month][day]_[hour][minute][second]");

const DISPLAY_STAMP: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// The current time in the local offset, or UTC when the offset is unknown.
pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Formats `datetime` as `YYYYMMDD_HHMMSS` for file names.
pub fn file_stamp(datetime: &OffsetDateTime) -> String {
    datetime
        .format(FILE_STAMP)
        .unwrap_or_else(|_| datetime.unix_timestamp().to_string())
}

/// Formats `datetime` as `YYYY-MM-DD HH:MM:SS` for display.
pub fn display_stamp(datetime: &OffsetDateTime) -> String {
    datetime
        .format(DISPLAY_STAMP)
        .unwrap_or_else(|_| datetime.unix_timestamp().to_string())
}

/// Formats `datetime` as RFC 3339.
pub fn rfc3339(datetime: &OffsetDateTime) -> String {
    datetime
        .format(&Rfc3339)
        .unwrap_or_else(|_| datetime.unix_timestamp().to_string())
}

/// Parses an RFC 3339 string.
pub fn parse_rfc3339(s: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(s, &Rfc3339).ok()
}

/// Deserialize an RFC 3339 formatted string into an OffsetDateTime
pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    OffsetDateTime::parse(&s, &Rfc3339).map_err(serde::de::Error::custom)
}

/// Serialize an OffsetDateTime into an RFC 3339 formatted string
pub fn serialize<S>(datetime: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let s = datetime
        .format(&Rfc3339)
        .map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn stamps() {
        let ts = datetime!(2026-10-17 09:05:03 UTC);
        assert_eq!(file_stamp(&ts), "20261017_090503");
        assert_eq!(display_stamp(&ts), "2026-10-17 09:05:03");
        assert_eq!(rfc3339(&ts), "2026-10-17T09:05:03Z");
        assert_eq!(parse_rfc3339("2026-10-17T09:05:03Z"), Some(ts));
        assert_eq!(parse_rfc3339("yesterday"), None);
    }
}
