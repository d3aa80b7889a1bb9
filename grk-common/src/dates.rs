//! Registry date helpers
//!
//! The registry stores dates as `DD.MM.YYYY` strings. Sources hand us dates in a
//! handful of other layouts; everything is normalized here.

use chrono::{NaiveDate, NaiveDateTime};

/// Birth date written when the source carries none
pub const BIRTH_DATE_UNKNOWN: &str = "00.00.0000";

/// Registry date format (`DD.MM.YYYY`)
pub const REGISTRY_DATE_FORMAT: &str = "%d.%m.%Y";

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d", "%d.%m.%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

/// Format a calendar date the way the registry stores it
pub fn to_registry_date(date: NaiveDate) -> String {
    date.format(REGISTRY_DATE_FORMAT).to_string()
}

/// Build a registry date from already-split digit groups
///
/// Folder names carry `YYYYMMDD` runs that the pattern table splits into parts;
/// these are rearranged verbatim without calendar validation.
pub fn from_parts(year: &str, month: &str, day: &str) -> String {
    format!("{}.{}.{}", day, month, year)
}

/// Parse a date in any of the accepted source layouts
///
/// Accepts `YYYY-MM-DD`, `YYYYMMDD`, `DD.MM.YYYY`, `YYYY/MM/DD` and ISO date-times
/// (the time part is dropped). Returns `None` for anything else.
pub fn parse_source_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

/// Normalize a source date to registry format
pub fn normalize_source_date(raw: &str) -> Option<String> {
    parse_source_date(raw).map(to_registry_date)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_reorders_digits() {
        assert_eq!(from_parts("2020", "03", "01"), "01.03.2020");
    }

    #[test]
    fn test_normalize_accepted_layouts() {
        assert_eq!(normalize_source_date("2020-03-01").as_deref(), Some("01.03.2020"));
        assert_eq!(normalize_source_date("20200301").as_deref(), Some("01.03.2020"));
        assert_eq!(normalize_source_date("01.03.2020").as_deref(), Some("01.03.2020"));
        assert_eq!(
            normalize_source_date("2020-03-01T08:15:00").as_deref(),
            Some("01.03.2020")
        );
        assert_eq!(
            normalize_source_date("2020-03-01T08:15:00+02:00").as_deref(),
            Some("01.03.2020")
        );
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert_eq!(normalize_source_date(""), None);
        assert_eq!(normalize_source_date("yesterday"), None);
        assert_eq!(normalize_source_date("2020-13-45"), None);
    }
}
