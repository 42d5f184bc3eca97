use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serializer;

/// RFC 3339 with up to nanosecond precision and a `Z` suffix.
///
/// Trailing zeros of the fraction are dropped, and the fraction entirely
/// when it is zero.
pub fn rfc3339_nanos(timestamp: &DateTime<Utc>) -> String {
    let formatted = timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true);
    let Some(seconds) = formatted.strip_suffix('Z') else {
        return formatted;
    };

    let trimmed = seconds.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed}Z")
}

pub fn serialize_rfc3339_nanos<S>(
    timestamp: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&rfc3339_nanos(timestamp))
}

#[inline]
pub fn is_false(value: &bool) -> bool {
    !*value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_trailing_fraction_zeros() {
        let ts = DateTime::from_timestamp(1_700_000_000, 120_000_000).unwrap();

        assert_eq!(rfc3339_nanos(&ts), "2023-11-14T22:13:20.12Z");
    }

    #[test]
    fn keeps_significant_digits() {
        let ts = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let tiny = DateTime::from_timestamp(1_700_000_000, 5).unwrap();

        assert_eq!(rfc3339_nanos(&ts), "2023-11-14T22:13:20.123456789Z");
        assert_eq!(rfc3339_nanos(&tiny), "2023-11-14T22:13:20.000000005Z");
    }

    #[test]
    fn whole_seconds_have_no_fraction() {
        let ts = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        assert_eq!(rfc3339_nanos(&ts), "2023-11-14T22:13:20Z");
    }
}
