//! RFC 3339 timestamps at second precision, as sent on the wire.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serializer;

/// Formats `ts` as `2024-01-02T03:04:05Z`.
#[must_use]
pub fn format(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// `serialize_with` adapter for [`DateTime<Utc>`] fields.
///
/// # Errors
///
/// Propagates serializer errors.
pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(ts))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn drops_subsecond_precision() {
        let Some(ts) = Utc
            .with_ymd_and_hms(2024, 5, 6, 7, 8, 9)
            .single()
            .map(|t| t + chrono::Duration::milliseconds(450))
        else {
            panic!("valid date");
        };
        assert_eq!(format(&ts), "2024-05-06T07:08:09Z");
    }
}
