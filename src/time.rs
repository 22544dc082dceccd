use chrono::{DateTime, NaiveDateTime, Utc};

/// Layouts tried in order. `true` marks a layout that carries a zone offset;
/// the others are read as UTC.
///
/// twtxt clients mostly write RFC 3339 with fractional seconds, but some
/// drop the colon in the offset, omit the zone, or only give minutes.
const LAYOUTS: [(&str, bool); 6] = [
    ("%Y-%m-%dT%H:%M:%S%.f%:z", true),
    ("%Y-%m-%dT%H:%M:%S%.f%z", true),
    ("%Y-%m-%dT%H:%M:%S%.f", false),
    ("%Y-%m-%dT%H:%M%.f%:z", true),
    ("%Y-%m-%dT%H:%M%.f%z", true),
    ("%Y-%m-%dT%H:%M%.f", false),
];

/// Parse a feed timestamp token.
///
/// The token is upper-cased first since some producers emit a lowercase `z`.
/// Anything that matches none of the layouts is dated at the Unix epoch so
/// that unknown timestamps sort oldest.
pub fn parse_time(token: &str) -> DateTime<Utc> {
    let upper = token.to_uppercase();
    // `Z` is the zero offset in every zoned layout.
    let normalized = match upper.strip_suffix('Z') {
        Some(rest) => format!("{}+00:00", rest),
        None => upper,
    };

    for (layout, zoned) in LAYOUTS {
        let parsed = if zoned {
            DateTime::parse_from_str(&normalized, layout)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        } else {
            NaiveDateTime::parse_from_str(&normalized, layout)
                .ok()
                .map(|naive| naive.and_utc())
        };
        if let Some(dt) = parsed {
            return dt;
        }
    }

    epoch()
}

/// The Unix epoch, used for unknown timestamps.
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_rfc3339_with_zulu() {
        assert_eq!(parse_time("2021-01-01T00:00:00Z"), utc(2021, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_lowercase_zulu() {
        assert_eq!(parse_time("2021-01-01t10:20:30z"), utc(2021, 1, 1, 10, 20, 30));
    }

    #[test]
    fn test_offset_with_colon() {
        assert_eq!(
            parse_time("2021-01-01T12:00:00+02:00"),
            utc(2021, 1, 1, 10, 0, 0)
        );
    }

    #[test]
    fn test_offset_without_colon() {
        assert_eq!(
            parse_time("2021-01-01T12:00:00-0130"),
            utc(2021, 1, 1, 13, 30, 0)
        );
    }

    #[test]
    fn test_fractional_seconds() {
        let parsed = parse_time("2021-01-01T00:00:00.123456789Z");
        assert_eq!(parsed.timestamp_subsec_nanos(), 123_456_789);
        assert_eq!(parsed.timestamp(), utc(2021, 1, 1, 0, 0, 0).timestamp());
    }

    #[test]
    fn test_no_zone_is_utc() {
        assert_eq!(parse_time("2021-06-15T08:09:10"), utc(2021, 6, 15, 8, 9, 10));
    }

    #[test]
    fn test_minute_precision_layouts() {
        assert_eq!(parse_time("2021-06-15T08:09Z"), utc(2021, 6, 15, 8, 9, 0));
        assert_eq!(parse_time("2021-06-15T08:09+01:00"), utc(2021, 6, 15, 7, 9, 0));
        assert_eq!(parse_time("2021-06-15T08:09+0100"), utc(2021, 6, 15, 7, 9, 0));
        assert_eq!(parse_time("2021-06-15T08:09"), utc(2021, 6, 15, 8, 9, 0));
    }

    #[test]
    fn test_unparsable_is_epoch() {
        assert_eq!(parse_time("yesterday"), epoch());
        assert_eq!(parse_time(""), epoch());
        assert_eq!(parse_time("2021-13-45T00:00:00Z"), epoch());
    }
}
