//! Time and timestamp helpers.

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Utc};

/// UTC timestamp used for claims, decisions, versions and audit entries.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Convert a timestamp to the wall-clock time timers are matched against.
///
/// `offset` pins the conversion to a fixed zone; `None` uses the host's
/// local zone.
#[must_use]
pub fn wall_clock(ts: Timestamp, offset: Option<FixedOffset>) -> NaiveDateTime {
    match offset {
        Some(offset) => ts.with_timezone(&offset).naive_local(),
        None => ts.with_timezone(&Local).naive_local(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn should_return_current_utc_time() {
        let before = Utc::now();
        let ts = now();
        let after = Utc::now();
        assert!(ts >= before);
        assert!(ts <= after);
    }

    #[test]
    fn should_shift_wall_clock_by_fixed_offset() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 3, 22, 30, 0).unwrap();
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let local = wall_clock(ts, Some(offset));
        assert_eq!(local.hour(), 0);
        assert_eq!(local.minute(), 30);
    }
}
