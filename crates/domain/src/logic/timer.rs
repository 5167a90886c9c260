//! Timer: a time-of-day window on selected weekdays feeding the `Timer`
//! source.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

const SECONDS_PER_DAY: u32 = 24 * 3600;

/// Wall-clock time of day with second precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(u32);

impl TimeOfDay {
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTimeOfDay`] when a component is out
    /// of range.
    pub fn hms(hour: u32, minute: u32, second: u32) -> Result<Self, ValidationError> {
        if hour > 23 || minute > 59 || second > 59 {
            return Err(ValidationError::InvalidTimeOfDay(format!(
                "{hour:02}:{minute:02}:{second:02}"
            )));
        }
        Ok(Self(hour * 3600 + minute * 60 + second))
    }

    #[must_use]
    pub fn of(datetime: NaiveDateTime) -> Self {
        Self(datetime.num_seconds_from_midnight())
    }

    #[must_use]
    pub fn seconds_from_midnight(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (h, m, s) = (self.0 / 3600, (self.0 / 60) % 60, self.0 % 60);
        if s == 0 {
            write!(f, "{h:02}:{m:02}")
        } else {
            write!(f, "{h:02}:{m:02}:{s:02}")
        }
    }
}

impl FromStr for TimeOfDay {
    type Err = ValidationError;

    /// Accepts `HH:MM` and `HH:MM:SS`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidTimeOfDay(s.to_string());
        let parts: Vec<&str> = s.trim().split(':').collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(invalid());
        }
        let mut fields = [0_u32; 3];
        for (slot, part) in fields.iter_mut().zip(&parts) {
            if part.is_empty() || part.len() > 2 {
                return Err(invalid());
            }
            *slot = part.parse().map_err(|_| invalid())?;
        }
        Self::hms(fields[0], fields[1], fields[2]).map_err(|_| invalid())
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// A set of weekdays. The empty set means every day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct DaySet(u8);

impl DaySet {
    /// Every day of the week.
    pub const EVERY_DAY: Self = Self(0);

    #[must_use]
    pub fn of(days: &[Weekday]) -> Self {
        Self(days.iter().fold(0, |mask, day| mask | bit(*day)))
    }

    #[must_use]
    pub fn contains(self, day: Weekday) -> bool {
        self.0 == 0 || self.0 & bit(day) != 0
    }

    /// Selected weekdays, Monday first. Empty for [`EVERY_DAY`](Self::EVERY_DAY).
    #[must_use]
    pub fn days(self) -> Vec<Weekday> {
        WEEK.into_iter()
            .filter(|day| self.0 & bit(*day) != 0)
            .collect()
    }

    /// Parse a weekday given as a name (`mon`, `Monday`) or as a number with
    /// `0` = Sunday.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidWeekday`] for anything else.
    pub fn parse_day(raw: &str) -> Result<Weekday, ValidationError> {
        let trimmed = raw.trim();
        if let Ok(number) = trimmed.parse::<u8>() {
            return match number {
                0 | 7 => Ok(Weekday::Sun),
                1..=6 => Ok(WEEK[usize::from(number) - 1]),
                _ => Err(ValidationError::InvalidWeekday(raw.to_string())),
            };
        }
        trimmed
            .parse::<Weekday>()
            .map_err(|_| ValidationError::InvalidWeekday(raw.to_string()))
    }
}

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn bit(day: Weekday) -> u8 {
    1 << day.num_days_from_monday()
}

impl TryFrom<Vec<String>> for DaySet {
    type Error = ValidationError;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        let days = value
            .iter()
            .map(|raw| Self::parse_day(raw))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::of(&days))
    }
}

impl From<DaySet> for Vec<String> {
    fn from(value: DaySet) -> Self {
        value
            .days()
            .into_iter()
            .map(|day| day.to_string().to_ascii_lowercase())
            .collect()
    }
}

/// `[start, end)` on the selected weekdays.
///
/// When `end` is before `start` the window wraps past midnight and the part
/// after midnight belongs to the weekday the window started on. `start ==
/// end` covers the whole day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerWindow {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    #[serde(default)]
    pub days: DaySet,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl TimerWindow {
    #[must_use]
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        Self {
            start,
            end,
            days: DaySet::EVERY_DAY,
            enabled: true,
        }
    }

    #[must_use]
    pub fn on_days(mut self, days: DaySet) -> Self {
        self.days = days;
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether the window covers `now`. Disabled windows never do.
    #[must_use]
    pub fn is_active(&self, now: NaiveDateTime) -> bool {
        if !self.enabled {
            return false;
        }
        let t = TimeOfDay::of(now);
        let today = now.weekday();
        if self.start == self.end {
            return self.days.contains(today);
        }
        if self.start < self.end {
            return self.start <= t && t < self.end && self.days.contains(today);
        }
        if t >= self.start {
            self.days.contains(today)
        } else if t < self.end {
            self.days.contains(today.pred())
        } else {
            false
        }
    }

    /// Length of the window in seconds.
    #[must_use]
    pub fn duration_secs(&self) -> u32 {
        let (start, end) = (self.start.0, self.end.0);
        if start < end {
            end - start
        } else {
            SECONDS_PER_DAY - start + end
        }
    }
}

impl fmt::Display for TimerWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// The first enabled window active at `now`, if any. Windows combine with OR.
#[must_use]
pub fn active_timer(timers: &[TimerWindow], now: NaiveDateTime) -> Option<&TimerWindow> {
    timers.iter().find(|timer| timer.is_active(now))
}

/// Whether any enabled window is active at `now`.
#[must_use]
pub fn any_timer_active(timers: &[TimerWindow], now: NaiveDateTime) -> bool {
    active_timer(timers, now).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    // 2024-05-06 is a Monday.
    fn monday(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn tuesday(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 7)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn window(start: &str, end: &str) -> TimerWindow {
        TimerWindow::new(start.parse().unwrap(), end.parse().unwrap())
    }

    #[test]
    fn should_include_start_and_exclude_end_boundary() {
        let timer = window("08:00", "18:00");
        assert!(timer.is_active(monday(8, 0, 0)));
        assert!(timer.is_active(monday(17, 59, 59)));
        assert!(!timer.is_active(monday(18, 0, 0)));
        assert!(!timer.is_active(monday(7, 59, 59)));
    }

    #[test]
    fn should_not_double_fire_across_adjacent_windows() {
        let morning = window("06:00", "12:00");
        let afternoon = window("12:00", "18:00");
        let noon = monday(12, 0, 0);
        assert!(!morning.is_active(noon));
        assert!(afternoon.is_active(noon));
    }

    #[test]
    fn should_wrap_past_midnight() {
        let timer = window("22:00", "06:00");
        assert!(timer.is_active(monday(23, 30, 0)));
        assert!(timer.is_active(monday(2, 0, 0)));
        assert!(!timer.is_active(monday(6, 0, 0)));
        assert!(!timer.is_active(monday(12, 0, 0)));
    }

    #[test]
    fn should_attribute_after_midnight_part_to_start_day() {
        let timer = window("22:00", "06:00").on_days(DaySet::of(&[Weekday::Mon]));
        assert!(timer.is_active(monday(22, 0, 0)));
        assert!(timer.is_active(tuesday(5, 59, 59)));
        assert!(!timer.is_active(tuesday(22, 30, 0)));
        assert!(!timer.is_active(monday(3, 0, 0)));
    }

    #[test]
    fn should_skip_days_not_selected() {
        let timer = window("08:00", "18:00").on_days(DaySet::of(&[Weekday::Sat, Weekday::Sun]));
        assert!(!timer.is_active(monday(10, 0, 0)));
    }

    #[test]
    fn should_skip_disabled_timer() {
        let timer = window("00:00", "23:59").disabled();
        assert!(!timer.is_active(monday(10, 0, 0)));
    }

    #[test]
    fn should_treat_equal_start_and_end_as_whole_day() {
        let timer = window("07:00", "07:00");
        assert!(timer.is_active(monday(3, 0, 0)));
        assert_eq!(timer.duration_secs(), SECONDS_PER_DAY);
    }

    #[test]
    fn should_combine_timers_with_or() {
        let timers = [
            window("06:00", "07:00"),
            window("19:00", "20:00").disabled(),
            window("19:00", "21:00"),
        ];
        assert!(active_timer(&timers, monday(6, 30, 0)).is_some());
        assert_eq!(
            active_timer(&timers, monday(19, 30, 0)).map(ToString::to_string),
            Some("19:00-21:00".to_string())
        );
        assert!(active_timer(&timers, monday(12, 0, 0)).is_none());
        assert!(any_timer_active(&timers, monday(20, 30, 0)));
    }

    #[test]
    fn should_parse_time_with_and_without_seconds() {
        let short: TimeOfDay = "08:30".parse().unwrap();
        assert_eq!(short.seconds_from_midnight(), 30_600);
        let long: TimeOfDay = "08:30:15".parse().unwrap();
        assert_eq!(long.to_string(), "08:30:15");
        assert!("24:00".parse::<TimeOfDay>().is_err());
        assert!("8h30".parse::<TimeOfDay>().is_err());
        assert!("08:300".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn should_parse_weekday_names_and_sunday_based_numbers() {
        assert_eq!(DaySet::parse_day("mon").unwrap(), Weekday::Mon);
        assert_eq!(DaySet::parse_day("Saturday").unwrap(), Weekday::Sat);
        assert_eq!(DaySet::parse_day("0").unwrap(), Weekday::Sun);
        assert_eq!(DaySet::parse_day("1").unwrap(), Weekday::Mon);
        assert!(DaySet::parse_day("funday").is_err());
    }

    #[test]
    fn should_serialize_days_as_lowercase_names() {
        let days = DaySet::of(&[Weekday::Fri, Weekday::Mon]);
        assert_eq!(
            serde_json::to_value(days).unwrap(),
            serde_json::json!(["mon", "fri"])
        );
        let parsed: DaySet = serde_json::from_value(serde_json::json!(["mon", "fri"])).unwrap();
        assert_eq!(parsed, days);
    }
}
