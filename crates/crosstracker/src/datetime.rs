//! Date handling: TQL date literals, `NOW()` periods and timestamp ranges.
//!
//! Stored dates are unix timestamps. Literals are interpreted in the platform
//! timezone ([`crate::config::EngineConfig::timezone`]); a date without time
//! covers its whole day, a date with time covers its whole minute.

use chrono::{DateTime, Duration, FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// A parsed `'YYYY-MM-DD'` or `'YYYY-MM-DD HH:MM'` literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateLiteral {
    pub datetime: NaiveDateTime,
    pub has_time: bool,
}

impl DateLiteral {
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if let Ok(datetime) = NaiveDateTime::parse_from_str(input, DATETIME_FORMAT) {
            return Some(Self {
                datetime,
                has_time: true,
            });
        }
        let date = NaiveDate::parse_from_str(input, DATE_FORMAT).ok()?;
        Some(Self {
            datetime: date.and_time(NaiveTime::MIN),
            has_time: false,
        })
    }
}

/// Unit of a `NOW()` offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodUnit {
    Day,
    Week,
    Month,
    Year,
}

impl PeriodUnit {
    pub fn from_suffix(suffix: char) -> Option<Self> {
        match suffix.to_ascii_lowercase() {
            'd' => Some(PeriodUnit::Day),
            'w' => Some(PeriodUnit::Week),
            'm' => Some(PeriodUnit::Month),
            'y' => Some(PeriodUnit::Year),
            _ => None,
        }
    }

    pub fn suffix(&self) -> char {
        match self {
            PeriodUnit::Day => 'd',
            PeriodUnit::Week => 'w',
            PeriodUnit::Month => 'm',
            PeriodUnit::Year => 'y',
        }
    }
}

/// Signed offset applied to `NOW()`, e.g. `- 2w` is `{ amount: -2, unit: Week }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub amount: i64,
    pub unit: PeriodUnit,
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.amount < 0 { '-' } else { '+' };
        write!(f, "{sign} {}{}", self.amount.unsigned_abs(), self.unit.suffix())
    }
}

impl Period {
    /// Shift an instant by this period. `None` on overflow.
    pub fn apply(&self, instant: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        let magnitude = self.amount.unsigned_abs();
        match self.unit {
            PeriodUnit::Day | PeriodUnit::Week => {
                let days = i64::try_from(magnitude).ok()?;
                let days = if self.unit == PeriodUnit::Week { days.checked_mul(7)? } else { days };
                let delta = Duration::try_days(days)?;
                if self.amount < 0 {
                    instant.checked_sub_signed(delta)
                } else {
                    instant.checked_add_signed(delta)
                }
            }
            PeriodUnit::Month | PeriodUnit::Year => {
                let months = if self.unit == PeriodUnit::Year {
                    magnitude.checked_mul(12)?
                } else {
                    magnitude
                };
                let months = Months::new(u32::try_from(months).ok()?);
                if self.amount < 0 {
                    instant.checked_sub_months(months)
                } else {
                    instant.checked_add_months(months)
                }
            }
        }
    }
}

/// Inclusive range of unix timestamps covered by a date value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimestampRange {
    pub floor: i64,
    pub ceil: i64,
}

/// Timestamp of a naive local datetime in `tz`.
pub fn local_timestamp(datetime: NaiveDateTime, tz: FixedOffset) -> i64 {
    datetime.and_utc().timestamp() - i64::from(tz.local_minus_utc())
}

/// The whole day containing `datetime`.
pub fn day_range(datetime: NaiveDateTime, tz: FixedOffset) -> TimestampRange {
    let floor = local_timestamp(datetime.date().and_time(NaiveTime::MIN), tz);
    TimestampRange {
        floor,
        ceil: floor + 86_399,
    }
}

/// The whole minute containing `datetime`.
pub fn minute_range(datetime: NaiveDateTime, tz: FixedOffset) -> TimestampRange {
    let timestamp = local_timestamp(datetime, tz);
    let floor = timestamp - timestamp.rem_euclid(60);
    TimestampRange {
        floor,
        ceil: floor + 59,
    }
}

/// Range of a literal: its minute when it has a time and the field keeps
/// time, its day otherwise.
pub fn literal_range(literal: &DateLiteral, with_time: bool, tz: FixedOffset) -> TimestampRange {
    if literal.has_time && with_time {
        minute_range(literal.datetime, tz)
    } else {
        day_range(literal.datetime, tz)
    }
}

/// Range of `NOW()` shifted by an optional period.
pub fn now_range(
    now: DateTime<FixedOffset>,
    period: Option<&Period>,
    with_time: bool,
    tz: FixedOffset,
) -> Option<TimestampRange> {
    let instant = match period {
        Some(period) => period.apply(now)?,
        None => now,
    };
    let local = instant.with_timezone(&tz).naive_local();
    Some(if with_time {
        minute_range(local, tz)
    } else {
        day_range(local, tz)
    })
}

/// RFC 3339 rendering of a stored timestamp in the platform timezone.
pub fn to_rfc3339(timestamp: i64, tz: FixedOffset) -> Option<String> {
    tz.timestamp_opt(timestamp, 0)
        .single()
        .map(|dt| dt.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn test_parse_literals() {
        let date = DateLiteral::parse("2017-01-10").unwrap();
        assert!(!date.has_time);
        let datetime = DateLiteral::parse("2017-01-10 12:42").unwrap();
        assert!(datetime.has_time);
        assert!(DateLiteral::parse("2017-13-10").is_none());
        assert!(DateLiteral::parse("yesterday").is_none());
        assert!(DateLiteral::parse("").is_none());
    }

    #[test]
    fn test_day_range_in_timezone() {
        let literal = DateLiteral::parse("2017-01-10").unwrap();
        let range = literal_range(&literal, false, utc());
        assert_eq!(range.floor, 1_484_006_400);
        assert_eq!(range.ceil, 1_484_006_400 + 86_399);

        let paris = FixedOffset::east_opt(3600).unwrap();
        let range = literal_range(&literal, false, paris);
        assert_eq!(range.floor, 1_484_006_400 - 3600);
    }

    #[test]
    fn test_literal_with_time_on_date_field_uses_day() {
        let literal = DateLiteral::parse("2017-01-10 12:42").unwrap();
        assert_eq!(
            literal_range(&literal, false, utc()),
            day_range(literal.datetime, utc())
        );
        let range = literal_range(&literal, true, utc());
        assert_eq!(range.floor, 1_484_006_400 + 12 * 3600 + 42 * 60);
        assert_eq!(range.ceil - range.floor, 59);
    }

    #[test]
    fn test_period_apply() {
        let now = utc().with_ymd_and_hms(2024, 3, 31, 10, 0, 0).unwrap();
        let minus_one_month = Period {
            amount: -1,
            unit: PeriodUnit::Month,
        };
        assert_eq!(
            minus_one_month.apply(now).unwrap(),
            utc().with_ymd_and_hms(2024, 2, 29, 10, 0, 0).unwrap()
        );
        let plus_two_weeks = Period {
            amount: 2,
            unit: PeriodUnit::Week,
        };
        assert_eq!(
            plus_two_weeks.apply(now).unwrap(),
            utc().with_ymd_and_hms(2024, 4, 14, 10, 0, 0).unwrap()
        );
        assert_eq!(plus_two_weeks.to_string(), "+ 2w");
        assert_eq!(minus_one_month.to_string(), "- 1m");
    }

    #[test]
    fn test_now_range() {
        let now = utc().with_ymd_and_hms(2024, 3, 31, 10, 15, 30).unwrap();
        let range = now_range(now, None, false, utc()).unwrap();
        assert_eq!(
            range.floor,
            utc().with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap().timestamp()
        );
        let range = now_range(now, None, true, utc()).unwrap();
        assert_eq!(
            range.floor,
            utc().with_ymd_and_hms(2024, 3, 31, 10, 15, 0).unwrap().timestamp()
        );
    }

    #[test]
    fn test_to_rfc3339() {
        assert_eq!(
            to_rfc3339(1_484_006_400, utc()).unwrap(),
            "2017-01-10T00:00:00+00:00"
        );
    }
}
