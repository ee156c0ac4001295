//! Schedule string parsing.
//!
//! Accepted shapes, split on whitespace:
//!
//! | Input               | Next run                                              |
//! |---------------------|-------------------------------------------------------|
//! | `5 minutes`         | now + 5 × unit (month = 30 days, year = 365 days)     |
//! | `hour`              | now + 1 × unit                                        |
//! | `monday`            | next Monday at 00:01 local, never today               |
//! | `14:30`             | today at 14:30 local, or tomorrow if already passed   |
//! | `monday at 14:30`   | this Monday at 14:30 if still ahead, else next week   |
//!
//! All wall-clock arithmetic happens in the timezone of `now`.

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, NaiveTime, TimeZone, Weekday};

use crate::error::ScheduleError;

/// Time of day used for bare weekday schedules.
const WEEKDAY_DEFAULT_HOUR: u32 = 0;
const WEEKDAY_DEFAULT_MINUTE: u32 = 1;

const SECS_PER_DAY: i64 = 24 * 60 * 60;

/// Compute the instant a schedule string next fires, relative to `now`.
pub fn next_run<Tz: TimeZone>(
    schedule: &str,
    now: &DateTime<Tz>,
) -> Result<DateTime<Tz>, ScheduleError> {
    let words: Vec<&str> = schedule.split_whitespace().collect();

    match words.as_slice() {
        [count, unit] => after_quantity(schedule, now, count, unit),

        [word] => {
            if let Some(secs) = unit_secs(word) {
                return shift(schedule, now, secs);
            }
            if let Some(day) = parse_weekday(word) {
                return next_weekday(schedule, now, day);
            }
            if let Some(time) = parse_clock(word) {
                return next_clock(schedule, now, time);
            }
            Err(ScheduleError::InvalidFormat(schedule.to_string()))
        }

        [day, at, time] if at.eq_ignore_ascii_case("at") => {
            let day = parse_weekday(day).ok_or_else(|| ScheduleError::InvalidWeekday {
                schedule: schedule.to_string(),
                weekday: day.to_string(),
            })?;
            let time = parse_clock(time).ok_or_else(|| ScheduleError::InvalidTime {
                schedule: schedule.to_string(),
                value: time.to_string(),
            })?;
            next_weekday_at(schedule, now, day, time)
        }

        _ => Err(ScheduleError::InvalidFormat(schedule.to_string())),
    }
}

/// Length of one unit in seconds. Singular and plural forms are accepted.
fn unit_secs(word: &str) -> Option<i64> {
    let secs = match word.to_ascii_lowercase().as_str() {
        "second" | "seconds" => 1,
        "minute" | "minutes" => 60,
        "hour" | "hours" => 60 * 60,
        "day" | "days" => SECS_PER_DAY,
        "month" | "months" => 30 * SECS_PER_DAY,
        "year" | "years" => 365 * SECS_PER_DAY,
        _ => return None,
    };
    Some(secs)
}

fn parse_weekday(word: &str) -> Option<Weekday> {
    let day = match word.to_ascii_lowercase().as_str() {
        "sunday" => Weekday::Sun,
        "monday" => Weekday::Mon,
        "tuesday" => Weekday::Tue,
        "wednesday" => Weekday::Wed,
        "thursday" => Weekday::Thu,
        "friday" => Weekday::Fri,
        "saturday" => Weekday::Sat,
        _ => return None,
    };
    Some(day)
}

/// `HH:MM` in 24-hour format.
fn parse_clock(word: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(word, "%H:%M").ok()
}

fn after_quantity<Tz: TimeZone>(
    schedule: &str,
    now: &DateTime<Tz>,
    count: &str,
    unit: &str,
) -> Result<DateTime<Tz>, ScheduleError> {
    let count: u32 = count.parse().map_err(|source| ScheduleError::InvalidDuration {
        schedule: schedule.to_string(),
        value: count.to_string(),
        source,
    })?;
    let secs = unit_secs(unit).ok_or_else(|| ScheduleError::InvalidUnit {
        schedule: schedule.to_string(),
        unit: unit.to_string(),
    })?;
    shift(schedule, now, i64::from(count) * secs)
}

fn shift<Tz: TimeZone>(
    schedule: &str,
    now: &DateTime<Tz>,
    secs: i64,
) -> Result<DateTime<Tz>, ScheduleError> {
    Duration::try_seconds(secs)
        .and_then(|d| now.clone().checked_add_signed(d))
        .ok_or_else(|| out_of_range(schedule))
}

/// Days from `today` forward to the next `target`, 0 when they match.
fn days_until(today: Weekday, target: Weekday) -> u64 {
    u64::from((target.num_days_from_sunday() + 7 - today.num_days_from_sunday()) % 7)
}

fn next_weekday<Tz: TimeZone>(
    schedule: &str,
    now: &DateTime<Tz>,
    day: Weekday,
) -> Result<DateTime<Tz>, ScheduleError> {
    let time = NaiveTime::from_hms_opt(WEEKDAY_DEFAULT_HOUR, WEEKDAY_DEFAULT_MINUTE, 0)
        .ok_or_else(|| out_of_range(schedule))?;

    // The same weekday always means next week.
    let days = match days_until(now.weekday(), day) {
        0 => 7,
        n => n,
    };
    let candidate = local_after(schedule, now, days, time)?;
    if candidate > *now {
        Ok(candidate)
    } else {
        local_after(schedule, now, days + 7, time)
    }
}

fn next_clock<Tz: TimeZone>(
    schedule: &str,
    now: &DateTime<Tz>,
    time: NaiveTime,
) -> Result<DateTime<Tz>, ScheduleError> {
    let candidate = local_after(schedule, now, 0, time)?;
    if candidate > *now {
        Ok(candidate)
    } else {
        local_after(schedule, now, 1, time)
    }
}

fn next_weekday_at<Tz: TimeZone>(
    schedule: &str,
    now: &DateTime<Tz>,
    day: Weekday,
    time: NaiveTime,
) -> Result<DateTime<Tz>, ScheduleError> {
    let days = days_until(now.weekday(), day);
    let candidate = local_after(schedule, now, days, time)?;
    if candidate > *now {
        Ok(candidate)
    } else {
        local_after(schedule, now, days + 7, time)
    }
}

/// `time` on the local date `days` after today, in the timezone of `now`.
fn local_after<Tz: TimeZone>(
    schedule: &str,
    now: &DateTime<Tz>,
    days: u64,
    time: NaiveTime,
) -> Result<DateTime<Tz>, ScheduleError> {
    now.date_naive()
        .checked_add_days(Days::new(days))
        .and_then(|date| resolve_local(&now.timezone(), date, time))
        .ok_or_else(|| out_of_range(schedule))
}

/// Ambiguous local times take the earlier instant; times inside a DST gap
/// are pushed forward by one hour.
fn resolve_local<Tz: TimeZone>(tz: &Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Tz>> {
    let local = date.and_time(time);
    tz.from_local_datetime(&local).earliest().or_else(|| {
        let shifted = local.checked_add_signed(Duration::hours(1))?;
        tz.from_local_datetime(&shifted).earliest()
    })
}

fn out_of_range(schedule: &str) -> ScheduleError {
    ScheduleError::OutOfRange {
        schedule: schedule.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Timelike, Utc};

    /// Wednesday 2024-05-15 10:30:00 UTC.
    fn wednesday_morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 15, 10, 30, 0).unwrap()
    }

    fn ymd_hm(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn quantified_durations_use_fixed_unit_lengths() {
        let now = wednesday_morning();
        let cases = [
            ("30 seconds", 30),
            ("1 second", 1),
            ("5 minutes", 5 * 60),
            ("1 minute", 60),
            ("3 hours", 3 * 3600),
            ("1 hour", 3600),
            ("2 days", 2 * 86_400),
            ("1 day", 86_400),
            ("4 months", 4 * 30 * 86_400),
            ("1 month", 30 * 86_400),
            ("5 years", 5 * 365 * 86_400),
            ("1 year", 365 * 86_400),
        ];
        for (input, secs) in cases {
            assert_eq!(
                next_run(input, &now).unwrap(),
                now + Duration::seconds(secs),
                "{input}"
            );
        }
    }

    #[test]
    fn bare_unit_means_one() {
        let now = wednesday_morning();
        assert_eq!(next_run("minute", &now).unwrap(), now + Duration::minutes(1));
        assert_eq!(next_run("hour", &now).unwrap(), now + Duration::hours(1));
        assert_eq!(next_run("day", &now).unwrap(), now + Duration::days(1));
        assert_eq!(next_run("month", &now).unwrap(), now + Duration::days(30));
        assert_eq!(next_run("year", &now).unwrap(), now + Duration::days(365));
    }

    #[test]
    fn unknown_unit_is_named_in_the_error() {
        let err = next_run("5 bananas", &wednesday_morning()).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidUnit { ref unit, .. } if unit == "bananas"));
        assert_eq!(
            err.to_string(),
            "Failed to parse schedule format '5 bananas', invalid time unit: bananas"
        );
    }

    #[test]
    fn non_numeric_quantity_is_named_in_the_error() {
        let err = next_run("two minutes", &wednesday_morning()).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidDuration { ref value, .. } if value == "two"));
        assert!(err
            .to_string()
            .contains("Failed to parse schedule format 'two minutes', invalid duration: two"));
    }

    #[test]
    fn negative_quantity_is_rejected() {
        let err = next_run("-5 minutes", &wednesday_morning()).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidDuration { .. }));
    }

    #[test]
    fn clock_time_later_today_stays_today() {
        let now = wednesday_morning();
        assert_eq!(next_run("12:45", &now).unwrap(), ymd_hm(2024, 5, 15, 12, 45));
    }

    #[test]
    fn clock_time_already_passed_moves_to_tomorrow() {
        let now = wednesday_morning();
        assert_eq!(next_run("08:15", &now).unwrap(), ymd_hm(2024, 5, 16, 8, 15));
        // Exactly now is not in the future either.
        assert_eq!(next_run("10:30", &now).unwrap(), ymd_hm(2024, 5, 16, 10, 30));
    }

    #[test]
    fn same_weekday_rolls_a_full_week() {
        let now = wednesday_morning();
        assert_eq!(next_run("wednesday", &now).unwrap(), ymd_hm(2024, 5, 22, 0, 1));
    }

    #[test]
    fn same_weekday_before_default_time_still_rolls_a_week() {
        let now = ymd_hm(2024, 5, 15, 0, 0);
        assert_eq!(next_run("wednesday", &now).unwrap(), ymd_hm(2024, 5, 22, 0, 1));
    }

    #[test]
    fn upcoming_weekday_is_reached_this_week() {
        let now = wednesday_morning();
        let next = next_run("friday", &now).unwrap();
        assert_eq!(next, ymd_hm(2024, 5, 17, 0, 1));
        assert_eq!((next.date_naive() - now.date_naive()).num_days(), 2);
    }

    #[test]
    fn past_weekday_wraps_to_next_week() {
        let now = wednesday_morning();
        let next = next_run("monday", &now).unwrap();
        assert_eq!(next, ymd_hm(2024, 5, 20, 0, 1));
        assert_eq!((next.date_naive() - now.date_naive()).num_days(), 5);
    }

    #[test]
    fn weekday_names_ignore_case() {
        let now = wednesday_morning();
        assert_eq!(next_run("Friday", &now).unwrap(), next_run("friday", &now).unwrap());
        assert_eq!(next_run("MONDAY", &now).unwrap(), ymd_hm(2024, 5, 20, 0, 1));
    }

    #[test]
    fn weekday_at_time_today_when_not_yet_passed() {
        let now = wednesday_morning();
        assert_eq!(
            next_run("wednesday at 12:00", &now).unwrap(),
            ymd_hm(2024, 5, 15, 12, 0)
        );
    }

    #[test]
    fn weekday_at_time_already_passed_today_rolls_a_week() {
        let now = wednesday_morning();
        assert_eq!(
            next_run("wednesday at 09:00", &now).unwrap(),
            ymd_hm(2024, 5, 22, 9, 0)
        );
    }

    #[test]
    fn weekday_at_time_on_other_days() {
        let now = wednesday_morning();
        assert_eq!(
            next_run("friday at 15:08", &now).unwrap(),
            ymd_hm(2024, 5, 17, 15, 8)
        );
        assert_eq!(
            next_run("monday at 12:45", &now).unwrap(),
            ymd_hm(2024, 5, 20, 12, 45)
        );
    }

    #[test]
    fn malformed_weekday_at_time() {
        let now = wednesday_morning();
        assert!(matches!(
            next_run("funday at 10:00", &now),
            Err(ScheduleError::InvalidWeekday { ref weekday, .. }) if weekday == "funday"
        ));
        assert!(matches!(
            next_run("monday at 25:00", &now),
            Err(ScheduleError::InvalidTime { ref value, .. }) if value == "25:00"
        ));
        assert!(matches!(
            next_run("monday on 10:00", &now),
            Err(ScheduleError::InvalidFormat(_))
        ));
    }

    #[test]
    fn unrecognised_shapes_echo_the_input() {
        let now = wednesday_morning();
        for input in ["", "banana", "every 5 minutes now", "1 2 3 4"] {
            let err = next_run(input, &now).unwrap_err();
            assert_eq!(err, ScheduleError::InvalidFormat(input.to_string()));
            assert_eq!(err.to_string(), format!("Invalid schedule format: {input}"));
        }
    }

    #[test]
    fn local_schedules_follow_the_timezone_of_now() {
        // 02:00 UTC Wednesday is 23:00 Tuesday in São Paulo (UTC-3).
        let tz = chrono_tz::America::Sao_Paulo;
        let now = ymd_hm(2024, 5, 15, 2, 0).with_timezone(&tz);

        let next = next_run("wednesday", &now).unwrap();
        assert_eq!(next.with_timezone(&Utc), ymd_hm(2024, 5, 15, 3, 1));

        let next = next_run("22:00", &now).unwrap();
        assert_eq!(next.day(), 15);
        assert_eq!(next.hour(), 22);
    }

    #[test]
    fn clock_time_inside_dst_gap_is_pushed_forward() {
        // Berlin skips 02:00-03:00 on 2024-03-31.
        let tz = chrono_tz::Europe::Berlin;
        let now = tz.with_ymd_and_hms(2024, 3, 30, 12, 0, 0).unwrap();

        let next = next_run("02:30", &now).unwrap();
        assert_eq!(next.with_timezone(&Utc), ymd_hm(2024, 3, 31, 1, 30));
    }
}
