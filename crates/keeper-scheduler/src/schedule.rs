use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Recurring schedule of a maintenance job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cadence {
    /// Repeat with a fixed interval in seconds.
    Interval { every_secs: u64 },

    /// Every day at the given hour and minute (UTC).
    Daily { hour: u8, minute: u8 },

    /// On a specific weekday (0 = Monday … 6 = Sunday) at the given time (UTC).
    Weekly { day: u8, hour: u8, minute: u8 },
}

/// First firing for a job registered at `now`.
pub fn first_fire(cadence: &Cadence, now: DateTime<Utc>) -> DateTime<Utc> {
    match cadence {
        Cadence::Interval { every_secs } => now + Duration::seconds(*every_secs as i64),
        Cadence::Daily { hour, minute } => next_daily_slot(now, *hour, *minute),
        Cadence::Weekly { day, hour, minute } => next_weekly_slot(now, *day, *hour, *minute),
    }
}

/// Reschedule after a run that fired for the slot `prior`.
///
/// Interval cadences advance from `prior`, not from `now`, by whole
/// cadences until the result is in the future. That keeps the schedule
/// drift-free when the process is up (exactly `prior + cadence`) and
/// collapses any number of missed slots into the single catch-up run that
/// already happened. Daily/weekly cadences move to the next matching slot
/// strictly after `now`.
pub fn next_fire_after(cadence: &Cadence, prior: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    match cadence {
        Cadence::Interval { every_secs } => {
            let step = Duration::seconds((*every_secs).max(1) as i64);
            let mut next = prior + step;
            while next <= now {
                next = next + step;
            }
            next
        }
        Cadence::Daily { hour, minute } => next_daily_slot(now, *hour, *minute),
        Cadence::Weekly { day, hour, minute } => next_weekly_slot(now, *day, *hour, *minute),
    }
}

/// Next HH:MM UTC slot strictly after `from`.
fn next_daily_slot(from: DateTime<Utc>, hour: u8, minute: u8) -> DateTime<Utc> {
    let (hour, minute) = ((hour % 24) as u32, (minute % 60) as u32);
    let candidate = Utc
        .with_ymd_and_hms(from.year(), from.month(), from.day(), hour, minute, 0)
        .single()
        .unwrap_or(from);
    if candidate > from {
        candidate
    } else {
        candidate + Duration::days(1)
    }
}

/// Next weekday/HH:MM UTC slot strictly after `from`.
fn next_weekly_slot(from: DateTime<Utc>, day: u8, hour: u8, minute: u8) -> DateTime<Utc> {
    let (hour, minute) = ((hour % 24) as u32, (minute % 60) as u32);
    let target = (day.min(6)) as i64;
    let today = from.weekday().num_days_from_monday() as i64;
    let days_ahead = (target - today).rem_euclid(7);

    let candidate_day = from + Duration::days(days_ahead);
    let candidate = Utc
        .with_ymd_and_hms(
            candidate_day.year(),
            candidate_day.month(),
            candidate_day.day(),
            hour,
            minute,
            0,
        )
        .single()
        .unwrap_or(from);

    if candidate > from {
        candidate
    } else {
        candidate + Duration::days(7)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn interval_advances_from_prior_not_now() {
        let prior = at(2026, 3, 14, 10, 0);
        // The tick loop observed the firing 3 seconds late.
        let now = prior + Duration::seconds(3);
        let cadence = Cadence::Interval { every_secs: 3600 };
        assert_eq!(
            next_fire_after(&cadence, prior, now),
            prior + Duration::seconds(3600)
        );
    }

    #[test]
    fn interval_collapses_missed_slots_into_one_future_slot() {
        let prior = at(2026, 3, 14, 10, 0);
        // Process was offline for 5 intervals.
        let now = prior + Duration::seconds(5 * 600 + 30);
        let cadence = Cadence::Interval { every_secs: 600 };
        let next = next_fire_after(&cadence, prior, now);
        assert!(next > now);
        assert_eq!(next, prior + Duration::seconds(6 * 600));
    }

    #[test]
    fn daily_slot_today_when_still_ahead() {
        let now = at(2026, 3, 14, 1, 30);
        assert_eq!(
            next_daily_slot(now, 3, 0),
            at(2026, 3, 14, 3, 0)
        );
    }

    #[test]
    fn daily_slot_rolls_to_tomorrow_when_passed() {
        let now = at(2026, 3, 14, 3, 0);
        assert_eq!(next_daily_slot(now, 3, 0), at(2026, 3, 15, 3, 0));
    }

    #[test]
    fn weekly_slot_picks_next_matching_weekday() {
        // 2026-03-14 is a Saturday (weekday 5); Sunday is day 6.
        let now = at(2026, 3, 14, 12, 0);
        assert_eq!(next_weekly_slot(now, 6, 4, 0), at(2026, 3, 15, 4, 0));
    }

    #[test]
    fn weekly_slot_wraps_a_full_week() {
        // Sunday 05:00, target Sunday 04:00, already passed today.
        let now = at(2026, 3, 15, 5, 0);
        assert_eq!(next_weekly_slot(now, 6, 4, 0), at(2026, 3, 22, 4, 0));
    }

    #[test]
    fn first_fire_interval_is_one_cadence_out() {
        let now = at(2026, 3, 14, 10, 0);
        let cadence = Cadence::Interval { every_secs: 60 };
        assert_eq!(first_fire(&cadence, now), now + Duration::seconds(60));
    }
}
