// SPDX-FileCopyrightText: 2026 Coldflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Business-hours calendar gate.
//!
//! A pure predicate over the configured sending window: target timezone,
//! start/end hours, weekend policy, and the US federal holiday calendar
//! (plus adjacent quiet days) with user-supplied extra dates.

use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;

use coldflow_config::model::ScheduleConfig;
use coldflow_core::ColdflowError;

/// Nth occurrence of a weekday in a month (1-based).
fn nth_weekday(year: i32, month: u32, weekday: Weekday, nth: u32) -> NaiveDate {
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month start");
    let offset = (7 + weekday.num_days_from_monday() - first.weekday().num_days_from_monday()) % 7;
    first + Duration::days(i64::from(offset + (nth - 1) * 7))
}

/// Last occurrence of a weekday in a month.
fn last_weekday(year: i32, month: u32, weekday: Weekday) -> NaiveDate {
    let last_day = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("valid month rollover")
        - Duration::days(1);
    let offset = (7 + last_day.weekday().num_days_from_monday() - weekday.num_days_from_monday()) % 7;
    last_day - Duration::days(i64::from(offset))
}

fn thanksgiving(year: i32) -> NaiveDate {
    nth_weekday(year, 11, Weekday::Thu, 4)
}

/// US federal holidays plus the adjacent quiet days nobody cold-emails on.
pub fn us_holidays(year: i32) -> Vec<(NaiveDate, &'static str)> {
    let ymd = |m, d| NaiveDate::from_ymd_opt(year, m, d).expect("valid holiday date");
    vec![
        (ymd(1, 1), "New Year's Day"),
        (nth_weekday(year, 1, Weekday::Mon, 3), "Martin Luther King Jr. Day"),
        (nth_weekday(year, 2, Weekday::Mon, 3), "Presidents' Day"),
        (last_weekday(year, 5, Weekday::Mon), "Memorial Day"),
        (ymd(6, 19), "Juneteenth"),
        (ymd(7, 4), "Independence Day"),
        (nth_weekday(year, 9, Weekday::Mon, 1), "Labor Day"),
        (ymd(11, 11), "Veterans Day"),
        (thanksgiving(year), "Thanksgiving"),
        (thanksgiving(year) + Duration::days(1), "Day After Thanksgiving"),
        (ymd(12, 24), "Christmas Eve"),
        (ymd(12, 25), "Christmas Day"),
        (ymd(12, 31), "New Year's Eve"),
    ]
}

/// Why the gate is currently closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClosedReason {
    Weekend,
    Holiday(String),
    BeforeWindow,
    AfterWindow,
}

impl std::fmt::Display for ClosedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClosedReason::Weekend => write!(f, "weekend"),
            ClosedReason::Holiday(name) => write!(f, "holiday ({name})"),
            ClosedReason::BeforeWindow => write!(f, "before sending window"),
            ClosedReason::AfterWindow => write!(f, "after sending window"),
        }
    }
}

/// Decides whether sending is allowed at a given instant.
#[derive(Debug, Clone)]
pub struct CalendarGate {
    tz: Tz,
    start_hour: u8,
    end_hour: u8,
    send_on_weekends: bool,
    observe_us_holidays: bool,
    extra_holidays: Vec<NaiveDate>,
}

impl CalendarGate {
    pub fn new(config: &ScheduleConfig) -> Result<Self, ColdflowError> {
        let tz = Tz::from_str(&config.timezone).map_err(|_| {
            ColdflowError::Config(format!("invalid timezone `{}`", config.timezone))
        })?;
        Ok(Self {
            tz,
            start_hour: config.start_hour,
            end_hour: config.end_hour,
            send_on_weekends: config.send_on_weekends,
            observe_us_holidays: config.observe_us_holidays,
            extra_holidays: config.extra_holidays.clone(),
        })
    }

    /// The configured target timezone.
    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Calendar date at `now` in the target timezone. Reputation day keys
    /// use this, so counters and the sending window agree on what "today" is.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    /// Minute-of-day at `now` in the target timezone.
    pub fn local_minute(&self, now: DateTime<Utc>) -> u32 {
        let local = now.with_timezone(&self.tz);
        local.hour() * 60 + local.minute()
    }

    /// The holiday name for a date, if it is one.
    pub fn holiday_name(&self, date: NaiveDate) -> Option<String> {
        if self.extra_holidays.contains(&date) {
            return Some("configured quiet day".to_string());
        }
        if self.observe_us_holidays {
            return us_holidays(date.year())
                .into_iter()
                .find(|(d, _)| *d == date)
                .map(|(_, name)| name.to_string());
        }
        None
    }

    fn day_allowed(&self, date: NaiveDate) -> Result<(), ClosedReason> {
        if !self.send_on_weekends
            && matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
        {
            return Err(ClosedReason::Weekend);
        }
        if let Some(name) = self.holiday_name(date) {
            return Err(ClosedReason::Holiday(name));
        }
        Ok(())
    }

    /// Full gate check with the reason when closed.
    pub fn check(&self, now: DateTime<Utc>) -> Result<(), ClosedReason> {
        let local = now.with_timezone(&self.tz);
        self.day_allowed(local.date_naive())?;
        let hour = local.hour() as u8;
        if hour < self.start_hour {
            return Err(ClosedReason::BeforeWindow);
        }
        if hour >= self.end_hour {
            return Err(ClosedReason::AfterWindow);
        }
        Ok(())
    }

    /// `is_sending_allowed(now)` — the predicate the rest of the system sees.
    pub fn allows(&self, now: DateTime<Utc>) -> bool {
        self.check(now).is_ok()
    }

    /// The window start instant on a given local date, when it exists
    /// (skips nonexistent local times around DST transitions).
    fn window_open_at(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let naive = date.and_hms_opt(u32::from(self.start_hour), 0, 0)?;
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn window_close_at(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let naive = date.and_hms_opt(u32::from(self.end_hour), 0, 0)?;
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// The next instant at which sending will be allowed: `now` itself when
    /// the gate is already open, otherwise the next window start.
    pub fn next_open(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = self.local_date(now);
        let mut date = today;
        // Bounded scan; a year always contains an allowed weekday.
        for _ in 0..370 {
            if self.day_allowed(date).is_ok()
                && let (Some(open), Some(close)) =
                    (self.window_open_at(date), self.window_close_at(date))
            {
                if now < open {
                    return open;
                }
                if now < close {
                    return now;
                }
            }
            date = date.succ_opt().unwrap_or(date);
        }
        now + Duration::days(1)
    }

    /// Start of the next allowed day's window, strictly after today. Used
    /// when a day's capacity is exhausted regardless of the current gate
    /// state.
    pub fn next_day_open(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = self.local_date(now);
        let mut date = today.succ_opt().unwrap_or(today);
        for _ in 0..370 {
            if self.day_allowed(date).is_ok()
                && let Some(open) = self.window_open_at(date)
            {
                return open;
            }
            date = date.succ_opt().unwrap_or(date);
        }
        now + Duration::days(1)
    }

    /// The sending window as (start_hour, end_hour).
    pub fn window(&self) -> (u8, u8) {
        (self.start_hour, self.end_hour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> CalendarGate {
        CalendarGate::new(&ScheduleConfig::default()).unwrap()
    }

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn computed_holidays_2026() {
        let holidays = us_holidays(2026);
        let find = |name: &str| {
            holidays
                .iter()
                .find(|(_, n)| *n == name)
                .map(|(d, _)| *d)
                .unwrap()
        };
        assert_eq!(find("Thanksgiving"), NaiveDate::from_ymd_opt(2026, 11, 26).unwrap());
        assert_eq!(find("Memorial Day"), NaiveDate::from_ymd_opt(2026, 5, 25).unwrap());
        assert_eq!(find("Labor Day"), NaiveDate::from_ymd_opt(2026, 9, 7).unwrap());
        assert_eq!(
            find("Martin Luther King Jr. Day"),
            NaiveDate::from_ymd_opt(2026, 1, 19).unwrap()
        );
    }

    #[test]
    fn weekday_business_hours_allowed() {
        // Tuesday 2026-03-03 14:00 UTC = 09:00 EST.
        let g = gate();
        assert!(g.allows(utc("2026-03-03T14:00:00Z")));
        // 08:59 EST is before the window.
        assert_eq!(
            g.check(utc("2026-03-03T13:59:00Z")),
            Err(ClosedReason::BeforeWindow)
        );
        // 17:00 EST is after the window (exclusive end).
        assert_eq!(
            g.check(utc("2026-03-03T22:00:00Z")),
            Err(ClosedReason::AfterWindow)
        );
    }

    #[test]
    fn weekends_are_closed_by_default() {
        // Saturday 2026-03-07 15:00 UTC = 10:00 EST.
        assert_eq!(
            gate().check(utc("2026-03-07T15:00:00Z")),
            Err(ClosedReason::Weekend)
        );

        let mut config = ScheduleConfig::default();
        config.send_on_weekends = true;
        let g = CalendarGate::new(&config).unwrap();
        assert!(g.allows(utc("2026-03-07T15:00:00Z")));
    }

    #[test]
    fn holidays_are_closed() {
        // July 4th 2026 falls on a Saturday; use Juneteenth (Friday) instead.
        let g = gate();
        let check = g.check(utc("2026-06-19T15:00:00Z"));
        assert!(
            matches!(check, Err(ClosedReason::Holiday(ref n)) if n == "Juneteenth"),
            "got {check:?}"
        );
    }

    #[test]
    fn extra_holidays_close_the_gate() {
        let mut config = ScheduleConfig::default();
        config.extra_holidays = vec![NaiveDate::from_ymd_opt(2026, 3, 3).unwrap()];
        let g = CalendarGate::new(&config).unwrap();
        assert!(!g.allows(utc("2026-03-03T15:00:00Z")));
    }

    #[test]
    fn next_open_is_now_when_open() {
        let g = gate();
        let now = utc("2026-03-03T15:00:00Z");
        assert_eq!(g.next_open(now), now);
    }

    #[test]
    fn next_open_skips_weekend_to_monday() {
        let g = gate();
        // Friday 2026-03-06 23:00 UTC = 18:00 EST (after window).
        let friday_evening = utc("2026-03-06T23:00:00Z");
        let next = g.next_open(friday_evening);
        let local = next.with_timezone(&g.timezone());
        assert_eq!(local.weekday(), Weekday::Mon);
        assert_eq!(local.hour(), 9);
    }

    #[test]
    fn next_open_same_morning_before_window() {
        let g = gate();
        // Tuesday 2026-03-03 11:00 UTC = 06:00 EST.
        let next = g.next_open(utc("2026-03-03T11:00:00Z"));
        let local = next.with_timezone(&g.timezone());
        assert_eq!(local.hour(), 9);
        assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2026, 3, 3).unwrap());
    }

    #[test]
    fn next_day_open_lands_on_next_allowed_day() {
        let g = gate();
        // Friday midday: next-day open must skip to Monday.
        let friday_noon = utc("2026-03-06T17:00:00Z");
        let next = g.next_day_open(friday_noon);
        let local = next.with_timezone(&g.timezone());
        assert_eq!(local.weekday(), Weekday::Mon);
    }

    #[test]
    fn local_date_uses_target_timezone() {
        let g = gate();
        // 03:00 UTC on March 4 is still March 3 in New York.
        assert_eq!(
            g.local_date(utc("2026-03-04T03:00:00Z")),
            NaiveDate::from_ymd_opt(2026, 3, 3).unwrap()
        );
    }
}
