use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

/// Wall-clock time of day, minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DailyTime {
    pub hour: u32,
    pub minute: u32,
}

impl DailyTime {
    pub fn new(hour: u32, minute: u32) -> anyhow::Result<Self> {
        if hour > 23 || minute > 59 {
            bail!("time of day out of range: {hour:02}:{minute:02}");
        }
        Ok(Self { hour, minute })
    }
}

impl Default for DailyTime {
    fn default() -> Self {
        Self { hour: 9, minute: 0 }
    }
}

impl fmt::Display for DailyTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for DailyTime {
    type Err = anyhow::Error;

    /// Accepts `H:MM` or `HH:MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .trim()
            .split_once(':')
            .with_context(|| format!("expected HH:MM, got {s:?}"))?;
        let hour = h.parse::<u32>().with_context(|| format!("bad hour in {s:?}"))?;
        let minute = m.parse::<u32>().with_context(|| format!("bad minute in {s:?}"))?;
        Self::new(hour, minute)
    }
}

/// Fires at most once per calendar day when polled during the configured
/// minute. Polls that miss the minute are not caught up.
#[derive(Debug, Clone)]
pub struct DailySchedule {
    at: DailyTime,
    skip_weekends: bool,
    holidays: HashSet<NaiveDate>,
    last_fired: Option<NaiveDate>,
}

impl DailySchedule {
    pub fn new(at: DailyTime, skip_weekends: bool) -> Self {
        Self {
            at,
            skip_weekends,
            holidays: HashSet::new(),
            last_fired: None,
        }
    }

    /// Market holidays are skipped along with weekends.
    pub fn with_holidays(mut self, holidays: HashSet<NaiveDate>) -> Self {
        self.holidays = holidays;
        self
    }

    pub fn at(&self) -> DailyTime {
        self.at
    }

    pub fn due(&mut self, now: NaiveDateTime) -> bool {
        let today = now.date();
        if (now.hour(), now.minute()) != (self.at.hour, self.at.minute) {
            return false;
        }
        if self.last_fired == Some(today) {
            return false;
        }
        if self.skip_weekends && (is_weekend(today) || self.holidays.contains(&today)) {
            return false;
        }
        self.last_fired = Some(today);
        true
    }
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

/// Fixed-date US market holidays plus any listed in
/// `US_MARKET_HOLIDAYS="YYYY-MM-DD,YYYY-MM-DD"`.
pub fn configured_holidays() -> HashSet<NaiveDate> {
    let mut out = HashSet::new();
    for y in 2024..=2030 {
        for (m, d) in [(1, 1), (6, 19), (7, 4), (12, 25)] {
            if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                out.insert(date);
            }
        }
    }

    if let Ok(s) = std::env::var("US_MARKET_HOLIDAYS") {
        out.extend(parse_holidays(&s));
    }
    out
}

fn parse_holidays(raw: &str) -> impl Iterator<Item = NaiveDate> + '_ {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .filter_map(|p| match NaiveDate::parse_from_str(p, "%Y-%m-%d") {
            Ok(d) => Some(d),
            Err(_) => {
                tracing::warn!(value = %p, "ignoring malformed US_MARKET_HOLIDAYS entry");
                None
            }
        })
}
