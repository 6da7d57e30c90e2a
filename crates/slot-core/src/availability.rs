//! # Availability Engine
//!
//! Combines the recurring weekly template with the bookings of one month and
//! the current civil time to produce the bookable slots per date.
//!
//! ```text
//!   weekly template ──┐
//!   active bookings ──┼──► compute_availability ──► { date → [slot, ...] }
//!   civil "now"     ──┘
//! ```
//!
//! Everything here is pure; callers supply the inputs.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Bookable slots per date; dates with no slots are absent
pub type MonthAvailability = BTreeMap<NaiveDate, Vec<String>>;

/// A `HH:MM-HH:MM` range, held as minutes since midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeRange {
    pub start: u16,
    pub end: u16,
}

impl TimeRange {
    /// Parse `9:00-10:00`, `09:00 - 10:00` or `09:00–10:00`.
    /// Returns `None` for anything malformed or with `end <= start`.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.replace(['–', '—'], "-");
        let (start, end) = normalized.split_once('-')?;
        let start = parse_clock(start)?;
        let end = parse_clock(end)?;
        (end > start).then_some(Self { start, end })
    }

    /// Start as (hour, minute)
    pub fn start_hm(&self) -> (u32, u32) {
        (u32::from(self.start / 60), u32::from(self.start % 60))
    }

    /// End as (hour, minute)
    pub fn end_hm(&self) -> (u32, u32) {
        (u32::from(self.end / 60), u32::from(self.end % 60))
    }

    pub fn duration_minutes(&self) -> u16 {
        self.end - self.start
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}:{:02}-{:02}:{:02}",
            self.start / 60,
            self.start % 60,
            self.end / 60,
            self.end % 60
        )
    }
}

fn parse_clock(raw: &str) -> Option<u16> {
    let (h, m) = raw.trim().split_once(':')?;
    let h: u16 = h.trim().parse().ok()?;
    let m: u16 = m.trim().parse().ok()?;
    (h <= 24 && m < 60 && h * 60 + m <= 24 * 60).then_some(h * 60 + m)
}

/// Canonical text form of a slot; unparseable input is returned trimmed
pub fn canonical_slot(raw: &str) -> String {
    TimeRange::parse(raw)
        .map(|r| r.to_string())
        .unwrap_or_else(|| raw.trim().to_string())
}

/// One row of the `availability` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSlot {
    pub weekday: Weekday,
    pub time: String,
    #[serde(default = "default_true")]
    pub available: bool,
}

fn default_true() -> bool {
    true
}

impl TemplateSlot {
    pub fn new(weekday: Weekday, time: impl Into<String>) -> Self {
        Self {
            weekday,
            time: time.into(),
            available: true,
        }
    }
}

/// Parse a weekday cell ("Mon", "monday", "1" = Monday ... "7" = Sunday)
pub fn parse_weekday(raw: &str) -> Option<Weekday> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<u8>() {
        return match n {
            1 => Some(Weekday::Mon),
            2 => Some(Weekday::Tue),
            3 => Some(Weekday::Wed),
            4 => Some(Weekday::Thu),
            5 => Some(Weekday::Fri),
            6 => Some(Weekday::Sat),
            7 | 0 => Some(Weekday::Sun),
            _ => None,
        };
    }
    raw.parse::<Weekday>().ok()
}

/// Recurring weekly template, available slots only, ordered by start
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeeklyTemplate {
    days: [Vec<TimeRange>; 7],
}

impl WeeklyTemplate {
    /// Build from store rows. Unavailable rows are dropped; malformed ranges
    /// are dropped as well rather than failing the whole template.
    pub fn from_slots(slots: &[TemplateSlot]) -> Self {
        let mut days: [Vec<TimeRange>; 7] = Default::default();
        for slot in slots.iter().filter(|s| s.available) {
            match TimeRange::parse(&slot.time) {
                Some(range) => days[slot.weekday.num_days_from_monday() as usize].push(range),
                None => debug!(weekday = %slot.weekday, time = %slot.time, "Skipping malformed template slot"),
            }
        }
        for day in days.iter_mut() {
            day.sort();
            day.dedup();
        }
        Self { days }
    }

    pub fn slots_for(&self, weekday: Weekday) -> &[TimeRange] {
        &self.days[weekday.num_days_from_monday() as usize]
    }

    pub fn is_empty(&self) -> bool {
        self.days.iter().all(Vec::is_empty)
    }
}

/// A calendar month, `YYYY-MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    /// Parse `YYYY-MM`
    pub fn parse(raw: &str) -> Option<Self> {
        let (y, m) = raw.trim().split_once('-')?;
        if y.len() != 4 || m.len() != 2 {
            return None;
        }
        Self::new(y.parse().ok()?, m.parse().ok()?)
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// Every date of the month in order
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let first = NaiveDate::from_ymd_opt(self.year, self.month, 1);
        let month = self.month;
        first
            .into_iter()
            .flat_map(|d| d.iter_days())
            .take_while(move |d| d.month() == month)
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// A slot consumed by an active booking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookedSlot {
    pub date: NaiveDate,
    pub time: String,
}

impl BookedSlot {
    pub fn new(date: NaiveDate, time: impl Into<String>) -> Self {
        Self {
            date,
            time: time.into(),
        }
    }
}

/// Compute bookable slots for `month`.
///
/// `booked` must already be restricted to active (non-cancelled,
/// non-refunded) bookings; entries outside the month are ignored.
pub fn compute_availability(
    month: MonthKey,
    template: &WeeklyTemplate,
    booked: &[BookedSlot],
    now: NaiveDateTime,
) -> MonthAvailability {
    let today = now.date();
    let now_minutes = (now.hour() * 60 + now.minute()) as u16;
    let mut result = MonthAvailability::new();

    for date in month.days() {
        if date < today {
            continue;
        }

        let taken: Vec<String> = booked
            .iter()
            .filter(|b| b.date == date)
            .map(|b| canonical_slot(&b.time))
            .collect();

        let remaining: Vec<String> = template
            .slots_for(date.weekday())
            .iter()
            .filter(|range| date != today || range.start > now_minutes)
            .map(|range| range.to_string())
            .filter(|slot| !taken.contains(slot))
            .collect();

        if !remaining.is_empty() {
            result.insert(date, remaining);
        }
    }

    result
}

/// True when `time` on `date` is a template slot not yet elapsed and not taken
pub fn is_slot_open(
    date: NaiveDate,
    time: &str,
    template: &WeeklyTemplate,
    booked: &[BookedSlot],
    now: NaiveDateTime,
) -> bool {
    let Some(month) = MonthKey::new(date.year(), date.month()) else {
        return false;
    };
    let wanted = canonical_slot(time);
    compute_availability(month, template, booked, now)
        .get(&date)
        .map(|slots| slots.contains(&wanted))
        .unwrap_or(false)
}
