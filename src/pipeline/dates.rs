//! Free-text date normalization.
//!
//! Every path either produces a date the text actually states or `None`.
//! There is no fallback: an unparseable, truncated or placeholder value maps
//! to "date unknown", never to today or a sentinel.

use crate::constants::{month_index, DATE_PLACEHOLDERS};
use crate::types::EventDate;
use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

const ORDINAL: &str = r"(?:st|nd|rd|th)?";

/// "Dec 19 - 21, 2025", "December 28 - January 3, 2026"
static RANGE_WITH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b([a-z]+)\.?\s+(\d{{1,2}}){o}\s*(?:-|–|—|to|through)\s*(?:([a-z]+)\.?\s+)?(\d{{1,2}}){o},?\s+(\d{{4}})\b",
        o = ORDINAL
    ))
    .expect("valid range regex")
});

/// "December 19th, 2025", "Dec. 19 2025"
static MONTH_DAY_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b([a-z]+)\.?\s+(\d{{1,2}}){o},?\s+(\d{{4}})\b",
        o = ORDINAL
    ))
    .expect("valid month-day-year regex")
});

/// "19 December 2025", "19th of Dec, 2025"
static DAY_MONTH_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(\d{{1,2}}){o}\s+(?:of\s+)?([a-z]+)\.?,?\s+(\d{{4}})\b",
        o = ORDINAL
    ))
    .expect("valid day-month-year regex")
});

/// "Dec 19", "December 19th"
static MONTH_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b([a-z]+)\.?\s+(\d{{1,2}}){o}\b", o = ORDINAL))
        .expect("valid month-day regex")
});

static CLOCK_MERIDIEM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*([ap])\.?\s?m\b\.?").expect("valid clock regex")
});

static CLOCK_24H: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\b").expect("valid 24h clock regex"));

/// Converts free text into a canonical date relative to a fixed "today".
#[derive(Debug, Clone, Copy)]
pub struct DateNormalizer {
    today: NaiveDate,
}

impl DateNormalizer {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    pub fn for_today() -> Self {
        Self::new(Local::now().date_naive())
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn normalize(&self, text: &str) -> Option<EventDate> {
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() || is_placeholder(&text) || is_truncated(&text) {
            return None;
        }

        let parsed = parse_iso(&text)
            .or_else(|| self.parse_range(&text))
            .or_else(|| self.parse_month_day_year(&text))
            .or_else(|| self.parse_day_month_year(&text))
            .or_else(|| self.parse_month_day(&text))?;

        self.is_plausible(&parsed).then_some(parsed)
    }

    /// Years outside [current - 1, current + 2] are treated as transcription noise.
    fn is_plausible(&self, date: &EventDate) -> bool {
        let year = date.day().year();
        let current = self.today.year();
        (current - 1..=current + 2).contains(&year)
    }

    fn parse_range(&self, text: &str) -> Option<EventDate> {
        RANGE_WITH_YEAR.captures_iter(text).find_map(|caps| {
            let start_month = month_index(&caps[1])?;
            let end_month = match caps.get(3) {
                Some(m) => month_index(m.as_str())?,
                None => start_month,
            };
            let day = caps[2].parse::<u32>().ok()?;
            let mut year = caps[5].parse::<i32>().ok()?;
            // "Dec 28 - Jan 3, 2026" starts in the previous year
            if start_month > end_month {
                year -= 1;
            }
            with_time(ymd(year, start_month, day)?, text, &caps)
        })
    }

    fn parse_month_day_year(&self, text: &str) -> Option<EventDate> {
        MONTH_DAY_YEAR.captures_iter(text).find_map(|caps| {
            let month = month_index(&caps[1])?;
            let day = caps[2].parse::<u32>().ok()?;
            let year = caps[3].parse::<i32>().ok()?;
            with_time(ymd(year, month, day)?, text, &caps)
        })
    }

    fn parse_day_month_year(&self, text: &str) -> Option<EventDate> {
        DAY_MONTH_YEAR.captures_iter(text).find_map(|caps| {
            let day = caps[1].parse::<u32>().ok()?;
            let month = month_index(&caps[2])?;
            let year = caps[3].parse::<i32>().ok()?;
            with_time(ymd(year, month, day)?, text, &caps)
        })
    }

    /// Month and day without a year: the nearest occurrence on or after today.
    fn parse_month_day(&self, text: &str) -> Option<EventDate> {
        MONTH_DAY.captures_iter(text).find_map(|caps| {
            let month = month_index(&caps[1])?;
            let day = caps[2].parse::<u32>().ok()?;

            // "Dec 19, 20" is a cut-off year, not a yearless date; "Dec 19 8pm" is a time
            let whole = caps.get(0)?;
            let rest = text[whole.end()..].trim_start_matches(|c: char| c == ',' || c.is_whitespace());
            if rest.starts_with(|c: char| c.is_ascii_digit()) && !starts_with_clock(rest) {
                return None;
            }

            let year = self.today.year();
            let date = match ymd(year, month, day) {
                Some(d) if d >= self.today => d,
                _ => ymd(year + 1, month, day)?,
            };
            with_time(date, text, &caps)
        })
    }
}

/// Normalizes against the local calendar date.
pub fn normalize_date(text: &str) -> Option<EventDate> {
    DateNormalizer::for_today().normalize(text)
}

fn is_placeholder(text: &str) -> bool {
    let lower = text
        .trim_end_matches(|c: char| c == '.' || c == '!' || c == ':')
        .to_lowercase();
    DATE_PLACEHOLDERS.contains(&lower.as_str())
}

fn is_truncated(text: &str) -> bool {
    text.contains("...") || text.contains('…')
}

/// ISO 8601 / RFC 3339 in the forms producers and older stores use.
/// Offsets are dropped; the wall-clock date and time are kept as stated.
pub(crate) fn parse_iso(text: &str) -> Option<EventDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(EventDate::DateTime(dt.naive_local()));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(EventDate::DateTime(dt));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(EventDate::Day)
}

/// Builds a date from a zero-based month; rejects impossible days.
fn ymd(year: i32, month0: usize, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month0 as u32 + 1, day)
}

/// Attaches a clock time found outside the matched date span, if any.
fn with_time(date: NaiveDate, text: &str, caps: &Captures<'_>) -> Option<EventDate> {
    let span = caps.get(0)?;
    let outside = format!("{} {}", &text[..span.start()], &text[span.end()..]);
    Some(match extract_time(&outside) {
        Some(time) => EventDate::DateTime(date.and_time(time)),
        None => EventDate::Day(date),
    })
}

fn starts_with_clock(text: &str) -> bool {
    [&*CLOCK_MERIDIEM, &*CLOCK_24H]
        .iter()
        .any(|re| re.find(text).is_some_and(|m| m.start() == 0))
}

fn extract_time(text: &str) -> Option<NaiveTime> {
    if let Some(caps) = CLOCK_MERIDIEM.captures(text) {
        let hour = caps[1].parse::<u32>().ok()?;
        let minute = caps.get(2).map_or(Some(0), |m| m.as_str().parse::<u32>().ok())?;
        if hour == 0 || hour > 12 {
            return None;
        }
        let pm = caps[3].eq_ignore_ascii_case("p");
        let hour24 = match (hour, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, true) => h + 12,
            (h, false) => h,
        };
        return NaiveTime::from_hms_opt(hour24, minute, 0);
    }
    let caps = CLOCK_24H.captures(text)?;
    NaiveTime::from_hms_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, 0)
}
