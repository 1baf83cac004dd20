//! Shared lookup tables for the ingestion stages.
//! Keep these in one place so the validator, date normalizer and tagger agree.

/// Source id for manually curated records; refreshes never snapshot or delete these.
pub const ADMIN_SOURCE: &str = "admin";

/// Token used in dedupe keys when an event has no known date.
pub const UNDATED_TOKEN: &str = "undated";

/// Delimiter between dedupe key fields; backslash-escaped inside a field.
pub const DEDUPE_KEY_DELIMITER: &str = "|";

pub const MIN_TITLE_LEN: usize = 3;
pub const MAX_TITLE_LEN: usize = 200;

/// Navigation labels and boilerplate that scrapers pick up as titles.
/// Compared case-insensitively against the whole trimmed title.
pub const NON_EVENT_TITLES: &[&str] = &[
    "search",
    "menu",
    "about",
    "about us",
    "home",
    "contact",
    "contact us",
    "previous events",
    "past events",
    "upcoming events",
    "all events",
    "events",
    "event",
    "calendar",
    "google calendar",
    "icalendar",
    "ical",
    "outlook",
    "add to calendar",
    "filter",
    "filters",
    "(map)",
    "map",
    "view details",
    "view event",
    "more info",
    "more information",
    "read more",
    "learn more",
    "show more",
    "load more",
    "see all",
    "view all",
    "buy tickets",
    "get tickets",
    "tickets",
    "book now",
    "register",
    "subscribe",
    "newsletter",
    "sign in",
    "sign up",
    "log in",
    "login",
    "share",
    "next",
    "previous",
    "back",
    "close",
    "skip to content",
    "untitled",
    "untitled event",
    "event title",
    "title",
    "tba",
    "tbd",
    "coming soon",
    "no events found",
    "no upcoming events",
    "loading",
    "loading...",
];

/// Date text that means "we do not know", never a real date.
pub const DATE_PLACEHOLDERS: &[&str] = &[
    "tba",
    "tbd",
    "t.b.a.",
    "date tba",
    "date tbd",
    "dates tba",
    "to be announced",
    "to be determined",
    "check website",
    "check website for dates",
    "see website",
    "visit website",
    "coming soon",
    "various dates",
    "multiple dates",
    "ongoing",
    "n/a",
    "none",
    "null",
    "undefined",
    "invalid date",
];

/// Month table, zero-based: index 0 is January.
/// Every entry is a lowercase prefix form accepted in free text.
pub const MONTHS: [&[&str]; 12] = [
    &["january", "jan"],
    &["february", "feb"],
    &["march", "mar"],
    &["april", "apr"],
    &["may"],
    &["june", "jun"],
    &["july", "jul"],
    &["august", "aug"],
    &["september", "sept", "sep"],
    &["october", "oct"],
    &["november", "nov"],
    &["december", "dec"],
];

pub const WEEKDAYS: &[&str] = &[
    "monday", "mon", "tuesday", "tue", "tues", "wednesday", "wed", "thursday", "thu", "thur",
    "thurs", "friday", "fri", "saturday", "sat", "sunday", "sun",
];

/// Zero-based month index for a month name or abbreviation.
pub fn month_index(token: &str) -> Option<usize> {
    let token = token.trim_end_matches('.').to_lowercase();
    MONTHS
        .iter()
        .position(|forms| forms.iter().any(|form| *form == token))
}

pub fn is_weekday(token: &str) -> bool {
    let token = token.trim_end_matches('.').to_lowercase();
    WEEKDAYS.contains(&token.as_str())
}
