use crate::constants::{is_weekday, month_index, MAX_TITLE_LEN, MIN_TITLE_LEN, NON_EVENT_TITLES};
use crate::types::RawCandidate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Script fragments scrapers sometimes capture in place of a title.
static CODE_FRAGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(function\b|var\s|const\s|let\s+\w+\s*=)|function\s*\(|=>|\bdocument\.|\bwindow\.|</?script",
    )
    .expect("valid code fragment regex")
});

/// Why a candidate was not accepted as an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationRejection {
    MissingTitle,
    TooShort,
    TooLong,
    Boilerplate,
    CodeFragment,
    DateOnly,
}

impl ValidationRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationRejection::MissingTitle => "missing_title",
            ValidationRejection::TooShort => "too_short",
            ValidationRejection::TooLong => "too_long",
            ValidationRejection::Boilerplate => "boilerplate",
            ValidationRejection::CodeFragment => "code_fragment",
            ValidationRejection::DateOnly => "date_only",
        }
    }
}

/// Pure predicate over a candidate's title.
pub fn is_valid_event(candidate: &RawCandidate) -> bool {
    validate(candidate).is_ok()
}

/// Same checks as [`is_valid_event`], reporting the first failed rule.
pub fn validate(candidate: &RawCandidate) -> Result<(), ValidationRejection> {
    let title = candidate
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ValidationRejection::MissingTitle)?;

    let len = title.chars().count();
    if len < MIN_TITLE_LEN {
        return Err(ValidationRejection::TooShort);
    }
    if len > MAX_TITLE_LEN {
        return Err(ValidationRejection::TooLong);
    }

    let lower = title.to_lowercase();
    if NON_EVENT_TITLES.contains(&lower.as_str()) {
        return Err(ValidationRejection::Boilerplate);
    }
    if CODE_FRAGMENT.is_match(title) {
        return Err(ValidationRejection::CodeFragment);
    }
    if is_date_only(title) {
        return Err(ValidationRejection::DateOnly);
    }
    Ok(())
}

/// True for titles like "December 19, 2024" or "Fri 12/19" that carry no
/// descriptive text: every token is a month, weekday, number or am/pm.
fn is_date_only(title: &str) -> bool {
    let tokens: Vec<&str> = title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        return false;
    }

    let mut numeric = 0;
    let mut calendar_words = 0;
    for token in &tokens {
        if is_numeric_token(token) {
            numeric += 1;
        } else if month_index(token).is_some() || is_weekday(token) {
            calendar_words += 1;
        } else if !matches!(token.to_lowercase().as_str(), "am" | "pm") {
            return false;
        }
    }

    (numeric >= 1 && calendar_words >= 1) || numeric >= 2
}

/// "19", "2024", "19th", "1st"
fn is_numeric_token(token: &str) -> bool {
    let lower = token.to_lowercase();
    let digits = ["st", "nd", "rd", "th"]
        .iter()
        .find_map(|suffix| lower.strip_suffix(suffix))
        .unwrap_or(&lower);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}
