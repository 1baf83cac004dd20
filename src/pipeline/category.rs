use once_cell::sync::Lazy;
use regex::Regex;

/// Keyword rules checked in order; the first hit wins. Keywords match whole
/// words, optionally pluralized.
const RULES: &[(&str, &[&str])] = &[
    ("Comedy", &["comedy", "stand-up", "standup", "improv", "comedian"]),
    ("Film", &["film", "cinema", "screening", "movie"]),
    ("Theatre", &["theatre", "theater", "musical", "opera", "ballet", "play reading", "broadway"]),
    ("Music", &["concert", "live music", "jazz", "symphony", "orchestra", "band", "dj", "festival of music", "choir", "recital"]),
    ("Festivals", &["festival", "fest", "parade", "carnival"]),
    ("Art & Exhibitions", &["exhibition", "exhibit", "gallery", "art show", "museum"]),
    ("Tours & Walks", &["walking tour", "tour", "walk", "cemetery"]),
    ("Food & Drink", &["food", "wine", "beer", "tasting", "brunch", "culinary", "market"]),
    ("Sports", &["hockey", "basketball", "baseball", "soccer", "football", "marathon", "race"]),
    ("Family", &["kids", "family", "children"]),
    ("Educational", &["talk", "lecture", "workshop", "class", "conversation", "seminar"]),
    ("Community", &["community", "meetup", "volunteer", "library", "newcomers"]),
];

static RULE_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    RULES
        .iter()
        .map(|(category, keywords)| {
            let alternatives = keywords.iter().map(|k| regex::escape(k)).collect::<Vec<_>>().join("|");
            let pattern = format!(r"(?i)\b(?:{})(?:s|es)?\b", alternatives);
            (*category, Regex::new(&pattern).expect("valid category regex"))
        })
        .collect()
});

/// Source-supplied category if present, else inferred from title and
/// description. No match leaves the category unknown.
pub fn resolve_category(supplied: Option<&str>, title: &str, description: Option<&str>) -> Option<String> {
    if let Some(category) = supplied.map(str::trim).filter(|c| !c.is_empty()) {
        return Some(category.to_string());
    }
    infer_category(title, description).map(str::to_string)
}

pub fn infer_category(title: &str, description: Option<&str>) -> Option<&'static str> {
    let text = format!("{} {}", title, description.unwrap_or_default());
    RULE_PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(&text))
        .map(|(category, _)| *category)
}
