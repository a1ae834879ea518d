//! Comparison forms for profile field values
//!
//! Normalized values are only used for grouping; stored values keep the
//! original text of the winning source.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::types::ProfileField;

static US_STATES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("alabama", "al"), ("alaska", "ak"), ("arizona", "az"), ("arkansas", "ar"),
        ("california", "ca"), ("colorado", "co"), ("connecticut", "ct"), ("delaware", "de"),
        ("district of columbia", "dc"), ("florida", "fl"), ("georgia", "ga"), ("hawaii", "hi"),
        ("idaho", "id"), ("illinois", "il"), ("indiana", "in"), ("iowa", "ia"),
        ("kansas", "ks"), ("kentucky", "ky"), ("louisiana", "la"), ("maine", "me"),
        ("maryland", "md"), ("massachusetts", "ma"), ("michigan", "mi"), ("minnesota", "mn"),
        ("mississippi", "ms"), ("missouri", "mo"), ("montana", "mt"), ("nebraska", "ne"),
        ("nevada", "nv"), ("new hampshire", "nh"), ("new jersey", "nj"), ("new mexico", "nm"),
        ("new york", "ny"), ("north carolina", "nc"), ("north dakota", "nd"), ("ohio", "oh"),
        ("oklahoma", "ok"), ("oregon", "or"), ("pennsylvania", "pa"), ("rhode island", "ri"),
        ("south carolina", "sc"), ("south dakota", "sd"), ("tennessee", "tn"), ("texas", "tx"),
        ("utah", "ut"), ("vermont", "vt"), ("virginia", "va"), ("washington", "wa"),
        ("west virginia", "wv"), ("wisconsin", "wi"), ("wyoming", "wy"),
    ]
    .into_iter()
    .collect()
});

const COUNTRY_SUFFIXES: &[&str] = &["usa", "us", "united states", "united states of america"];

const COMPANY_SUFFIXES: &[&str] = &["inc", "llc", "ltd", "corp", "corporation", "gmbh", "co"];

/// Normalized comparison form of `value` for `field`
pub fn normalize_field(field: ProfileField, value: &str) -> String {
    match field {
        ProfileField::Email => value.trim().to_lowercase(),
        ProfileField::Website => normalize_website(value),
        ProfileField::Location => normalize_location(value),
        ProfileField::Company => normalize_company(value),
        ProfileField::Name => normalize_text(value),
    }
}

/// Lowercase, punctuation to spaces, whitespace collapsed
pub fn normalize_text(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_location(value: &str) -> String {
    let mut parts: Vec<String> = value
        .split(',')
        .map(normalize_text)
        .filter(|p| !p.is_empty())
        .map(|p| US_STATES.get(p.as_str()).map(|s| s.to_string()).unwrap_or(p))
        .collect();

    if parts.len() > 1 {
        if let Some(last) = parts.last() {
            if COUNTRY_SUFFIXES.contains(&last.as_str()) {
                parts.pop();
            }
        }
    }
    parts.join(", ")
}

fn normalize_company(value: &str) -> String {
    let text = normalize_text(value.trim_start_matches('@'));
    let mut words: Vec<&str> = text.split(' ').collect();
    while words.len() > 1 && words.last().map_or(false, |w| COMPANY_SUFFIXES.contains(w)) {
        words.pop();
    }
    words.join(" ")
}

fn normalize_website(value: &str) -> String {
    let lowered = value.trim().to_lowercase();
    let without_scheme = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(&lowered);
    without_scheme
        .strip_prefix("www.")
        .unwrap_or(without_scheme)
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_state_names_match_codes() {
        assert_eq!(
            normalize_field(ProfileField::Location, "Austin, TX"),
            normalize_field(ProfileField::Location, "Austin,  Texas")
        );
        assert_eq!(
            normalize_field(ProfileField::Location, "Austin, Texas, USA"),
            "austin, tx"
        );
        assert_ne!(
            normalize_field(ProfileField::Location, "Dallas, TX"),
            normalize_field(ProfileField::Location, "Austin, TX")
        );
    }

    #[test]
    fn test_name_case_and_punctuation() {
        assert_eq!(
            normalize_field(ProfileField::Name, "  Ada   LOVELACE. "),
            normalize_field(ProfileField::Name, "ada lovelace")
        );
    }

    #[test]
    fn test_company_suffixes() {
        assert_eq!(normalize_field(ProfileField::Company, "Acme, Inc."), "acme");
        assert_eq!(normalize_field(ProfileField::Company, "@acme"), "acme");
        assert_eq!(normalize_field(ProfileField::Company, "Co"), "co");
    }

    #[test]
    fn test_website_scheme_and_slash() {
        assert_eq!(
            normalize_field(ProfileField::Website, "https://www.Ada.dev/"),
            normalize_field(ProfileField::Website, "ada.dev")
        );
    }
}
