use regex::Regex;
use std::sync::LazyLock;

use crate::constants::{NIGERIAN_STATES, REJECTED_EMAIL_DOMAINS};

static NAME_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z][a-z]{1,15}$").unwrap());
static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());
static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\+234\d{10}|234\d{10}|0\d{10})").unwrap());
static NIGERIAN_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z]{1,15}\s+[A-Z][a-z]{1,15}\s+[A-Z][a-z]{1,15}\b").unwrap());

/// Section headers, job titles, and other capitalized phrases that look like
/// name tokens but never are one.
const NAME_STOP_LIST: &[&str] = &[
    "Team", "Leadership", "Experience", "Education", "Summary", "Objective",
    "Skills", "Certifications", "References", "Projects", "Profile", "Contact",
    "Manager", "Engineer", "Developer", "Analyst", "Coordinator", "Director",
    "Curriculum", "Vitae", "Resume",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedIdentity {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl ExtractedIdentity {
    /// A validated applicant requires a non-empty plausible name (>=2 chars,
    /// alpha+space, not a location) AND at least one of a valid email or phone.
    pub fn is_validated(&self) -> bool {
        let plausible_name = self
            .name
            .as_deref()
            .map(|name| name.len() >= 2 && is_alpha_and_space(name) && !is_a_location(name))
            .unwrap_or(false);

        plausible_name && (self.email.is_some() || self.phone.is_some())
    }
}

pub fn extract_identity(cv_text: &str) -> ExtractedIdentity {
    let email = extract_email(cv_text);
    let phone = extract_phone(cv_text);
    let name = extract_name(cv_text, email.as_deref());

    ExtractedIdentity { name, email, phone }
}

fn extract_email(cv_text: &str) -> Option<String> {
    EMAIL_PATTERN.find_iter(cv_text).map(|m| m.as_str().to_string()).find(|candidate| {
        let domain = candidate.rsplit('@').next().unwrap_or("").to_ascii_lowercase();
        !REJECTED_EMAIL_DOMAINS.contains(&domain.as_str())
    })
}

fn extract_phone(cv_text: &str) -> Option<String> {
    PHONE_PATTERN.find(cv_text).map(|m| m.as_str().to_string())
}

fn extract_name(cv_text: &str, email: Option<&str>) -> Option<String> {
    if let Some(name) = extract_name_from_word_shaped_tokens(cv_text) {
        return Some(name);
    }

    if let Some(email) = email {
        if let Some(name) = derive_name_from_email_local_part(email) {
            return Some(name);
        }
    }

    NIGERIAN_NAME_PATTERN.find(cv_text).map(|m| m.as_str().to_string())
}

fn extract_name_from_word_shaped_tokens(cv_text: &str) -> Option<String> {
    let tokens: Vec<&str> = cv_text.split_whitespace().collect();

    for window_len in 2..=4usize.min(tokens.len()) {
        let prefix = &tokens[..window_len];
        if prefix
            .iter()
            .all(|token| NAME_TOKEN.is_match(token) && !NAME_STOP_LIST.contains(token))
        {
            return Some(prefix.join(" "));
        }
    }
    None
}

fn derive_name_from_email_local_part(email: &str) -> Option<String> {
    let local = email.split('@').next()?;
    let cleaned: String = local
        .chars()
        .map(|c| if c == '.' || c == '_' { ' ' } else { c })
        .filter(|c| c.is_alphabetic() || c.is_whitespace())
        .collect();

    let titled: String = cleaned
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    if titled.len() >= 2 { Some(titled) } else { None }
}

fn is_alpha_and_space(value: &str) -> bool {
    value.chars().all(|c| c.is_alphabetic() || c.is_whitespace())
}

fn is_a_location(value: &str) -> bool {
    NIGERIAN_STATES.iter().any(|state| state.eq_ignore_ascii_case(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_name_email_and_phone_from_a_clean_header() {
        let cv = "Jane Doe\nSoftware Engineer\nEmail: jane.doe@gmail.com Phone: +2348012345678\nExperience...";
        let identity = extract_identity(cv);
        assert_eq!(identity.name.as_deref(), Some("Jane Doe"));
        assert_eq!(identity.email.as_deref(), Some("jane.doe@gmail.com"));
        assert_eq!(identity.phone.as_deref(), Some("+2348012345678"));
        assert!(identity.is_validated());
    }

    #[test]
    fn rejects_blacklisted_email_domains() {
        let cv = "John Smith\ncontact: john@example.com";
        let identity = extract_identity(cv);
        assert_eq!(identity.email, None);
    }

    #[test]
    fn stop_listed_tokens_are_not_treated_as_names() {
        let cv = "Team Leadership Experience Summary\nBuilt things for years.";
        let identity = extract_identity(cv);
        assert_eq!(identity.name, None);
    }

    #[test]
    fn falls_back_to_email_local_part_when_no_name_tokens_found() {
        let cv = "SKILLS CERTIFICATIONS\ncontact mary.ann@yahoo.com for references";
        let identity = extract_identity(cv);
        assert_eq!(identity.name.as_deref(), Some("Mary Ann"));
    }

    #[test]
    fn local_formats_of_nigerian_phone_numbers_are_recognized() {
        assert_eq!(extract_phone("call 08012345678 anytime"), Some("08012345678".to_string()));
        assert_eq!(extract_phone("call 2348012345678 anytime"), Some("2348012345678".to_string()));
    }

    #[test]
    fn validation_requires_plausible_name_and_contact() {
        let mut identity = ExtractedIdentity {
            name: Some("Lagos".to_string()),
            email: Some("a@gmail.com".to_string()),
            phone: None,
        };
        assert!(!identity.is_validated(), "a location is not a plausible name");

        identity.name = Some("Jane Doe".to_string());
        assert!(identity.is_validated());

        identity.email = None;
        identity.phone = None;
        assert!(!identity.is_validated(), "needs at least one contact method");
    }
}
