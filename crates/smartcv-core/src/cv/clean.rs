/// Minimum length of cleaned CV text before it's treated as unusably short
/// (e.g. a scanned-image PDF that extracted to near-nothing).
pub const MIN_CLEANED_TEXT_LEN: usize = 40;

/// Collapses whitespace runs and strips non-printable control characters left
/// behind by PDF/DOCX extraction (form feeds, soft hyphens, stray NULs).
pub fn clean_text(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    let mut last_was_space = false;

    for ch in raw.chars() {
        let normalized = if ch.is_control() && ch != '\n' {
            ' '
        } else {
            ch
        };

        if normalized.is_whitespace() {
            if !last_was_space {
                cleaned.push(' ');
            }
            last_was_space = true;
        } else {
            cleaned.push(normalized);
            last_was_space = false;
        }
    }

    cleaned.trim().to_string()
}

pub fn is_too_short(cleaned: &str) -> bool {
    cleaned.len() < MIN_CLEANED_TEXT_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(clean_text("Jane   Doe\n\n\tSoftware  Engineer"), "Jane Doe Software Engineer");
    }

    #[test]
    fn strips_control_characters() {
        let raw = "Jane\u{0000}Doe\u{000C}Engineer";
        assert_eq!(clean_text(raw), "Jane Doe Engineer");
    }

    #[test]
    fn flags_text_below_minimum_length() {
        assert!(is_too_short("too short"));
        assert!(!is_too_short(&"a".repeat(MIN_CLEANED_TEXT_LEN)));
    }
}
