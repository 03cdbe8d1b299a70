use smartcv_core::{clean_text, extract_identity};

/// Raw extraction output is messy: form-feed characters, collapsed margins,
/// repeated whitespace from a two-column PDF layout. Cleaning has to happen
/// before identity extraction runs, since the name/email/phone regexes all
/// assume single-spaced tokens.
#[test]
fn cleaning_a_two_column_pdf_dump_yields_a_validated_identity() {
    let raw_extract = "Jane\u{000C}   Doe\n\n\n   Frontend   Engineer\nEmail:\tjane.doe@gmail.com\u{0000}Phone: +2348012345678\n\n\nExperience\nBuilt React apps for three years.";

    let cleaned = clean_text(raw_extract);
    assert!(!cleaned.contains('\u{000C}'));
    assert!(!cleaned.contains('\u{0000}'));
    assert!(!smartcv_core::cv::is_too_short(&cleaned));

    let identity = extract_identity(&cleaned);
    assert_eq!(identity.name.as_deref(), Some("Jane Doe"));
    assert_eq!(identity.email.as_deref(), Some("jane.doe@gmail.com"));
    assert_eq!(identity.phone.as_deref(), Some("+2348012345678"));
    assert!(identity.is_validated());
}

/// A CV that extracts to a handful of words (a scanned image PDF with a
/// near-empty text layer) is rejected before identity extraction even runs,
/// since there is nothing useful left to validate.
#[test]
fn near_empty_extraction_is_flagged_too_short_before_identity_runs() {
    let raw_extract = "Jane Doe";
    let cleaned = clean_text(raw_extract);
    assert!(smartcv_core::cv::is_too_short(&cleaned));
}

/// When no header line looks like a name, the fallback derives a name from
/// the email's local part. If that derived name happens to be a state name
/// (an office inbox like `lagos@gmail.com`), it still isn't a plausible
/// applicant name, so the row never validates.
#[test]
fn a_name_derived_from_an_office_inbox_address_does_not_validate() {
    let raw_extract =
        "LAGOS STATE MINISTRY\u{000C}\n\nPLEASE CONTACT:\tlagos@gmail.com FOR ALL INQUIRIES REGARDING JOB OPENINGS";
    let cleaned = clean_text(raw_extract);
    let identity = extract_identity(&cleaned);
    assert_eq!(identity.name.as_deref(), Some("Lagos"));
    assert!(!identity.is_validated(), "a state name is not a plausible applicant name");
}
