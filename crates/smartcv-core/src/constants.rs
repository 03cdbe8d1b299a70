/// Closed set of job categories the intent resolver and recruiter-form validator
/// both recognize. Order matches the "other_general" catch-all convention.
pub const JOB_CATEGORIES: &[&str] = &[
    "it_software",
    "engineering_technical",
    "accounting_finance",
    "sales_marketing",
    "customer_service",
    "administration",
    "human_resources",
    "healthcare",
    "education",
    "legal",
    "logistics_supply_chain",
    "manufacturing_production",
    "construction_real_estate",
    "hospitality_tourism",
    "media_creative",
    "agriculture",
    "security",
    "government_ngo",
    "other_general",
];

/// The 36 Nigerian states plus the Federal Capital Territory and a synthetic
/// "Remote" location, as a closed whitelist for the recruiter-posting form.
pub const NIGERIAN_STATES: &[&str] = &[
    "Abia",
    "Adamawa",
    "Akwa Ibom",
    "Anambra",
    "Bauchi",
    "Bayelsa",
    "Benue",
    "Borno",
    "Cross River",
    "Delta",
    "Ebonyi",
    "Edo",
    "Ekiti",
    "Enugu",
    "Gombe",
    "Imo",
    "Jigawa",
    "Kaduna",
    "Kano",
    "Katsina",
    "Kebbi",
    "Kogi",
    "Kwara",
    "Lagos",
    "Nasarawa",
    "Niger",
    "Ogun",
    "Ondo",
    "Osun",
    "Oyo",
    "Plateau",
    "Rivers",
    "Sokoto",
    "Taraba",
    "Yobe",
    "Zamfara",
    "FCT",
    "Remote",
];

/// Recruiter email domains that can never belong to a real applicant; any CV whose
/// extracted email resolves to one of these is treated as a non-match and discarded.
pub const REJECTED_EMAIL_DOMAINS: &[&str] = &[
    "example.com",
    "test.com",
    "domain.com",
    "email.com",
    "smartcvnaija.com",
    "sample.com",
    "dummy.com",
];

pub const MIN_CV_BYTES: usize = 100;
pub const MAX_CV_BYTES: usize = 5 * 1024 * 1024;
