use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::sync::LazyLock;
use tracing::warn;

use crate::ai::{ChatCompleter, ChatMessage, CompletionRequest};
use crate::applications::Application;
use crate::cv::{self, ExtractedIdentity};
use crate::job_listings::JobListing;
use crate::jobs::cv_processing::CvMetadata;
use crate::jobs::{JobDispatcher, map_cv_error, map_kv_error};
use crate::mailer::{MailerError, OutboundEmail};
use crate::worker::JobError;
use crate::{Job, JobContext};

const COVER_LETTER_TIMEOUT: Duration = Duration::from_secs(90);
const COVER_LETTER_MAX_TOKENS: u32 = 1500;
const COVER_LETTER_TEMPERATURE: f32 = 0.7;
const RECRUITER_BATCH_SIZE: usize = 3;
const RECRUITER_BATCH_PAUSE: Duration = Duration::from_millis(1500);
const CLEANUP_DELAY: Duration = Duration::from_secs(600);

#[derive(Debug, Deserialize)]
struct SubmitApplicationPayload {
    phone_number: String,
    job_listing_ids: Vec<String>,
}

pub async fn handle_submit_application(
    dispatcher: &JobDispatcher,
    job: Job,
    ctx: JobContext,
) -> Result<(), JobError> {
    let started = Instant::now();
    let payload: SubmitApplicationPayload = serde_json::from_value(job.payload.clone())
        .map_err(|err| JobError::Fatal(format!("invalid submit_application payload: {err}")))?;

    let applications = dispatcher.applications();
    let listings = dispatcher.job_listings();

    let verify_step = ctx
        .start_step("verify_binary")
        .await
        .map_err(|err| JobError::Fatal(err.to_string()))?;
    let metadata: CvMetadata = dispatcher
        .kv
        .get_json(&format!("cv:{}", payload.phone_number))
        .await
        .map_err(|err| map_kv_error("load cv metadata", err))?
        .ok_or_else(|| JobError::Fatal("cv metadata missing or expired".into()))?;
    let binary_exists = Path::new(&metadata.binary_path).exists();
    let _ = ctx
        .finish_step(&verify_step, Some(json!({"exists": binary_exists})))
        .await;
    if !binary_exists {
        // No application row has been inserted for any of these listings yet;
        // terminating here without inserting anything is the correct outcome.
        dispatcher.throughput.record_failure();
        return Err(JobError::Fatal("cv binary missing from disk".into()));
    }

    let identity_step = ctx
        .start_step("extract_and_validate_identity")
        .await
        .map_err(|err| JobError::Fatal(err.to_string()))?;
    let original_filename = Path::new(&metadata.binary_path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cv.pdf".to_string());
    let cleaned = match cv::process_cv(Path::new(&metadata.binary_path), &original_filename) {
        Ok(text) => text,
        Err(err) => {
            let _ = ctx
                .finish_step(&identity_step, Some(json!({"validated": false})))
                .await;
            dispatcher.throughput.record_failure();
            return Err(map_cv_error("submit_application re-extract", err));
        }
    };
    let identity = cv::extract_identity(&cleaned);
    let validated = identity.is_validated();
    let _ = ctx
        .finish_step(&identity_step, Some(json!({"validated": validated})))
        .await;
    if !validated {
        dispatcher.throughput.record_failure();
        return Err(JobError::Fatal("CV_VALIDATION_FAILED".into()));
    }

    let mut listing_rows = Vec::with_capacity(payload.job_listing_ids.len());
    for job_listing_id in &payload.job_listing_ids {
        let listing = listings
            .get_by_id(job_listing_id)
            .await
            .map_err(|err| JobError::Fatal(format!("load job listing {job_listing_id}: {err}")))?;
        listing_rows.push(listing);
    }

    let letters_step = ctx
        .start_step("synthesize_cover_letters")
        .await
        .map_err(|err| JobError::Fatal(err.to_string()))?;
    let mut letters = HashMap::with_capacity(listing_rows.len());
    for listing in &listing_rows {
        let letter = synthesize_cover_letter(dispatcher, &cleaned, &identity, listing).await;
        letters.insert(listing.id.clone(), letter);
    }
    let _ = ctx
        .finish_step(&letters_step, Some(json!({"count": letters.len()})))
        .await;

    // Identity validation has already succeeded above, so every row inserted
    // here is a genuine submission; duplicates (a race with another job for
    // the same phone/listing) are skipped rather than treated as fatal.
    let score_step = ctx
        .start_step("score_and_submit")
        .await
        .map_err(|err| JobError::Fatal(err.to_string()))?;
    let mut jobs = Vec::with_capacity(listing_rows.len());
    for listing in listing_rows {
        let score = score_job_match(dispatcher, &cleaned, &listing).await;
        let cover_letter = letters.get(&listing.id).cloned().unwrap_or_default();
        match applications
            .create_submitted(
                &listing.id,
                &payload.phone_number,
                identity.name.as_deref(),
                identity.email.as_deref(),
                &metadata.binary_path,
                score,
                &cleaned,
                &cover_letter,
            )
            .await
        {
            Ok(application) => jobs.push((application, listing)),
            Err(crate::applications::ApplicationError::Duplicate { .. }) => {
                warn!(job_listing_id = %listing.id, "already applied to this listing, skipping");
            }
            Err(err) => return Err(JobError::Fatal(format!("create submitted application: {err}"))),
        }
    }
    let _ = ctx
        .finish_step(&score_step, Some(json!({"count": jobs.len()})))
        .await;

    let email_step = ctx
        .start_step("send_recruiter_emails")
        .await
        .map_err(|err| JobError::Fatal(err.to_string()))?;
    let mut outcomes: HashMap<String, bool> = HashMap::with_capacity(jobs.len());
    let mut batches = jobs.chunks(RECRUITER_BATCH_SIZE).peekable();
    while let Some(batch) = batches.next() {
        let sends = batch.iter().map(|(application, listing)| {
            let cover_letter = letters.get(&listing.id).cloned().unwrap_or_default();
            send_recruiter_email(dispatcher, application, listing, &identity, &metadata.binary_path, cover_letter)
        });
        let results = futures::future::join_all(sends).await;
        for ((application, _listing), result) in batch.iter().zip(results) {
            match result {
                Ok(()) => {
                    outcomes.insert(application.id.clone(), true);
                    if let Err(err) = applications.mark_email_sent(&application.id).await {
                        warn!(application_id = %application.id, error = %err, "failed to persist email_sent status");
                    }
                }
                Err(err) => {
                    outcomes.insert(application.id.clone(), false);
                    if let Err(persist_err) = applications.mark_email_failed(&application.id, &err.to_string()).await {
                        warn!(application_id = %application.id, error = %persist_err, "failed to persist email_failed status");
                    }
                }
            }
        }
        if batches.peek().is_some() {
            tokio::time::sleep(RECRUITER_BATCH_PAUSE).await;
        }
    }
    let sent_count = outcomes.values().filter(|sent| **sent).count();
    let _ = ctx
        .finish_step(&email_step, Some(json!({"sent": sent_count, "total": outcomes.len()})))
        .await;

    let confirmation_step = ctx
        .start_step("send_confirmation")
        .await
        .map_err(|err| JobError::Fatal(err.to_string()))?;
    send_confirmation_email(dispatcher, &identity, &jobs, &outcomes).await;
    let _ = ctx.finish_step(&confirmation_step, None).await;

    let cleanup_step = ctx
        .start_step("schedule_cleanup")
        .await
        .map_err(|err| JobError::Fatal(err.to_string()))?;
    schedule_cleanup(dispatcher.clone(), metadata.binary_path.clone());
    dispatcher.throughput.record_success(started.elapsed());
    dispatcher.memory_governor.log_if_elevated();
    let _ = ctx.finish_step(&cleanup_step, None).await;

    Ok(())
}

async fn synthesize_cover_letter(
    dispatcher: &JobDispatcher,
    cv_text: &str,
    identity: &ExtractedIdentity,
    listing: &JobListing,
) -> String {
    let request = CompletionRequest {
        messages: vec![
            ChatMessage::system(
                "You write concise, warm cover letters for Nigerian job applicants based on their CV. \
                 Keep it under 200 words and do not invent qualifications not present in the CV summary.",
            ),
            ChatMessage::user(format!(
                "Applicant name: {}\nJob title: {}\nJob description: {}\nCV summary:\n{}",
                identity.name.as_deref().unwrap_or("the applicant"),
                listing.title,
                truncate(&listing.description, 800),
                truncate(cv_text, 2000),
            )),
        ],
        temperature: COVER_LETTER_TEMPERATURE,
        max_tokens: COVER_LETTER_MAX_TOKENS,
        json_mode: false,
    };

    match tokio::time::timeout(COVER_LETTER_TIMEOUT, dispatcher.ai.complete(&request)).await {
        Ok(Ok(response)) if !response.content.trim().is_empty() => response.content,
        Ok(Ok(_)) => {
            warn!(job_listing_id = %listing.id, "cover letter provider returned empty content, using fallback");
            deterministic_cover_letter(identity, cv_text, listing)
        }
        Ok(Err(err)) => {
            warn!(job_listing_id = %listing.id, error = %err, "cover letter synthesis failed, using fallback");
            deterministic_cover_letter(identity, cv_text, listing)
        }
        Err(_) => {
            warn!(job_listing_id = %listing.id, "cover letter synthesis timed out, using fallback");
            deterministic_cover_letter(identity, cv_text, listing)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    job_match_score: i64,
}

async fn score_job_match(dispatcher: &JobDispatcher, cv_text: &str, listing: &JobListing) -> i64 {
    let request = CompletionRequest {
        messages: vec![
            ChatMessage::system(
                "You are an ATS scoring assistant. Given a CV summary and a job description, reply with \
                 strict JSON {\"job_match_score\": <integer 0-100>} and nothing else.",
            ),
            ChatMessage::user(format!(
                "Job title: {}\nJob description: {}\nCV summary:\n{}",
                listing.title,
                truncate(&listing.description, 800),
                truncate(cv_text, 2000),
            )),
        ],
        temperature: 0.2,
        max_tokens: 60,
        json_mode: true,
    };

    let score = match dispatcher.ai.complete(&request).await {
        Ok(response) => serde_json::from_str::<ScoreResponse>(&response.content)
            .map(|parsed| parsed.job_match_score)
            .ok(),
        Err(err) => {
            warn!(job_listing_id = %listing.id, error = %err, "scoring provider failed, using fallback");
            None
        }
    };

    score.unwrap_or_else(|| deterministic_match_score(cv_text, listing)).clamp(50, 95)
}

async fn send_recruiter_email(
    dispatcher: &JobDispatcher,
    application: &Application,
    listing: &JobListing,
    identity: &ExtractedIdentity,
    binary_path: &str,
    cover_letter: String,
) -> Result<(), MailerError> {
    let Some(to) = listing.contact_email.as_deref() else {
        return Err(MailerError::InvalidAddress(
            "recruiter has no contact email on file".into(),
        ));
    };
    let filename = Path::new(binary_path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cv.pdf".to_string());
    let subject = format!("New application for {}", listing.title);

    dispatcher
        .recruiter_mailer
        .send(OutboundEmail {
            to,
            reply_to: identity.email.as_deref(),
            subject: &subject,
            body: &cover_letter,
            attachment_path: Some(Path::new(binary_path)),
            attachment_filename: Some(&filename),
        })
        .await
        .map_err(|err| {
            warn!(application_id = %application.id, error = %err, "recruiter email send failed");
            err
        })
}

async fn send_confirmation_email(
    dispatcher: &JobDispatcher,
    identity: &ExtractedIdentity,
    jobs: &[(Application, JobListing)],
    outcomes: &HashMap<String, bool>,
) {
    let Some(to) = identity.email.as_deref() else {
        return;
    };

    let lines: Vec<String> = jobs
        .iter()
        .map(|(application, listing)| {
            let sent = outcomes.get(&application.id).copied().unwrap_or(false);
            format!("- {} ({}): {}", listing.title, listing.state, if sent { "sent" } else { "failed" })
        })
        .collect();
    let body = format!(
        "Your application was processed for {} role(s):\n\n{}\n\nThank you for using SmartCV.",
        jobs.len(),
        lines.join("\n")
    );

    if let Err(err) = dispatcher
        .confirmation_mailer
        .send(OutboundEmail {
            to,
            reply_to: None,
            subject: "Your job applications have been submitted",
            body: &body,
            attachment_path: None,
            attachment_filename: None,
        })
        .await
    {
        warn!(error = %err, "failed to send applicant confirmation email");
    }
}

fn schedule_cleanup(dispatcher: JobDispatcher, binary_path: String) {
    tokio::spawn(async move {
        tokio::time::sleep(CLEANUP_DELAY).await;
        if let Err(err) = tokio::fs::remove_file(&binary_path).await {
            warn!(path = %binary_path, error = %err, "failed to clean up cv binary");
        }
        dispatcher.throughput.log_summary("submit_application", 8);
    });
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

static YEARS_EXPERIENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*\+?\s*years?\s*(of\s*)?experience").unwrap());
static CERTIFICATION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)certifi(ed|cation|cate)").unwrap());

fn years_of_experience(cv_text: &str) -> Option<u32> {
    YEARS_EXPERIENCE
        .captures(cv_text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

enum ExperienceBucket {
    Extensive,
    Solid,
    Foundational,
}

impl ExperienceBucket {
    fn phrase(&self) -> &'static str {
        match self {
            ExperienceBucket::Extensive => "extensive",
            ExperienceBucket::Solid => "solid",
            ExperienceBucket::Foundational => "foundational",
        }
    }
}

fn experience_bucket(cv_text: &str) -> ExperienceBucket {
    match years_of_experience(cv_text) {
        Some(years) if years >= 7 => ExperienceBucket::Extensive,
        Some(years) if years >= 3 => ExperienceBucket::Solid,
        _ => ExperienceBucket::Foundational,
    }
}

fn education_clause(cv_text: &str) -> String {
    let lowered = cv_text.to_ascii_lowercase();
    if lowered.contains("master") || lowered.contains("msc") {
        ", backed by a Master's degree".to_string()
    } else if lowered.contains("bachelor") || lowered.contains("bsc") {
        ", backed by a Bachelor's degree".to_string()
    } else if lowered.contains("diploma") || lowered.contains("hnd") {
        ", backed by a diploma qualification".to_string()
    } else {
        String::new()
    }
}

fn skills_phrase_for_category(category: &str) -> &'static str {
    match category {
        "it_software" => "software engineering and systems design",
        "engineering_technical" => "technical engineering and problem solving",
        "accounting_finance" => "financial analysis and accounting",
        "sales_marketing" => "sales strategy and marketing",
        "customer_service" => "customer service and relationship management",
        "administration" => "office administration and coordination",
        "human_resources" => "human resources and talent management",
        "healthcare" => "clinical care and patient support",
        "education" => "teaching and curriculum delivery",
        "legal" => "legal research and compliance",
        "logistics_supply_chain" => "logistics and supply chain coordination",
        "manufacturing_production" => "manufacturing operations and production",
        "construction_real_estate" => "construction project delivery",
        "hospitality_tourism" => "hospitality and guest services",
        "media_creative" => "creative media production",
        "agriculture" => "agricultural operations",
        "security" => "security operations",
        "government_ngo" => "public sector and community programs",
        _ => "professional skills relevant to the role",
    }
}

fn deterministic_cover_letter(identity: &ExtractedIdentity, cv_text: &str, listing: &JobListing) -> String {
    let name = identity.name.as_deref().unwrap_or("the applicant");
    let bucket = experience_bucket(cv_text);
    let education = education_clause(cv_text);
    let skills = skills_phrase_for_category(&listing.category);

    format!(
        "Dear Hiring Team,\n\n\
         My name is {name} and I am applying for the {title} role. I bring {bucket} experience in \
         {skills}{education}, and I am confident I can contribute to your team.\n\n\
         Please find my CV attached for your review.\n\n\
         Regards,\n{name}",
        title = listing.title,
        bucket = bucket.phrase(),
    )
}

fn deterministic_match_score(cv_text: &str, listing: &JobListing) -> i64 {
    let mut score: i64 = 60;

    let lowered = cv_text.to_ascii_lowercase();
    let keyword_hits = skills_phrase_for_category(&listing.category)
        .split_whitespace()
        .filter(|word| word.len() > 3 && lowered.contains(&word.to_ascii_lowercase()))
        .count();
    if keyword_hits > 0 {
        score += 10;
    }

    score += match years_of_experience(cv_text) {
        Some(years) if years >= 7 => 15,
        Some(years) if years >= 3 => 10,
        Some(_) => 5,
        None => 0,
    };

    if !education_clause(cv_text).is_empty() {
        score += 5;
    }
    if cv_text.chars().count() > 1500 {
        score += 5;
    }
    if CERTIFICATION_MARKER.is_match(cv_text) {
        score += 5;
    }

    score.clamp(50, 95)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(category: &str) -> JobListing {
        JobListing {
            id: "job-1".into(),
            recruiter_phone: "+2348000000001".into(),
            title: "Backend Engineer".into(),
            category: category.into(),
            state: "Lagos".into(),
            description: "Build and operate backend services.".into(),
            contact_email: Some("recruiter@example.com".into()),
            is_active: true,
            created_at: chrono::Utc::now(),
            expires_at: chrono::Utc::now() + chrono::Duration::days(30),
        }
    }

    #[test]
    fn years_of_experience_parses_common_phrasings() {
        assert_eq!(years_of_experience("I have 7 years of experience in backend systems"), Some(7));
        assert_eq!(years_of_experience("5+ years experience"), Some(5));
        assert_eq!(years_of_experience("no mention here"), None);
    }

    #[test]
    fn deterministic_score_rewards_experience_and_certification() {
        let junior = "Recent graduate with no professional experience yet.";
        let senior = "Certified engineer with 9 years of experience in software engineering, holds a Master's degree.";
        let junior_score = deterministic_match_score(junior, &listing("it_software"));
        let senior_score = deterministic_match_score(senior, &listing("it_software"));
        assert!(senior_score > junior_score);
        assert!((50..=95).contains(&junior_score));
        assert!((50..=95).contains(&senior_score));
    }

    #[test]
    fn deterministic_cover_letter_includes_name_and_title() {
        let identity = ExtractedIdentity {
            name: Some("Jane Doe".into()),
            email: Some("jane@gmail.com".into()),
            phone: None,
        };
        let letter = deterministic_cover_letter(&identity, "5 years of experience", &listing("it_software"));
        assert!(letter.contains("Jane Doe"));
        assert!(letter.contains("Backend Engineer"));
    }

    #[test]
    fn truncate_respects_char_count_not_byte_count() {
        let text = "a".repeat(10);
        assert_eq!(truncate(&text, 5).chars().count(), 5);
        assert_eq!(truncate(&text, 50), text);
    }
}
