use axum::Json;
use axum::extract::ConnectInfo;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use smartcv_core::{
    FailureClass, JOB_CATEGORIES, MailerError, NIGERIAN_STATES, NewJobListing, OutboundEmail,
    RateLimitedAction,
};
use std::net::SocketAddr;
use tracing::error;

use crate::state::AppState;

const MAX_TITLE_LEN: usize = 120;
const MAX_DESCRIPTION_LEN: usize = 4000;
const DEFAULT_LISTING_LIFETIME_DAYS: i64 = 30;

#[derive(Debug, Deserialize)]
pub struct RecruiterPostingForm {
    pub recruiter_phone: String,
    pub title: String,
    pub category: String,
    pub state: String,
    pub description: String,
    pub contact_email: Option<String>,
    pub deadline: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct RecruiterPostingResponse {
    pub id: String,
    pub expires_at: String,
}

#[derive(Debug, Serialize)]
pub struct RecruiterPostingError {
    pub error: String,
}

/// `POST /api/recruiter/post-job` (spec.md §4.10). Validates against the closed
/// state/category whitelists, rate-limits 5 postings/hour per client IP, and
/// notifies the operator mailbox on every accepted posting.
pub async fn handle(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(form): Json<RecruiterPostingForm>,
) -> (StatusCode, Json<serde_json::Value>) {
    let client_ip = addr.ip().to_string();
    let decision = state
        .rate_limiter
        .check_limit(&client_ip, RateLimitedAction::RecruiterPosting)
        .await;
    if !decision.allowed {
        return error_response(
            StatusCode::TOO_MANY_REQUESTS,
            decision.message.unwrap_or_else(|| "Too many postings, try again later.".into()),
        );
    }

    let listing = match validate(&form) {
        Ok(listing) => listing,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    let created = match state.job_listings.create(listing).await {
        Ok(created) => created,
        Err(err) => {
            error!(error = %err, "failed to insert recruiter job listing");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Could not save this posting.".into());
        }
    };

    if let Err(err) = notify_admin_of_new_posting(&state, &created.id, &form).await {
        error!(error = %err, "failed to send recruiter posting notification");
    }

    let response = RecruiterPostingResponse {
        id: created.id,
        expires_at: created.expires_at.to_rfc3339(),
    };
    (StatusCode::CREATED, Json(serde_json::json!(response)))
}

fn error_response(status: StatusCode, message: String) -> (StatusCode, Json<serde_json::Value>) {
    (status, Json(serde_json::json!(RecruiterPostingError { error: message })))
}

fn validate(form: &RecruiterPostingForm) -> Result<NewJobListing, String> {
    let phone = form.recruiter_phone.trim();
    if phone.is_empty() || phone.chars().filter(|c| c.is_ascii_digit()).count() < 10 {
        return Err("recruiter_phone must be a valid phone number".into());
    }

    let title = sanitize_free_text(&form.title, MAX_TITLE_LEN);
    if title.is_empty() {
        return Err("title is required".into());
    }

    if !JOB_CATEGORIES.contains(&form.category.as_str()) {
        return Err(format!("category must be one of: {}", JOB_CATEGORIES.join(", ")));
    }

    if !NIGERIAN_STATES.contains(&form.state.as_str()) {
        return Err(format!("state must be one of: {}", NIGERIAN_STATES.join(", ")));
    }

    let description = sanitize_free_text(&form.description, MAX_DESCRIPTION_LEN);
    if description.is_empty() {
        return Err("description is required".into());
    }

    let contact_email = form
        .contact_email
        .as_deref()
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .map(|email| sanitize_free_text(email, 254));

    let expires_in = match form.deadline {
        Some(deadline) => {
            let today = Utc::now().date_naive();
            if deadline <= today {
                return Err("deadline must be in the future".into());
            }
            deadline - today
        }
        None => ChronoDuration::days(DEFAULT_LISTING_LIFETIME_DAYS),
    };

    Ok(NewJobListing {
        recruiter_phone: phone.to_string(),
        title,
        category: form.category.clone(),
        state: form.state.clone(),
        description,
        contact_email,
        expires_in,
    })
}

/// Strips characters that could be interpreted as markup and collapses the
/// result to `max_len`, since every field here lands unescaped in an admin
/// notification and, once matched, in a WhatsApp reply to an applicant.
fn sanitize_free_text(input: &str, max_len: usize) -> String {
    let cleaned: String = input
        .chars()
        .filter(|c| *c != '<' && *c != '>' && !c.is_control())
        .collect();
    cleaned.trim().chars().take(max_len).collect()
}

async fn notify_admin_of_new_posting(
    state: &AppState,
    listing_id: &str,
    form: &RecruiterPostingForm,
) -> Result<(), MailerError> {
    let body = format!(
        "New job posting submitted via the free website form.\n\nid: {listing_id}\nrecruiter: {}\ntitle: {}\ncategory: {}\nstate: {}",
        form.recruiter_phone, form.title, form.category, form.state
    );

    let send_result = state
        .recruiter_mailer
        .send(OutboundEmail {
            to: &state.admin_email,
            reply_to: form.contact_email.as_deref(),
            subject: "New free job posting",
            body: &body,
            attachment_path: None,
            attachment_filename: None,
        })
        .await;

    if send_result.is_err() {
        let _ = state
            .admin
            .notify(FailureClass::RecruiterFormFlagged, &form.recruiter_phone, "failed to email recruiter posting notice")
            .await;
    }

    send_result
}
