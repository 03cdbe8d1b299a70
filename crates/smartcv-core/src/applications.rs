use chrono::{DateTime, Utc};
use libsql::{Row, params};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{Database, DbError};

const APPLICATION_COLUMNS: &str = "id, job_listing_id, phone_number, applicant_name, applicant_email, cv_path, status, rejection_reason, created_at, submitted_at, email_sent_at, email_error, match_score, cv_snapshot, cover_letter";

/// A row only ever exists once a CV has been validated and the application
/// considered placed; `EmailSent` / `EmailFailed` record the separate, later
/// outcome of the recruiter email delivery attempt for that row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationStatus {
    Submitted,
    EmailSent,
    EmailFailed,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::EmailSent => "email_sent",
            ApplicationStatus::EmailFailed => "email_failed",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "submitted" => Some(ApplicationStatus::Submitted),
            "email_sent" => Some(ApplicationStatus::EmailSent),
            "email_failed" => Some(ApplicationStatus::EmailFailed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    pub id: String,
    pub job_listing_id: String,
    pub phone_number: String,
    pub applicant_name: Option<String>,
    pub applicant_email: Option<String>,
    pub cv_path: Option<String>,
    pub status: ApplicationStatus,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub email_sent_at: Option<DateTime<Utc>>,
    pub email_error: Option<String>,
    pub match_score: Option<i64>,
    pub cv_snapshot: Option<String>,
    pub cover_letter: Option<String>,
}

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("sql error: {0}")]
    Sql(#[from] libsql::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
    #[error("invalid status value {0}")]
    InvalidStatus(String),
    #[error("application not found: {0}")]
    NotFound(String),
    #[error("duplicate application for job {job_listing_id} by {phone_number}")]
    Duplicate {
        job_listing_id: String,
        phone_number: String,
    },
}

#[derive(Clone)]
pub struct ApplicationRepository {
    db: Database,
}

impl ApplicationRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts an application row already in its final `submitted` shape —
    /// there is no intermediate "pending" row, since a row must never exist
    /// for a CV that failed identity validation. Rejects a second application
    /// from the same phone number for the same listing.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_submitted(
        &self,
        job_listing_id: &str,
        phone_number: &str,
        applicant_name: Option<&str>,
        applicant_email: Option<&str>,
        cv_path: &str,
        match_score: i64,
        cv_snapshot: &str,
        cover_letter: &str,
    ) -> Result<Application, ApplicationError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let mut conn = self.db.connection().await?;

        let result = conn
            .query(
                &format!(
                    "INSERT INTO applications (id, job_listing_id, phone_number, applicant_name, applicant_email, cv_path, status, rejection_reason, created_at, submitted_at, email_sent_at, email_error, match_score, cv_snapshot, cover_letter)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, ?8, NULL, NULL, ?9, ?10, ?11)
                     RETURNING {APPLICATION_COLUMNS}"
                ),
                params![
                    id,
                    job_listing_id,
                    phone_number,
                    applicant_name,
                    applicant_email,
                    cv_path,
                    ApplicationStatus::Submitted.as_str(),
                    now,
                    match_score,
                    cv_snapshot,
                    cover_letter
                ],
            )
            .await;

        match result {
            Ok(mut rows) => {
                let row = rows
                    .next()
                    .await?
                    .ok_or_else(|| ApplicationError::NotFound("insert failed".into()))?;
                row_to_application(row)
            }
            Err(err) if is_unique_violation(&err) => Err(ApplicationError::Duplicate {
                job_listing_id: job_listing_id.to_string(),
                phone_number: phone_number.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    /// True if `phone_number` already has any row (in any status) for
    /// `job_listing_id`, used to skip re-applying without inserting a
    /// placeholder row first.
    pub async fn has_applied(
        &self,
        job_listing_id: &str,
        phone_number: &str,
    ) -> Result<bool, ApplicationError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM applications WHERE job_listing_id = ?1 AND phone_number = ?2",
                params![job_listing_id, phone_number],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| ApplicationError::NotFound(job_listing_id.to_string()))?;
        let count: i64 = row.get(0)?;
        Ok(count > 0)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Application, ApplicationError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = ?1"),
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => row_to_application(row),
            None => Err(ApplicationError::NotFound(id.to_string())),
        }
    }

    /// Attaches the CV, the scored/synthesized content, and marks a pending row
    /// `submitted`. `match_score` is expected pre-clamped to `[50, 95]`.
    #[allow(clippy::too_many_arguments)]
    pub async fn mark_submitted(
        &self,
        id: &str,
        applicant_name: Option<&str>,
        applicant_email: Option<&str>,
        cv_path: &str,
        match_score: i64,
        cv_snapshot: &str,
        cover_letter: &str,
    ) -> Result<Application, ApplicationError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "UPDATE applications
                     SET status = ?2, applicant_name = ?3, applicant_email = ?4, cv_path = ?5, submitted_at = ?6,
                         match_score = ?7, cv_snapshot = ?8, cover_letter = ?9
                     WHERE id = ?1
                     RETURNING {APPLICATION_COLUMNS}"
                ),
                params![
                    id,
                    ApplicationStatus::Submitted.as_str(),
                    applicant_name,
                    applicant_email,
                    cv_path,
                    now,
                    match_score,
                    cv_snapshot,
                    cover_letter
                ],
            )
            .await?;

        match rows.next().await? {
            Some(row) => row_to_application(row),
            None => Err(ApplicationError::NotFound(id.to_string())),
        }
    }

    /// Records a successful recruiter email delivery for an already-submitted row.
    pub async fn mark_email_sent(&self, id: &str) -> Result<Application, ApplicationError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "UPDATE applications
                     SET status = ?2, email_sent_at = ?3, email_error = NULL
                     WHERE id = ?1
                     RETURNING {APPLICATION_COLUMNS}"
                ),
                params![id, ApplicationStatus::EmailSent.as_str(), now],
            )
            .await?;

        match rows.next().await? {
            Some(row) => row_to_application(row),
            None => Err(ApplicationError::NotFound(id.to_string())),
        }
    }

    /// Records a failed recruiter email delivery attempt. Does not retry; the
    /// row stays `email_failed` for operator follow-up.
    pub async fn mark_email_failed(
        &self,
        id: &str,
        error_message: &str,
    ) -> Result<Application, ApplicationError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "UPDATE applications
                     SET status = ?2, email_error = ?3
                     WHERE id = ?1
                     RETURNING {APPLICATION_COLUMNS}"
                ),
                params![id, ApplicationStatus::EmailFailed.as_str(), error_message],
            )
            .await?;

        match rows.next().await? {
            Some(row) => row_to_application(row),
            None => Err(ApplicationError::NotFound(id.to_string())),
        }
    }

    pub async fn count_submitted_for_phone(
        &self,
        phone_number: &str,
    ) -> Result<i64, ApplicationError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM applications WHERE phone_number = ?1 AND status IN ('submitted', 'email_sent', 'email_failed')",
                params![phone_number],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| ApplicationError::NotFound(phone_number.to_string()))?;
        Ok(row.get(0)?)
    }
}

fn row_to_application(row: Row) -> Result<Application, ApplicationError> {
    let id: String = row.get(0)?;
    let job_listing_id: String = row.get(1)?;
    let phone_number: String = row.get(2)?;
    let applicant_name: Option<String> = row.get(3)?;
    let applicant_email: Option<String> = row.get(4)?;
    let cv_path: Option<String> = row.get(5)?;
    let status_str: String = row.get(6)?;
    let rejection_reason: Option<String> = row.get(7)?;
    let created_at: String = row.get(8)?;
    let submitted_at: Option<String> = row.get(9)?;
    let email_sent_at: Option<String> = row.get(10)?;
    let email_error: Option<String> = row.get(11)?;
    let match_score: Option<i64> = row.get(12)?;
    let cv_snapshot: Option<String> = row.get(13)?;
    let cover_letter: Option<String> = row.get(14)?;

    let status = ApplicationStatus::from_str(&status_str)
        .ok_or_else(|| ApplicationError::InvalidStatus(status_str))?;

    Ok(Application {
        id,
        job_listing_id,
        phone_number,
        applicant_name,
        applicant_email,
        cv_path,
        status,
        rejection_reason,
        created_at: DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc),
        submitted_at: submitted_at
            .map(|value| DateTime::parse_from_rfc3339(&value).map(|dt| dt.with_timezone(&Utc)))
            .transpose()?,
        email_sent_at: email_sent_at
            .map(|value| DateTime::parse_from_rfc3339(&value).map(|dt| dt.with_timezone(&Utc)))
            .transpose()?,
        email_error,
        match_score,
        cv_snapshot,
        cover_letter,
    })
}

fn is_unique_violation(err: &libsql::Error) -> bool {
    err.to_string()
        .to_ascii_lowercase()
        .contains("unique constraint failed")
}
