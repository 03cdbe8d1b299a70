use chrono::{DateTime, Utc};
use libsql::{Row, params};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{Database, DbError};

const JOB_LISTING_COLUMNS: &str = "id, recruiter_phone, title, category, state, description, contact_email, is_active, created_at, expires_at";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobListing {
    pub id: String,
    pub recruiter_phone: String,
    pub title: String,
    pub category: String,
    pub state: String,
    pub description: String,
    pub contact_email: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewJobListing {
    pub recruiter_phone: String,
    pub title: String,
    pub category: String,
    pub state: String,
    pub description: String,
    pub contact_email: Option<String>,
    pub expires_in: chrono::Duration,
}

#[derive(Debug, Error)]
pub enum JobListingError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("sql error: {0}")]
    Sql(#[from] libsql::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
    #[error("job listing not found: {0}")]
    NotFound(String),
}

#[derive(Clone)]
pub struct JobListingRepository {
    db: Database,
}

impl JobListingRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, listing: NewJobListing) -> Result<JobListing, JobListingError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = now + listing.expires_in;
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "INSERT INTO job_listings (id, recruiter_phone, title, category, state, description, contact_email, is_active, created_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9)
                     RETURNING {JOB_LISTING_COLUMNS}"
                ),
                params![
                    id,
                    listing.recruiter_phone,
                    listing.title,
                    listing.category,
                    listing.state,
                    listing.description,
                    listing.contact_email,
                    now.to_rfc3339(),
                    expires_at.to_rfc3339()
                ],
            )
            .await?;

        let row = rows
            .next()
            .await?
            .ok_or_else(|| JobListingError::NotFound("insert failed".into()))?;
        row_to_job_listing(row)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<JobListing, JobListingError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {JOB_LISTING_COLUMNS} FROM job_listings WHERE id = ?1"),
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => row_to_job_listing(row),
            None => Err(JobListingError::NotFound(id.to_string())),
        }
    }

    /// Matches C6's resolved category/state pair against active, unexpired listings,
    /// most recent first.
    pub async fn find_matching(
        &self,
        category: &str,
        state: &str,
        limit: u32,
    ) -> Result<Vec<JobListing>, JobListingError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {JOB_LISTING_COLUMNS} FROM job_listings
                     WHERE category = ?1 AND state = ?2 AND is_active = 1 AND expires_at > ?3
                     ORDER BY created_at DESC
                     LIMIT ?4"
                ),
                params![category, state, now, limit],
            )
            .await?;

        let mut listings = Vec::new();
        while let Some(row) = rows.next().await? {
            listings.push(row_to_job_listing(row)?);
        }
        Ok(listings)
    }

    pub async fn deactivate(&self, id: &str) -> Result<(), JobListingError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                "UPDATE job_listings SET is_active = 0 WHERE id = ?1 RETURNING id",
                params![id],
            )
            .await?;
        if rows.next().await?.is_none() {
            return Err(JobListingError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub async fn list_by_recruiter(
        &self,
        recruiter_phone: &str,
    ) -> Result<Vec<JobListing>, JobListingError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {JOB_LISTING_COLUMNS} FROM job_listings WHERE recruiter_phone = ?1 ORDER BY created_at DESC"
                ),
                params![recruiter_phone],
            )
            .await?;

        let mut listings = Vec::new();
        while let Some(row) = rows.next().await? {
            listings.push(row_to_job_listing(row)?);
        }
        Ok(listings)
    }
}

fn row_to_job_listing(row: Row) -> Result<JobListing, JobListingError> {
    let id: String = row.get(0)?;
    let recruiter_phone: String = row.get(1)?;
    let title: String = row.get(2)?;
    let category: String = row.get(3)?;
    let state: String = row.get(4)?;
    let description: String = row.get(5)?;
    let contact_email: Option<String> = row.get(6)?;
    let is_active: i64 = row.get(7)?;
    let created_at: String = row.get(8)?;
    let expires_at: String = row.get(9)?;

    Ok(JobListing {
        id,
        recruiter_phone,
        title,
        category,
        state,
        description,
        contact_email,
        is_active: is_active != 0,
        created_at: DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc),
        expires_at: DateTime::parse_from_rfc3339(&expires_at)?.with_timezone(&Utc),
    })
}
