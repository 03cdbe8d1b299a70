use chrono::{NaiveDate, Utc};
use libsql::{Row, params};
use thiserror::Error;

use crate::db::{Database, DbError};

const USAGE_COLUMNS: &str = "phone_number, usage_date, free_applications_used, paid_applications_remaining, cv_uploads_used, updated_at";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyUsage {
    pub phone_number: String,
    pub usage_date: NaiveDate,
    pub free_applications_used: i64,
    pub paid_applications_remaining: i64,
    pub cv_uploads_used: i64,
}

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("sql error: {0}")]
    Sql(#[from] libsql::Error),
    #[error("date parse error: {0}")]
    DateParse(#[from] chrono::ParseError),
    #[error("usage row not found for {0} on {1}")]
    NotFound(String, String),
}

/// Backs C2's quota enforcement. The free-tier daily allowance and the paid-credit
/// balance both live on one row per (phone_number, usage_date) so a single atomic
/// UPDATE can deduct without a read-then-write race between concurrent requests.
#[derive(Clone)]
pub struct UsageRepository {
    db: Database,
    free_applications_per_day: i64,
}

impl UsageRepository {
    pub fn new(db: Database, free_applications_per_day: i64) -> Self {
        Self {
            db,
            free_applications_per_day,
        }
    }

    pub fn free_applications_per_day(&self) -> i64 {
        self.free_applications_per_day
    }

    async fn ensure_row(&self, phone_number: &str, date: NaiveDate) -> Result<(), UsageError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.connection().await?;
        conn.execute(
            "INSERT INTO daily_usage (phone_number, usage_date, free_applications_used, paid_applications_remaining, cv_uploads_used, updated_at)
             VALUES (?1, ?2, 0, 0, 0, ?3)
             ON CONFLICT (phone_number, usage_date) DO NOTHING",
            params![phone_number, date.to_string(), now],
        )
        .await?;
        Ok(())
    }

    pub async fn get(
        &self,
        phone_number: &str,
        date: NaiveDate,
    ) -> Result<DailyUsage, UsageError> {
        self.ensure_row(phone_number, date).await?;
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {USAGE_COLUMNS} FROM daily_usage WHERE phone_number = ?1 AND usage_date = ?2"
                ),
                params![phone_number, date.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => row_to_usage(row),
            None => Err(UsageError::NotFound(
                phone_number.to_string(),
                date.to_string(),
            )),
        }
    }

    /// Atomically claims one application slot: free allowance first, then paid
    /// credits. Returns `true` if a slot was claimed, `false` if both are exhausted.
    /// The whole decision happens inside one `UPDATE ... WHERE` so concurrent
    /// requests for the same phone number cannot both observe remaining quota and
    /// both succeed.
    pub async fn try_consume_application_slot(
        &self,
        phone_number: &str,
        date: NaiveDate,
    ) -> Result<bool, UsageError> {
        self.ensure_row(phone_number, date).await?;
        let now = Utc::now().to_rfc3339();
        let conn = self.db.connection().await?;

        let mut rows = conn
            .query(
                "UPDATE daily_usage
                 SET free_applications_used = free_applications_used + 1, updated_at = ?4
                 WHERE phone_number = ?1 AND usage_date = ?2 AND free_applications_used < ?3
                 RETURNING phone_number",
                params![
                    phone_number,
                    date.to_string(),
                    self.free_applications_per_day,
                    now.clone()
                ],
            )
            .await?;
        if rows.next().await?.is_some() {
            return Ok(true);
        }

        let mut rows = conn
            .query(
                "UPDATE daily_usage
                 SET paid_applications_remaining = paid_applications_remaining - 1, updated_at = ?3
                 WHERE phone_number = ?1 AND usage_date = ?2 AND paid_applications_remaining > 0
                 RETURNING phone_number",
                params![phone_number, date.to_string(), now],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    /// Atomically claims `count` slots in one transaction, spending the remaining
    /// free allowance first and the paid balance for the remainder. Used when a
    /// single conversational turn applies to several jobs at once, where the
    /// spec requires the whole batch to be gated by one quota check.
    pub async fn try_consume_application_slots(
        &self,
        phone_number: &str,
        date: NaiveDate,
        count: i64,
    ) -> Result<bool, UsageError> {
        self.ensure_row(phone_number, date).await?;
        let now = Utc::now().to_rfc3339();
        let conn = self.db.connection().await?;
        let tx = conn.transaction().await?;

        let mut rows = tx
            .query(
                "SELECT free_applications_used, paid_applications_remaining FROM daily_usage WHERE phone_number = ?1 AND usage_date = ?2",
                params![phone_number, date.to_string()],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| UsageError::NotFound(phone_number.to_string(), date.to_string()))?;
        let free_used: i64 = row.get(0)?;
        let paid_remaining: i64 = row.get(1)?;
        drop(rows);

        let free_remaining = (self.free_applications_per_day - free_used).max(0);
        if free_remaining + paid_remaining < count {
            // Dropping an uncommitted transaction rolls it back.
            return Ok(false);
        }

        let from_free = count.min(free_remaining);
        let from_paid = count - from_free;
        tx.execute(
            "UPDATE daily_usage
             SET free_applications_used = free_applications_used + ?3,
                 paid_applications_remaining = paid_applications_remaining - ?4,
                 updated_at = ?5
             WHERE phone_number = ?1 AND usage_date = ?2",
            params![phone_number, date.to_string(), from_free, from_paid, now],
        )
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    pub async fn grant_paid_applications(
        &self,
        phone_number: &str,
        date: NaiveDate,
        count: i64,
    ) -> Result<(), UsageError> {
        self.ensure_row(phone_number, date).await?;
        let now = Utc::now().to_rfc3339();
        let conn = self.db.connection().await?;
        conn.execute(
            "UPDATE daily_usage
             SET paid_applications_remaining = paid_applications_remaining + ?3, updated_at = ?4
             WHERE phone_number = ?1 AND usage_date = ?2",
            params![phone_number, date.to_string(), count, now],
        )
        .await?;
        Ok(())
    }

    pub async fn record_cv_upload(
        &self,
        phone_number: &str,
        date: NaiveDate,
    ) -> Result<(), UsageError> {
        self.ensure_row(phone_number, date).await?;
        let now = Utc::now().to_rfc3339();
        let conn = self.db.connection().await?;
        conn.execute(
            "UPDATE daily_usage
             SET cv_uploads_used = cv_uploads_used + 1, updated_at = ?3
             WHERE phone_number = ?1 AND usage_date = ?2",
            params![phone_number, date.to_string(), now],
        )
        .await?;
        Ok(())
    }
}

fn row_to_usage(row: Row) -> Result<DailyUsage, UsageError> {
    let phone_number: String = row.get(0)?;
    let usage_date: String = row.get(1)?;
    let free_applications_used: i64 = row.get(2)?;
    let paid_applications_remaining: i64 = row.get(3)?;
    let cv_uploads_used: i64 = row.get(4)?;

    Ok(DailyUsage {
        phone_number,
        usage_date: NaiveDate::parse_from_str(&usage_date, "%Y-%m-%d")
            .map_err(UsageError::DateParse)?,
        free_applications_used,
        paid_applications_remaining,
        cv_uploads_used,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;
    use tempfile::TempDir;

    async fn setup_repo(free_per_day: i64) -> (UsageRepository, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let db_path = dir.path().join("db.sqlite");
        let db = Database::new(&db_path).await.expect("create db");
        run_migrations(&db).await.expect("migrations");
        (UsageRepository::new(db, free_per_day), dir)
    }

    #[tokio::test]
    async fn consumes_free_slots_before_paid_credits() {
        let (repo, _dir) = setup_repo(2).await;
        let today = Utc::now().date_naive();
        let phone = "+2348100000000";

        repo.grant_paid_applications(phone, today, 1)
            .await
            .expect("grant paid");

        assert!(repo.try_consume_application_slot(phone, today).await.unwrap());
        assert!(repo.try_consume_application_slot(phone, today).await.unwrap());

        let usage = repo.get(phone, today).await.expect("get");
        assert_eq!(usage.free_applications_used, 2);
        assert_eq!(usage.paid_applications_remaining, 1);

        assert!(repo.try_consume_application_slot(phone, today).await.unwrap());
        let usage = repo.get(phone, today).await.expect("get after paid consume");
        assert_eq!(usage.paid_applications_remaining, 0);

        assert!(!repo.try_consume_application_slot(phone, today).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_consumption_never_exceeds_allowance() {
        let (repo, _dir) = setup_repo(3).await;
        let today = Utc::now().date_naive();
        let phone = "+2348100000001";

        let mut handles = Vec::new();
        for _ in 0..10 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.try_consume_application_slot(phone, today).await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.expect("join").expect("consume") {
                successes += 1;
            }
        }
        assert_eq!(successes, 3, "only the free allowance should be claimable");
    }

    #[tokio::test]
    async fn batch_consume_spends_free_allowance_before_paid_balance() {
        let (repo, _dir) = setup_repo(2).await;
        let today = Utc::now().date_naive();
        let phone = "+2348100000002";

        repo.grant_paid_applications(phone, today, 5)
            .await
            .expect("grant paid");

        assert!(repo.try_consume_application_slots(phone, today, 4).await.unwrap());
        let usage = repo.get(phone, today).await.expect("get");
        assert_eq!(usage.free_applications_used, 2);
        assert_eq!(usage.paid_applications_remaining, 3);
    }

    #[tokio::test]
    async fn batch_consume_fails_closed_when_total_insufficient() {
        let (repo, _dir) = setup_repo(2).await;
        let today = Utc::now().date_naive();
        let phone = "+2348100000003";

        assert!(!repo.try_consume_application_slots(phone, today, 3).await.unwrap());
        let usage = repo.get(phone, today).await.expect("get");
        assert_eq!(usage.free_applications_used, 0, "a rejected batch must not partially deduct");
    }
}
