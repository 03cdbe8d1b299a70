use std::sync::Arc;

use async_trait::async_trait;

use crate::ai::{AiClientError, ChatCompleter};
use crate::admin_notify::AdminNotifier;
use crate::applications::ApplicationRepository;
use crate::cv::CvProcessingError;
use crate::job_listings::JobListingRepository;
use crate::kv::{KvError, KvStore};
use crate::mailer::{Mailer, MailerError};
use crate::messaging::{MessagingClient, MessagingClientError};
use crate::perf::{MemoryGovernor, ThroughputCounter};
use crate::usage::UsageRepository;
use crate::worker::{JobError, JobExecutor};
use crate::{Database, Job, JobContext};

mod application;
mod cv_processing;
pub use cv_processing::CvMetadata;

pub const JOB_TYPE_PROCESS_CV: &str = "process_cv";
pub const JOB_TYPE_SUBMIT_APPLICATION: &str = "submit_application";

/// Resolves each queue job's `type` column onto a handler function, the way the
/// teacher's job dispatcher maps Gmail job types onto Gmail-specific handlers.
#[derive(Clone)]
pub struct JobDispatcher {
    pub db: Database,
    pub messaging: Arc<MessagingClient>,
    pub ai: Arc<dyn ChatCompleter>,
    pub recruiter_mailer: Arc<Mailer>,
    pub confirmation_mailer: Arc<Mailer>,
    pub admin: Arc<AdminNotifier>,
    pub kv: KvStore,
    pub uploads_dir: std::path::PathBuf,
    pub throughput: ThroughputCounter,
    pub memory_governor: Arc<MemoryGovernor>,
    pub usage: UsageRepository,
}

impl JobDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        messaging: Arc<MessagingClient>,
        ai: Arc<dyn ChatCompleter>,
        recruiter_mailer: Arc<Mailer>,
        confirmation_mailer: Arc<Mailer>,
        admin: Arc<AdminNotifier>,
        kv: KvStore,
        uploads_dir: std::path::PathBuf,
        memory_governor: Arc<MemoryGovernor>,
        usage: UsageRepository,
    ) -> Self {
        Self {
            db,
            messaging,
            ai,
            recruiter_mailer,
            confirmation_mailer,
            admin,
            kv,
            uploads_dir,
            throughput: ThroughputCounter::default(),
            memory_governor,
            usage,
        }
    }

    pub fn applications(&self) -> ApplicationRepository {
        ApplicationRepository::new(self.db.clone())
    }

    pub fn job_listings(&self) -> JobListingRepository {
        JobListingRepository::new(self.db.clone())
    }
}

#[async_trait]
impl JobExecutor for JobDispatcher {
    async fn execute(&self, job: Job, ctx: JobContext) -> Result<(), JobError> {
        match job.job_type.as_str() {
            JOB_TYPE_PROCESS_CV => cv_processing::handle_process_cv(self, job, ctx).await,
            JOB_TYPE_SUBMIT_APPLICATION => application::handle_submit_application(self, job, ctx).await,
            other => Err(JobError::Fatal(format!("unknown job type: {other}"))),
        }
    }
}

pub(crate) fn map_cv_error(context: &str, err: CvProcessingError) -> JobError {
    match err {
        CvProcessingError::Extract(err) => JobError::Fatal(format!("{context}: {err}")),
        CvProcessingError::TooShort => JobError::Fatal(format!("{context}: text too short after cleaning")),
    }
}

pub(crate) fn map_messaging_error(context: &str, err: MessagingClientError) -> JobError {
    match err {
        MessagingClientError::Http(err) => JobError::retryable(format!("{context}: network error {err}")),
        MessagingClientError::GatewayStatus { status, .. } if status >= 500 => {
            JobError::retryable(format!("{context}: gateway status {status}"))
        }
        MessagingClientError::GatewayStatus { status, body } => {
            JobError::Fatal(format!("{context}: gateway status {status}: {body}"))
        }
        MessagingClientError::TooLarge(size) => {
            JobError::Fatal(format!("{context}: document too large ({size} bytes)"))
        }
    }
}

pub(crate) fn map_ai_error(context: &str, err: AiClientError) -> JobError {
    match err {
        AiClientError::BothFailed { primary, fallback } => {
            JobError::retryable(format!("{context}: both providers failed ({primary} / {fallback})"))
        }
        other => JobError::retryable(format!("{context}: {other}")),
    }
}

pub(crate) fn map_mailer_error(context: &str, err: MailerError) -> JobError {
    match err {
        MailerError::Smtp(_) | MailerError::Timeout(_) => JobError::retryable(format!("{context}: {err}")),
        other => JobError::Fatal(format!("{context}: {other}")),
    }
}

pub(crate) fn map_kv_error(context: &str, err: KvError) -> JobError {
    JobError::retryable(format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{ChatMessage, CompletionRequest, CompletionResponse};
    use crate::config::SmtpConfig;
    use crate::config::AdminConfig;
    use crate::mailer::Mailer;
    use crate::messaging::MessagingClient;
    use crate::migrations::run_migrations;
    use crate::queue::{JobQueue, QueueName};
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    struct StubChatCompleter;

    #[async_trait]
    impl ChatCompleter for StubChatCompleter {
        async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse, AiClientError> {
            Ok(CompletionResponse {
                content: "stub".into(),
                provider: "stub".into(),
                input_tokens: None,
                output_tokens: None,
            })
        }
    }

    async fn setup_dispatcher() -> (JobDispatcher, JobQueue, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let db_name = format!("db_{}.sqlite", uuid::Uuid::new_v4());
        let db_path = dir.path().join(db_name);
        let db = Database::new(db_path.as_path()).await.expect("db");
        run_migrations(&db).await.expect("migrations");
        let queue = JobQueue::new(db.clone());

        let smtp = SmtpConfig {
            host: "smtp.example.com".into(),
            port: 587,
            user: "user@example.com".into(),
            pass: "secret".into(),
            from_name: "Recruit".into(),
            from_address: "recruit@smartcv.example".into(),
        };
        let mailer = Arc::new(Mailer::new(&smtp).expect("mailer"));
        let admin = Arc::new(AdminNotifier::new(
            Mailer::new(&smtp).expect("mailer"),
            AdminConfig {
                email: "ops@smartcv.example".into(),
                ip_salt: "salt".into(),
            },
        ));
        let messaging = Arc::new(MessagingClient::new(
            reqwest::Client::new(),
            "key",
            "https://gateway.example",
            "2348000000000",
        ));

        let dispatcher = JobDispatcher::new(
            db.clone(),
            messaging,
            Arc::new(StubChatCompleter),
            mailer.clone(),
            mailer,
            admin,
            // No live redis in unit tests; kv-touching paths aren't exercised here.
            crate::kv::KvStore::connect("redis://127.0.0.1:0").await.unwrap_or_else(|_| {
                panic!("kv connection manager construction should not require a live connection")
            }),
            dir.path().join("uploads"),
            Arc::new(crate::perf::MemoryGovernor::new(512 * 1024 * 1024)),
            crate::usage::UsageRepository::new(db, 10),
        );
        (dispatcher, queue, dir)
    }

    #[tokio::test]
    #[ignore = "requires a reachable redis instance for KvStore::connect"]
    async fn unknown_job_type_is_fatal() {
        let (dispatcher, queue, _dir) = setup_dispatcher().await;
        let job_id = queue
            .enqueue(QueueName::CvProcessing, "unknown.job", json!({}), None, 0)
            .await
            .expect("enqueue");
        let job = queue.fetch_job(&job_id).await.expect("fetch job");
        let ctx = JobContext::new(queue.clone(), job.clone());

        let result = dispatcher.execute(job, ctx).await;
        match result {
            Err(JobError::Fatal(msg)) => assert!(msg.contains("unknown job type")),
            other => panic!("expected fatal error, got {other:?}"),
        }
    }
}
