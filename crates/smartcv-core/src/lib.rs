pub mod admin_notify;
pub mod ai;
pub mod applications;
pub mod config;
pub mod constants;
pub mod cv;
pub mod db;
pub mod intent;
pub mod job_listings;
pub mod jobs;
pub mod kv;
pub mod mailer;
pub mod messaging;
pub mod migrations;
pub mod orchestrator;
pub mod perf;
pub mod queue;
pub mod rate_limit;
pub mod telemetry;
pub mod usage;
pub mod worker;

pub use admin_notify::{AdminNotifier, FailureClass, mask_identifier};
pub use ai::{AiClient, AiClientError, ChatCompleter, ChatMessage, ChatRole, CompletionRequest, CompletionResponse};
pub use applications::{Application, ApplicationError, ApplicationRepository, ApplicationStatus};
pub use config::{
    AdminConfig, AiConfig, AiProviderConfig, AppConfig, Config, ConfigError, DbConfig, KvConfig,
    MessagingConfig, PathsConfig, PaymentConfig, QuotaConfig, SmtpConfig, TelemetryConfig,
};
pub use constants::{JOB_CATEGORIES, MAX_CV_BYTES, MIN_CV_BYTES, NIGERIAN_STATES, REJECTED_EMAIL_DOMAINS};
pub use cv::{
    CvExtractError, CvFormat, CvProcessingError, ExtractedIdentity, clean_text, detect_format,
    extract_identity, extract_text, process_cv, validate_size,
};
pub use db::Database;
pub use intent::{ConversationContext, Intent, IntentResolver, SearchFilters};
pub use job_listings::{JobListing, JobListingError, JobListingRepository, NewJobListing};
pub use jobs::{JOB_TYPE_PROCESS_CV, JOB_TYPE_SUBMIT_APPLICATION, JobDispatcher};
pub use kv::{KvError, KvStore};
pub use mailer::{Mailer, MailerError, OutboundEmail};
pub use messaging::{
    Button, DownloadedDocument, ListRow, ListSection, MediaUrlResponse, MessageType,
    MessagingClient, MessagingClientError, SmartSendOptions, Urgency,
};
pub use orchestrator::{
    ConversationState, Orchestrator, OrchestratorError, UserSession, verify_paystack_signature,
};
pub use perf::{MemoryGovernor, ThroughputCounter};
pub use queue::{Job, JobContext, JobQueue, JobState, QueueDepth, QueueName};
pub use rate_limit::{RateLimitDecision, RateLimitError, RateLimitedAction, RateLimiter};
pub use telemetry::{TelemetryError, TelemetryGuard, init_logging, init_telemetry};
pub use usage::{DailyUsage, UsageError, UsageRepository};
pub use worker::{JobError, JobExecutor, NoopExecutor, WorkerConfig, run_worker};
