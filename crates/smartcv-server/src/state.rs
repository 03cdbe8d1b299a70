use std::sync::Arc;

use smartcv_core::{
    AdminNotifier, ApplicationRepository, Config, Database, JobListingRepository, JobQueue,
    KvStore, Mailer, MessagingClient, Orchestrator, RateLimiter, UsageRepository,
};

/// Shared handles the HTTP front door needs. Two `KvStore`s are constructed from
/// the same redis client (session/cache traffic vs. queue-internals traffic) per
/// C1's isolation note, so a slow consumer on one cannot starve the other.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub session_kv: KvStore,
    pub orchestrator: Arc<Orchestrator>,
    pub queue: JobQueue,
    pub job_listings: JobListingRepository,
    pub usage: UsageRepository,
    pub rate_limiter: RateLimiter,
    pub admin: Arc<AdminNotifier>,
    pub recruiter_mailer: Mailer,
    pub payment_secret_key: String,
    pub verify_base_url: String,
    pub default_amount_kobo: u64,
    pub http: reqwest::Client,
    pub admin_email: String,
    pub ip_salt: String,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub async fn build(
        config: &Config,
        db: Database,
        session_kv: KvStore,
        queue_kv: KvStore,
        messaging: Arc<MessagingClient>,
        ai: Arc<dyn smartcv_core::ChatCompleter>,
        admin: Arc<AdminNotifier>,
        recruiter_mailer: Mailer,
    ) -> Self {
        let queue = JobQueue::new(db.clone());
        let job_listings = JobListingRepository::new(db.clone());
        let applications = ApplicationRepository::new(db.clone());
        let usage = UsageRepository::new(db.clone(), config.quota.basic_applications);
        let rate_limiter = RateLimiter::new(queue_kv);
        let intent_resolver = Arc::new(smartcv_core::IntentResolver::new(ai.clone()));

        let orchestrator = Arc::new(Orchestrator::new(
            session_kv.clone(),
            queue.clone(),
            messaging,
            ai,
            intent_resolver,
            job_listings.clone(),
            applications,
            usage.clone(),
            rate_limiter.clone(),
            config.paths.uploads.clone(),
            config.payment.clone(),
        ));

        Self {
            db,
            session_kv,
            orchestrator,
            queue,
            job_listings,
            usage,
            rate_limiter,
            admin,
            recruiter_mailer,
            payment_secret_key: config.payment.secret_key.clone(),
            verify_base_url: config.payment.verify_base_url.clone(),
            default_amount_kobo: config.payment.default_amount_kobo,
            http: reqwest::Client::new(),
            admin_email: config.admin.email.clone(),
            ip_salt: config.admin.ip_salt.clone(),
        }
    }
}
