use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha512;
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

type HmacSha512 = Hmac<Sha512>;

use crate::admin_notify::mask_identifier;
use crate::ai::{AiClientError, ChatCompleter, ChatMessage, CompletionRequest};
use crate::applications::{ApplicationError, ApplicationRepository};
use crate::config::PaymentConfig;
use crate::intent::{ConversationContext, Intent, IntentResolver, SearchFilters};
use crate::job_listings::{JobListing, JobListingError, JobListingRepository};
use crate::jobs::{JOB_TYPE_PROCESS_CV, JOB_TYPE_SUBMIT_APPLICATION};
use crate::kv::{KvError, KvStore};
use crate::messaging::{DownloadedDocument, MessageType, MessagingClient, MessagingClientError, SmartSendOptions, Urgency};
use crate::queue::{JobQueue, QueueError, QueueName};
use crate::rate_limit::{RateLimitedAction, RateLimiter};
use crate::usage::{UsageError, UsageRepository};

const SESSION_TTL: Duration = Duration::from_secs(60 * 60 * 24);
const LAST_JOBS_TTL: Duration = Duration::from_secs(60 * 60);
const CONVERSATION_TURN_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("kv error: {0}")]
    Kv(#[from] KvError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("usage error: {0}")]
    Usage(#[from] UsageError),
    #[error("application error: {0}")]
    Application(#[from] ApplicationError),
    #[error("job listing error: {0}")]
    JobListing(#[from] JobListingError),
    #[error("messaging error: {0}")]
    Messaging(#[from] MessagingClientError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no document reference was supplied")]
    MissingDocumentReference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Idle,
    AwaitingCoverLetter,
}

impl Default for ConversationState {
    fn default() -> Self {
        ConversationState::Idle
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConversationTurn {
    role: String,
    content: String,
}

/// Typed reader/writer over the session keys spec.md §3 names
/// (`cv:{id}`, `cover_letter:{id}`, `state:{id}`, `last_jobs:{id}`,
/// `pending_jobs:{id}`, `conversation:{id}`), one method per key rather than a
/// dictionary of raw key strings, the way C2's `RateLimiter` wraps its own
/// `rate:{action}:{id}` namespace.
pub struct UserSession {
    kv: KvStore,
    identifier: String,
}

impl UserSession {
    pub fn new(kv: KvStore, identifier: impl Into<String>) -> Self {
        Self { kv, identifier: identifier.into() }
    }

    fn key(&self, prefix: &str) -> String {
        format!("{prefix}:{}", self.identifier)
    }

    pub async fn cv_metadata(&self) -> Result<Option<crate::jobs::CvMetadata>, KvError> {
        self.kv.get_json(&self.key("cv")).await
    }

    pub async fn cover_letter(&self) -> Result<Option<String>, KvError> {
        self.kv.get_json(&self.key("cover_letter")).await
    }

    pub async fn set_cover_letter(&self, text: &str) -> Result<(), KvError> {
        self.kv.set_json(&self.key("cover_letter"), &text, Some(SESSION_TTL)).await
    }

    pub async fn state(&self) -> ConversationState {
        self.kv
            .get_json(&self.key("state"))
            .await
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    pub async fn set_state(&self, state: ConversationState) -> Result<(), KvError> {
        self.kv.set_json(&self.key("state"), &state, Some(SESSION_TTL)).await
    }

    pub async fn last_jobs(&self) -> Vec<String> {
        self.kv.get_json(&self.key("last_jobs")).await.ok().flatten().unwrap_or_default()
    }

    pub async fn set_last_jobs(&self, ids: &[String]) -> Result<(), KvError> {
        self.kv.set_json(&self.key("last_jobs"), &ids, Some(LAST_JOBS_TTL)).await
    }

    pub async fn pending_jobs(&self) -> Vec<String> {
        self.kv.get_json(&self.key("pending_jobs")).await.ok().flatten().unwrap_or_default()
    }

    pub async fn set_pending_jobs(&self, ids: &[String]) -> Result<(), KvError> {
        self.kv.set_json(&self.key("pending_jobs"), &ids, Some(SESSION_TTL)).await
    }

    pub async fn clear_pending_jobs(&self) -> Result<(), KvError> {
        self.kv.delete(&self.key("pending_jobs")).await
    }

    pub async fn record_turn(&self, role: &str, content: &str) -> Result<(), KvError> {
        let mut turns: Vec<ConversationTurn> =
            self.kv.get_json(&self.key("conversation")).await?.unwrap_or_default();
        turns.push(ConversationTurn { role: role.to_string(), content: content.to_string() });
        if turns.len() > CONVERSATION_TURN_LIMIT {
            let excess = turns.len() - CONVERSATION_TURN_LIMIT;
            turns.drain(0..excess);
        }
        self.kv.set_json(&self.key("conversation"), &turns, Some(SESSION_TTL)).await
    }

    pub async fn conversation_context(&self) -> ConversationContext {
        let turns: Vec<ConversationTurn> =
            self.kv.get_json(&self.key("conversation")).await.ok().flatten().unwrap_or_default();
        ConversationContext {
            recent_turns: turns.into_iter().map(|turn| turn.content).collect(),
        }
    }

    /// Purges every key this session owns, the `ClearUserLimits`-adjacent reset
    /// the `reset` conversational command triggers.
    pub async fn reset(&self) -> Result<(), KvError> {
        for suffix in ["cv", "cover_letter", "state", "last_jobs", "pending_jobs", "conversation"] {
            self.kv.delete(&self.key(suffix)).await?;
        }
        Ok(())
    }
}

const GREETING: &str = "Hi! I'm SmartCV. Tell me what kind of job you're looking for and where (e.g. \"accounting jobs in Lagos\"), and I'll find openings and apply for you.";
const HELP_TEXT: &str = "Tell me a job category and a state to search (e.g. \"IT jobs in Abuja\"). Reply \"apply 1\" or \"apply all\" after a search to apply. Send your CV as a document any time. Reply \"status\" for your quota, or \"reset\" to start over.";
const ABOUT_TEXT: &str = "SmartCV helps job seekers in Nigeria find openings and apply over WhatsApp. Search for a role, upload your CV once, and we submit applications on your behalf.";

/// Dispatches one conversational event at a time — inbound text, an inbound
/// document, or a payment completion — onto the session and queue primitives,
/// mirroring the way the teacher's Gmail worker dispatches one job type at a
/// time onto its repositories.
pub struct Orchestrator {
    kv: KvStore,
    queue: JobQueue,
    messaging: Arc<MessagingClient>,
    ai: Arc<dyn ChatCompleter>,
    intent_resolver: Arc<IntentResolver>,
    job_listings: JobListingRepository,
    applications: ApplicationRepository,
    usage: UsageRepository,
    rate_limiter: RateLimiter,
    uploads_dir: PathBuf,
    payment: PaymentConfig,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kv: KvStore,
        queue: JobQueue,
        messaging: Arc<MessagingClient>,
        ai: Arc<dyn ChatCompleter>,
        intent_resolver: Arc<IntentResolver>,
        job_listings: JobListingRepository,
        applications: ApplicationRepository,
        usage: UsageRepository,
        rate_limiter: RateLimiter,
        uploads_dir: PathBuf,
        payment: PaymentConfig,
    ) -> Self {
        Self {
            kv,
            queue,
            messaging,
            ai,
            intent_resolver,
            job_listings,
            applications,
            usage,
            rate_limiter,
            uploads_dir,
            payment,
        }
    }

    fn session(&self, identifier: &str) -> UserSession {
        UserSession::new(self.kv.clone(), identifier)
    }

    async fn reply(
        &self,
        identifier: &str,
        text: &str,
        message_type: MessageType,
        inbound_message_id: Option<&str>,
    ) -> Result<(), OrchestratorError> {
        self.messaging
            .smart_send(
                identifier,
                text,
                SmartSendOptions {
                    inbound_message_id: inbound_message_id.map(str::to_string),
                    message_type,
                    urgency: Urgency::Normal,
                },
            )
            .await?;
        Ok(())
    }

    /// Handles one inbound WhatsApp text message: rate limit, record the turn,
    /// and dispatch either into cover-letter capture (when the session is
    /// waiting on one) or into intent resolution.
    pub async fn handle_inbound_text(
        &self,
        identifier: &str,
        text: &str,
        inbound_message_id: Option<&str>,
    ) -> Result<(), OrchestratorError> {
        let decision = self.rate_limiter.check_limit(identifier, RateLimitedAction::Message).await;
        if !decision.allowed {
            self.reply(
                identifier,
                decision.message.as_deref().unwrap_or("Please slow down."),
                MessageType::Default,
                inbound_message_id,
            )
            .await?;
            return Ok(());
        }

        let session = self.session(identifier);
        session.record_turn("user", text).await?;

        if session.state().await == ConversationState::AwaitingCoverLetter {
            return self.handle_cover_letter_text(identifier, text, &session).await;
        }

        let context = session.conversation_context().await;
        let intent = self.intent_resolver.resolve(text, &context).await;

        let reply_text = match &intent {
            Intent::Greeting => Some(GREETING.to_string()),
            Intent::Help => Some(HELP_TEXT.to_string()),
            Intent::AboutService => Some(ABOUT_TEXT.to_string()),
            Intent::Chat { response } | Intent::Clarify { response } => Some(response.clone()),
            Intent::Status => Some(self.status_text(identifier).await?),
            Intent::Reset => {
                session.reset().await?;
                self.rate_limiter.clear_user_limits(identifier).await.ok();
                Some("Your session has been reset. Tell me what job you're looking for and where.".to_string())
            }
            Intent::SearchJobs { .. } | Intent::ApplyJob { .. } => None,
        };

        if let Some(reply_text) = reply_text {
            session.record_turn("assistant", &reply_text).await?;
            self.reply(identifier, &reply_text, MessageType::InstantResponse, inbound_message_id).await?;
            return Ok(());
        }

        match intent {
            Intent::SearchJobs { filters } => self.search_jobs(identifier, filters, &session).await,
            Intent::ApplyJob { apply_all, job_numbers } => {
                self.handle_job_application(identifier, apply_all, job_numbers, &session).await
            }
            _ => unreachable!("handled above"),
        }
    }

    async fn status_text(&self, identifier: &str) -> Result<String, OrchestratorError> {
        let today = Utc::now().date_naive();
        let usage = self.usage.get(identifier, today).await?;
        let free_remaining = (self.usage.free_applications_per_day() - usage.free_applications_used).max(0);
        Ok(format!(
            "Today: {free_remaining} free application(s) left, plus {} paid credit(s). CVs uploaded today: {}.",
            usage.paid_applications_remaining, usage.cv_uploads_used
        ))
    }

    async fn handle_cover_letter_text(
        &self,
        identifier: &str,
        text: &str,
        session: &UserSession,
    ) -> Result<(), OrchestratorError> {
        let cover_letter = if text.trim().eq_ignore_ascii_case("generate") {
            let cv_text = session
                .cv_metadata()
                .await?
                .map(|metadata| metadata.cleaned_text)
                .unwrap_or_default();
            self.generate_generic_cover_letter(&cv_text).await
        } else {
            text.trim().to_string()
        };

        session.set_cover_letter(&cover_letter).await?;
        session.set_state(ConversationState::Idle).await?;

        let pending = session.pending_jobs().await;
        if pending.is_empty() {
            session.record_turn("assistant", "Cover letter saved.").await?;
            self.reply(identifier, "Cover letter saved.", MessageType::InstantResponse, None).await?;
            return Ok(());
        }

        session.clear_pending_jobs().await?;
        self.submit_applications(identifier, &pending, session).await?;
        let reply_text = "Cover letter saved. Submitting your application(s) now.";
        session.record_turn("assistant", reply_text).await?;
        self.reply(identifier, reply_text, MessageType::Processing, None).await
    }

    async fn generate_generic_cover_letter(&self, cv_text: &str) -> String {
        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system(
                    "Write a brief, professional cover letter in 3-4 sentences based on the candidate's CV below. No greeting, no signature.",
                ),
                ChatMessage::user(cv_text),
            ],
            temperature: 0.6,
            max_tokens: 300,
            json_mode: false,
        };

        match self.ai.complete(&request).await {
            Ok(response) if !response.content.trim().is_empty() => response.content,
            Ok(_) => fallback_cover_letter(),
            Err(err) => {
                tracing::warn!(error = %err, "cover letter generation failed, using fallback");
                fallback_cover_letter()
            }
        }
    }

    async fn search_jobs(
        &self,
        identifier: &str,
        filters: SearchFilters,
        session: &UserSession,
    ) -> Result<(), OrchestratorError> {
        let decision = self.rate_limiter.check_limit(identifier, RateLimitedAction::JobSearch).await;
        if !decision.allowed {
            let message = decision.message.unwrap_or_default();
            session.record_turn("assistant", &message).await?;
            return self.reply(identifier, &message, MessageType::Default, None).await;
        }

        let category = filters.category.unwrap_or_else(|| "other_general".to_string());
        let location = filters.location.unwrap_or_else(|| "Lagos".to_string());
        let listings = self.job_listings.find_matching(&category, &location, 10).await?;

        if listings.is_empty() {
            let reply_text = format!(
                "No open {} roles in {location} right now. Try another state, or check back soon.",
                category.replace('_', " ")
            );
            session.record_turn("assistant", &reply_text).await?;
            return self.reply(identifier, &reply_text, MessageType::SearchResults, None).await;
        }

        let ids: Vec<String> = listings.iter().map(|listing| listing.id.clone()).collect();
        session.set_last_jobs(&ids).await?;

        let reply_text = format_job_list(&listings);
        session.record_turn("assistant", &reply_text).await?;
        self.reply(identifier, &reply_text, MessageType::SearchResults, None).await
    }

    async fn handle_job_application(
        &self,
        identifier: &str,
        apply_all: bool,
        job_numbers: Vec<u32>,
        session: &UserSession,
    ) -> Result<(), OrchestratorError> {
        let decision = self.rate_limiter.check_limit(identifier, RateLimitedAction::Application).await;
        if !decision.allowed {
            let message = decision.message.unwrap_or_default();
            session.record_turn("assistant", &message).await?;
            return self.reply(identifier, &message, MessageType::Default, None).await;
        }

        let last_jobs = session.last_jobs().await;
        if last_jobs.is_empty() {
            let reply_text = "Please search for jobs first, then tell me which ones to apply to.";
            session.record_turn("assistant", reply_text).await?;
            return self.reply(identifier, reply_text, MessageType::Default, None).await;
        }

        let selected: Vec<String> = if apply_all {
            last_jobs
        } else {
            job_numbers
                .iter()
                .filter_map(|number| last_jobs.get((*number as usize).checked_sub(1)?).cloned())
                .collect()
        };

        if selected.is_empty() {
            let reply_text = "I couldn't match those numbers to a job in the list. Try \"apply 1\" or \"apply all\".";
            session.record_turn("assistant", reply_text).await?;
            return self.reply(identifier, reply_text, MessageType::Default, None).await;
        }

        let today = Utc::now().date_naive();
        let usage = self.usage.get(identifier, today).await?;
        let free_remaining = (self.usage.free_applications_per_day() - usage.free_applications_used).max(0);
        let remaining = free_remaining + usage.paid_applications_remaining;
        let requested = selected.len() as i64;

        if remaining < requested {
            session.set_pending_jobs(&selected).await?;
            let checkout_url = self.build_checkout_url(identifier, requested).await?;
            let reply_text = format!(
                "You need more credits to apply to {requested} job(s). Pay here to continue: {checkout_url}"
            );
            session.record_turn("assistant", &reply_text).await?;
            return self.reply(identifier, &reply_text, MessageType::PaymentInfo, None).await;
        }

        if session.cv_metadata().await?.is_none() {
            session.set_pending_jobs(&selected).await?;
            let reply_text = "Please upload your CV (PDF or DOCX) before applying. We'll submit these once it's in.";
            session.record_turn("assistant", reply_text).await?;
            return self.reply(identifier, reply_text, MessageType::Default, None).await;
        }

        if session.cover_letter().await?.is_none() {
            session.set_pending_jobs(&selected).await?;
            session.set_state(ConversationState::AwaitingCoverLetter).await?;
            let reply_text = "Send your cover letter text, or reply \"generate\" and we'll write one for you.";
            session.record_turn("assistant", reply_text).await?;
            return self.reply(identifier, reply_text, MessageType::Default, None).await;
        }

        if !self.usage.try_consume_application_slots(identifier, today, requested).await? {
            let reply_text = "Your quota changed before we could apply. Please try again.";
            session.record_turn("assistant", reply_text).await?;
            return self.reply(identifier, reply_text, MessageType::Default, None).await;
        }

        self.submit_applications(identifier, &selected, session).await?;
        let reply_text = format!("Applying to {requested} job(s) now. We'll email you a confirmation shortly.");
        session.record_turn("assistant", &reply_text).await?;
        self.reply(identifier, &reply_text, MessageType::Processing, None).await
    }

    /// Enqueues the `submit_application` job with the selected listing ids.
    /// No `applications` row exists yet for any of them — a row is only ever
    /// inserted by the worker itself, and only once identity validation on
    /// the attached CV has actually succeeded.
    async fn submit_applications(
        &self,
        identifier: &str,
        job_listing_ids: &[String],
        _session: &UserSession,
    ) -> Result<(), OrchestratorError> {
        let mut fresh_job_listing_ids = Vec::with_capacity(job_listing_ids.len());
        for job_listing_id in job_listing_ids {
            if self.applications.has_applied(job_listing_id, identifier).await? {
                tracing::warn!(job_listing_id, identifier, "already applied to this listing, skipping");
                continue;
            }
            fresh_job_listing_ids.push(job_listing_id.clone());
        }

        if fresh_job_listing_ids.is_empty() {
            return Ok(());
        }

        let payload = json!({ "phone_number": identifier, "job_listing_ids": fresh_job_listing_ids });
        self.queue.enqueue(QueueName::JobApplications, JOB_TYPE_SUBMIT_APPLICATION, payload, None, 0).await?;
        Ok(())
    }

    /// Replies with a friendly prompt for an inbound `image`/`video`/`audio`
    /// message — those kinds carry no text or document to act on, but the
    /// user still needs a response telling them what format we accept.
    pub async fn handle_unsupported_media(
        &self,
        identifier: &str,
        inbound_message_id: Option<&str>,
    ) -> Result<(), OrchestratorError> {
        self.reply(
            identifier,
            "I can only read CVs sent as a PDF or Word (DOCX) document. Please resend your CV as a file attachment.",
            MessageType::Default,
            inbound_message_id,
        )
        .await
    }

    /// Handles an inbound document: rate limit, download via C5, persist to
    /// disk, and enqueue the `cv-processing` job the worker owns.
    pub async fn handle_inbound_document(
        &self,
        identifier: &str,
        link: Option<&str>,
        media_id: Option<&str>,
        original_filename: &str,
    ) -> Result<(), OrchestratorError> {
        let decision = self.rate_limiter.check_limit(identifier, RateLimitedAction::CvUpload).await;
        if !decision.allowed {
            return self
                .reply(
                    identifier,
                    decision.message.as_deref().unwrap_or("Please slow down."),
                    MessageType::Default,
                    None,
                )
                .await;
        }

        let document = match (link, media_id) {
            (Some(link), _) => self.messaging.download_by_link(link).await,
            (None, Some(media_id)) => self.messaging.download_by_media_id(media_id).await,
            (None, None) => return Err(OrchestratorError::MissingDocumentReference),
        };

        let document = match document {
            Ok(document) => document,
            Err(err) => {
                self.reply(
                    identifier,
                    "We couldn't download your file. Please try sending it again.",
                    MessageType::Default,
                    None,
                )
                .await?;
                return Err(err.into());
            }
        };

        let downloaded_path = self.persist_inbound_document(identifier, &document, original_filename).await?;
        let payload = json!({
            "phone_number": identifier,
            "downloaded_path": downloaded_path,
            "original_filename": original_filename,
        });
        self.queue.enqueue(QueueName::CvProcessing, JOB_TYPE_PROCESS_CV, payload, None, 0).await?;

        self.usage.record_cv_upload(identifier, Utc::now().date_naive()).await?;
        self.reply(
            identifier,
            "Got your CV! We're processing it now, this takes a moment.",
            MessageType::Processing,
            None,
        )
        .await
    }

    async fn persist_inbound_document(
        &self,
        identifier: &str,
        document: &DownloadedDocument,
        original_filename: &str,
    ) -> Result<String, OrchestratorError> {
        std::fs::create_dir_all(&self.uploads_dir)?;
        let safe_id = mask_identifier(identifier, "inbound-document-filename");
        let extension = Path::new(original_filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("bin");
        let filename = format!("inbound_{safe_id}_{}.{extension}", Utc::now().timestamp_millis());
        let dest = self.uploads_dir.join(filename);
        std::fs::write(&dest, &document.bytes)?;
        Ok(dest.to_string_lossy().into_owned())
    }

    /// Handles a verified payment: if the applicant had jobs waiting on
    /// payment, submit them now; otherwise just confirm. Granting the paid
    /// balance onto `DailyUsage` is the webhook handler's responsibility
    /// (it owns the Paystack verification), not this method's.
    pub async fn handle_payment_completed(&self, identifier: &str) -> Result<(), OrchestratorError> {
        let session = self.session(identifier);
        let pending = session.pending_jobs().await;

        if pending.is_empty() {
            return self
                .reply(identifier, "Payment received! You can now apply to jobs.", MessageType::PaymentInfo, None)
                .await;
        }

        session.clear_pending_jobs().await?;
        tokio::time::sleep(Duration::from_millis(500)).await;

        if session.cv_metadata().await?.is_none() {
            session.set_pending_jobs(&pending).await?;
            return self
                .reply(
                    identifier,
                    "Payment received! Please upload your CV so we can apply for you.",
                    MessageType::PaymentInfo,
                    None,
                )
                .await;
        }

        if session.cover_letter().await?.is_none() {
            session.set_pending_jobs(&pending).await?;
            session.set_state(ConversationState::AwaitingCoverLetter).await?;
            return self
                .reply(
                    identifier,
                    "Payment received! Send your cover letter text, or reply \"generate\", and we'll apply right after.",
                    MessageType::PaymentInfo,
                    None,
                )
                .await;
        }

        self.submit_applications(identifier, &pending, &session).await?;
        self.reply(
            identifier,
            "Payment received! Submitting your applications now.",
            MessageType::PaymentInfo,
            None,
        )
        .await
    }

    /// Builds a Paystack checkout link and records the reference -> phone
    /// mapping the payment webhook needs to resolve who paid (spec.md §4.10).
    async fn build_checkout_url(&self, identifier: &str, requested: i64) -> Result<String, OrchestratorError> {
        let reference = format!("auto_{}_{}", sanitize_reference_component(identifier), Uuid::new_v4().simple());
        self.kv
            .set_json(&format!("payment_ref:{reference}"), &identifier.to_string(), Some(Duration::from_secs(3600)))
            .await?;
        let amount = self.payment.default_amount_kobo.saturating_mul(requested.max(1) as u64);
        Ok(format!(
            "{}/pay?reference={reference}&amount={amount}&key={}",
            self.payment.webhook_url, self.payment.public_key
        ))
    }
}

fn sanitize_reference_component(identifier: &str) -> String {
    identifier.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// Verifies a provider webhook body against its `x-paystack-signature` header
/// (hex-encoded HMAC-SHA512 of the raw body, keyed by the integration's secret
/// key), the way spec.md §4.10 requires before any payment event is trusted.
pub fn verify_paystack_signature(secret_key: &str, raw_body: &[u8], signature_header: &str) -> bool {
    let Ok(mut mac) = HmacSha512::new_from_slice(secret_key.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    let expected = mac.finalize().into_bytes();
    let expected_hex = expected.iter().map(|byte| format!("{byte:02x}")).collect::<String>();
    expected_hex.as_bytes().ct_eq(signature_header.as_bytes()).into()
}

fn fallback_cover_letter() -> String {
    "I am writing to express my interest in this role. My background and experience align well with what you're looking for, and I'm confident I can contribute from day one. I'd welcome the chance to discuss further.".to_string()
}

fn format_job_list(listings: &[JobListing]) -> String {
    let mut text = String::from("Here's what I found:\n");
    for (index, listing) in listings.iter().enumerate() {
        text.push_str(&format!(
            "\n{}. {} ({}, {})",
            index + 1,
            listing.title,
            listing.category.replace('_', " "),
            listing.state
        ));
    }
    text.push_str("\n\nReply \"apply 1\" or \"apply all\" to apply.");
    text
}
