use std::time::Duration;

use thiserror::Error;

use crate::kv::{KvError, KvStore};

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("kv error: {0}")]
    Kv(#[from] KvError),
}

/// The hard-coded action table (spec.md §4.2). Each variant names its own
/// max-requests/window pair and a human-readable denial message template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitedAction {
    Message,
    JobSearch,
    CvUpload,
    Application,
    AiCall,
    FileDownload,
    RecruiterPosting,
}

impl RateLimitedAction {
    pub const ALL: [RateLimitedAction; 7] = [
        RateLimitedAction::Message,
        RateLimitedAction::JobSearch,
        RateLimitedAction::CvUpload,
        RateLimitedAction::Application,
        RateLimitedAction::AiCall,
        RateLimitedAction::FileDownload,
        RateLimitedAction::RecruiterPosting,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            RateLimitedAction::Message => "message",
            RateLimitedAction::JobSearch => "job_search",
            RateLimitedAction::CvUpload => "cv_upload",
            RateLimitedAction::Application => "application",
            RateLimitedAction::AiCall => "ai_call",
            RateLimitedAction::FileDownload => "file_download",
            RateLimitedAction::RecruiterPosting => "recruiter_posting",
        }
    }

    fn max(&self) -> i64 {
        match self {
            RateLimitedAction::Message => 10,
            RateLimitedAction::JobSearch => 20,
            RateLimitedAction::CvUpload => 3,
            RateLimitedAction::Application => 50,
            RateLimitedAction::AiCall => 5,
            RateLimitedAction::FileDownload => 10,
            RateLimitedAction::RecruiterPosting => 5,
        }
    }

    fn window(&self) -> Duration {
        match self {
            RateLimitedAction::Message => Duration::from_secs(60),
            RateLimitedAction::JobSearch => Duration::from_secs(300),
            RateLimitedAction::CvUpload => Duration::from_secs(3600),
            RateLimitedAction::Application => Duration::from_secs(86_400),
            RateLimitedAction::AiCall => Duration::from_secs(60),
            RateLimitedAction::FileDownload => Duration::from_secs(300),
            RateLimitedAction::RecruiterPosting => Duration::from_secs(3600),
        }
    }

    fn denial_message(&self) -> &'static str {
        match self {
            RateLimitedAction::Message => "You're sending messages too quickly. Please wait a minute and try again.",
            RateLimitedAction::JobSearch => "You've searched jobs too many times recently. Please wait a few minutes.",
            RateLimitedAction::CvUpload => "You've uploaded too many CVs this hour. Please try again later.",
            RateLimitedAction::Application => "You've reached today's application limit. Please try again tomorrow.",
            RateLimitedAction::AiCall => "We're a bit busy right now. Please wait a moment and try again.",
            RateLimitedAction::FileDownload => "Too many file downloads recently. Please wait a few minutes.",
            RateLimitedAction::RecruiterPosting => "Too many job postings from this network recently. Please try again later.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: i64,
    pub reset_in_seconds: u64,
    pub message: Option<String>,
}

fn key_for(action: RateLimitedAction, identifier: &str) -> String {
    format!("rate:{}:{identifier}", action.as_str())
}

/// Sliding-window counter per (identifier, action), backed by the KV store's
/// atomic incr-with-ttl-on-first-increment primitive (C2). Fails open: a KV
/// transport error allows the request through rather than locking users out.
#[derive(Clone)]
pub struct RateLimiter {
    kv: KvStore,
}

impl RateLimiter {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    pub async fn check_limit(&self, identifier: &str, action: RateLimitedAction) -> RateLimitDecision {
        let key = key_for(action, identifier);
        match self.kv.incr_with_ttl(&key, action.window()).await {
            Ok(count) => {
                let remaining = (action.max() - count).max(0);
                if count > action.max() {
                    RateLimitDecision {
                        allowed: false,
                        remaining: 0,
                        reset_in_seconds: action.window().as_secs(),
                        message: Some(action.denial_message().to_string()),
                    }
                } else {
                    RateLimitDecision {
                        allowed: true,
                        remaining,
                        reset_in_seconds: action.window().as_secs(),
                        message: None,
                    }
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, action = action.as_str(), "rate limiter kv error, failing open");
                RateLimitDecision {
                    allowed: true,
                    remaining: action.max(),
                    reset_in_seconds: action.window().as_secs(),
                    message: None,
                }
            }
        }
    }

    /// Deletes every `rate:{action}:{identifier}` key across the fixed action
    /// table, the admin helper spec.md calls `ClearUserLimits`.
    pub async fn clear_user_limits(&self, identifier: &str) -> Result<(), RateLimitError> {
        for action in RateLimitedAction::ALL {
            self.kv.delete(&key_for(action, identifier)).await?;
        }
        Ok(())
    }
}
