use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::admin_notify::{FailureClass, mask_identifier};
use crate::cv::{self, CvExtractError, CvFormat, CvProcessingError};
use crate::jobs::{JobDispatcher, map_cv_error, map_kv_error};
use crate::messaging::{MessageType, SmartSendOptions};
use crate::orchestrator::{ConversationState, UserSession};
use crate::worker::JobError;
use crate::{Job, JobContext};

const CV_METADATA_TTL: Duration = Duration::from_secs(60 * 60 * 24);

#[derive(Debug, Deserialize)]
struct ProcessCvPayload {
    phone_number: String,
    /// Path to the bytes the orchestrator already downloaded via the messaging
    /// gateway. Re-reading from disk instead of carrying bytes through the
    /// queue keeps job rows small and makes a failed job fully recoverable.
    downloaded_path: String,
    original_filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvMetadata {
    pub binary_path: String,
    pub cleaned_text: String,
}

pub async fn handle_process_cv(
    dispatcher: &JobDispatcher,
    job: Job,
    ctx: JobContext,
) -> Result<(), JobError> {
    let payload: ProcessCvPayload = serde_json::from_value(job.payload.clone())
        .map_err(|err| JobError::Fatal(format!("invalid process_cv payload: {err}")))?;
    let source_path = PathBuf::from(&payload.downloaded_path);

    match run_pipeline(dispatcher, &ctx, &payload, &source_path).await {
        Ok(metadata) => {
            dispatcher
                .kv
                .set_json(
                    &format!("cv:{}", payload.phone_number),
                    &metadata,
                    Some(CV_METADATA_TTL),
                )
                .await
                .map_err(|err| map_kv_error("store cv metadata", err))?;
            notify_success(dispatcher, &payload.phone_number).await;
            Ok(())
        }
        Err(err) => {
            notify_failure(dispatcher, &payload, &source_path, &job, &err).await;
            let label = failure_label(&err);
            Err(map_cv_error(&format!("process_cv ({label})"), err))
        }
    }
}

async fn run_pipeline(
    dispatcher: &JobDispatcher,
    ctx: &JobContext,
    payload: &ProcessCvPayload,
    source_path: &Path,
) -> Result<CvMetadata, CvProcessingError> {
    let bytes = cv::read_bytes(source_path)?;

    step(ctx, "validate_size", || cv::validate_size(bytes.len())).await?;

    let format = step(ctx, "detect_format", || {
        cv::detect_format(&bytes, &payload.original_filename).ok_or(CvExtractError::UnsupportedFormat)
    })
    .await?;

    let raw_text = step(ctx, "extract_text", || cv::extract_text(source_path, format)).await?;

    let cleaned = step(ctx, "clean_text", || -> Result<String, CvExtractError> {
        Ok(cv::clean_text(&raw_text))
    })
    .await?;

    if cv::is_too_short(&cleaned) {
        return Err(CvProcessingError::TooShort);
    }

    let persist_step = ctx
        .start_step("persist_binary")
        .await
        .map_err(|err| CvProcessingError::Extract(CvExtractError::Io(std::io::Error::other(err.to_string()))))?;
    let binary_path = persist_binary(dispatcher, &payload.phone_number, format, &bytes).await;
    let _ = ctx
        .finish_step(&persist_step, Some(json!({"ok": binary_path.is_ok()})))
        .await;
    let binary_path = binary_path?;

    Ok(CvMetadata {
        binary_path,
        cleaned_text: cleaned,
    })
}

async fn step<T, F>(ctx: &JobContext, name: &str, f: F) -> Result<T, CvProcessingError>
where
    F: FnOnce() -> Result<T, CvExtractError>,
{
    let step_id = ctx
        .start_step(name)
        .await
        .map_err(|err| CvProcessingError::Extract(CvExtractError::Io(std::io::Error::other(err.to_string()))))?;
    let result = f();
    let _ = ctx
        .finish_step(&step_id, Some(json!({"ok": result.is_ok()})))
        .await;
    result.map_err(CvProcessingError::Extract)
}

async fn persist_binary(
    dispatcher: &JobDispatcher,
    phone_number: &str,
    format: CvFormat,
    bytes: &[u8],
) -> Result<String, CvProcessingError> {
    let extension = match format {
        CvFormat::Pdf => "pdf",
        CvFormat::Docx => "docx",
        CvFormat::Doc => "doc",
    };
    let safe_id = mask_identifier(phone_number, "cv-binary-filename");
    let filename = format!("cv_{safe_id}_{}.{extension}", Utc::now().timestamp_millis());
    let dest = dispatcher.uploads_dir.join(&filename);

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| CvProcessingError::Extract(CvExtractError::Io(err)))?;
    }
    std::fs::write(&dest, bytes).map_err(|err| CvProcessingError::Extract(CvExtractError::Io(err)))?;

    Ok(dest.to_string_lossy().into_owned())
}

async fn notify_success(dispatcher: &JobDispatcher, phone_number: &str) {
    let session = UserSession::new(dispatcher.kv.clone(), phone_number);
    if let Err(err) = session.set_state(ConversationState::AwaitingCoverLetter).await {
        warn!(error = %err, "failed to set conversation state after cv processing");
    }

    let today = Utc::now().date_naive();
    let reply = match dispatcher.usage.get(phone_number, today).await {
        Ok(usage) => {
            let free_remaining = (dispatcher.usage.free_applications_per_day() - usage.free_applications_used).max(0);
            format!(
                "Your CV is ready! You have {} free application(s) left today, plus {} paid credit(s). \
                 Send your cover letter text now, or reply \"generate\" and we'll write one for you.",
                free_remaining, usage.paid_applications_remaining
            )
        }
        Err(err) => {
            warn!(error = %err, "failed to load usage for cv processing success reply");
            "Your CV is ready! Send your cover letter text now, or reply \"generate\" and we'll write one for you.".to_string()
        }
    };

    if let Err(err) = dispatcher
        .messaging
        .smart_send(
            phone_number,
            &reply,
            SmartSendOptions { inbound_message_id: None, message_type: MessageType::Processing, urgency: crate::messaging::Urgency::Normal },
        )
        .await
    {
        warn!(error = %err, "failed to send cv processing success reply");
    }
}

async fn notify_failure(
    dispatcher: &JobDispatcher,
    payload: &ProcessCvPayload,
    source_path: &Path,
    job: &Job,
    err: &CvProcessingError,
) {
    let size = std::fs::metadata(source_path).map(|m| m.len()).unwrap_or(0);
    let detail = format!("class={} size={size} job_id={} error={err}", failure_label(err), job.id);
    if let Err(notify_err) = dispatcher
        .admin
        .notify(FailureClass::CvProcessing, &payload.phone_number, &detail)
        .await
    {
        warn!(error = %notify_err, "failed to send cv processing failure notification");
    }
}

fn failure_label(err: &CvProcessingError) -> &'static str {
    match err {
        CvProcessingError::Extract(CvExtractError::SizeOutOfRange(_)) => "size_out_of_range",
        CvProcessingError::Extract(CvExtractError::UnsupportedFormat) => "unsupported_format",
        CvProcessingError::Extract(CvExtractError::Io(_)) => "io_error",
        CvProcessingError::Extract(CvExtractError::Pdf(_)) => "pdf_extraction_failed",
        CvProcessingError::Extract(CvExtractError::Docx(_)) => "docx_extraction_failed",
        CvProcessingError::TooShort => "text_too_short",
    }
}
