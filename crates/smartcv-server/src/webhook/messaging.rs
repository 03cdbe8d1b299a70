use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use tracing::warn;

use crate::state::AppState;

const DEDUP_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Deserialize)]
pub struct InboundWebhook {
    #[serde(rename = "whatsappInboundMessage")]
    message: Option<InboundMessage>,
}

#[derive(Debug, Deserialize)]
struct InboundMessage {
    id: String,
    from: String,
    #[serde(rename = "type")]
    kind: String,
    text: Option<InboundText>,
    document: Option<InboundDocument>,
    interactive: Option<InboundInteractive>,
}

#[derive(Debug, Deserialize)]
struct InboundText {
    body: String,
}

#[derive(Debug, Deserialize)]
struct InboundDocument {
    link: Option<String>,
    id: Option<String>,
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InboundInteractive {
    #[serde(rename = "type")]
    kind: String,
    button_reply: Option<InboundReply>,
    list_reply: Option<InboundReply>,
}

#[derive(Debug, Deserialize)]
struct InboundReply {
    title: String,
}

/// `POST /webhook/ycloud` (C10). Replies 200 before doing any async work, then
/// dispatches onto the orchestrator off the request thread, exactly as spec.md
/// §5 requires of the HTTP front door.
pub async fn handle(
    State(state): State<AppState>,
    Json(payload): Json<InboundWebhook>,
) -> StatusCode {
    let Some(message) = payload.message else {
        return StatusCode::OK;
    };

    let dedup_key = format!("webhook:dedup:{}", message.id);
    match state.session_kv.set_if_absent(&dedup_key, "1", DEDUP_TTL).await {
        Ok(false) => return StatusCode::OK,
        Err(err) => {
            // Dedup must fail closed: a KV outage that lets a retried delivery
            // through risks double-processing (double charge prompts, duplicate
            // applications), which is worse than dropping one message.
            warn!(error = %err, "dedup check failed, discarding message");
            return StatusCode::OK;
        }
        Ok(true) => {}
    }

    tokio::spawn(async move {
        if let Err(err) = dispatch(&state, message).await {
            warn!(error = %err, "failed to process inbound messaging webhook");
        }
    });

    StatusCode::OK
}

async fn dispatch(
    state: &AppState,
    message: InboundMessage,
) -> Result<(), smartcv_core::OrchestratorError> {
    match message.kind.as_str() {
        "text" => {
            let body = message.text.map(|t| t.body).unwrap_or_default();
            state
                .orchestrator
                .handle_inbound_text(&message.from, &body, Some(&message.id))
                .await
        }
        "document" => {
            let Some(document) = message.document else {
                return Ok(());
            };
            let filename = document.filename.unwrap_or_else(|| "upload".to_string());
            state
                .orchestrator
                .handle_inbound_document(
                    &message.from,
                    document.link.as_deref(),
                    document.id.as_deref(),
                    &filename,
                )
                .await
        }
        "interactive" => {
            let Some(interactive) = message.interactive else {
                return Ok(());
            };
            let reply = match interactive.kind.as_str() {
                "button_reply" => interactive.button_reply,
                "list_reply" => interactive.list_reply,
                _ => None,
            };
            let text = reply.map(|r| r.title).unwrap_or_default();
            state
                .orchestrator
                .handle_inbound_text(&message.from, &text, Some(&message.id))
                .await
        }
        "image" | "video" | "audio" => {
            state
                .orchestrator
                .handle_unsupported_media(&message.from, Some(&message.id))
                .await
        }
        other => {
            warn!(kind = other, "ignoring unrecognized inbound message type");
            Ok(())
        }
    }
}
