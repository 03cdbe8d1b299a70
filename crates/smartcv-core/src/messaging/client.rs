use std::time::Duration;

use reqwest::Client;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::warn;

use crate::constants::MAX_CV_BYTES;
use crate::messaging::types::{
    Button, DownloadedDocument, ListSection, MessageType, SmartSendOptions, Urgency,
};

const SEND_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_BUTTONS: usize = 3;
const MAX_LIST_ROWS: usize = 10;
const BUTTON_TITLE_MAX: usize = 20;
const LIST_ROW_TITLE_MAX: usize = 24;
const ROW_ID_MAX: usize = 256;

#[derive(Debug, Error)]
pub enum MessagingClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("messaging gateway returned {status}: {body}")]
    GatewayStatus { status: u16, body: String },
    #[error("downloaded document exceeds the {0} byte cap")]
    TooLarge(usize),
}

/// Outbound client for the WhatsApp-style messaging gateway (C5), structured like
/// the teacher's `GmailClient`: a fixed base URL, a static header credential, one
/// method per gateway operation, and explicit per-call timeouts.
pub struct MessagingClient {
    http: Client,
    api_key: String,
    base_url: String,
    sender_number: String,
}

impl MessagingClient {
    pub fn new(http: Client, api_key: impl Into<String>, base_url: impl Into<String>, sender_number: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into(),
            sender_number: sender_number.into(),
        }
    }

    pub async fn send_text(&self, to: &str, body: &str) -> Result<(), MessagingClientError> {
        let payload = json!({
            "from": self.sender_number,
            "to": to,
            "type": "text",
            "text": { "body": body },
        });
        self.post_message(&payload).await
    }

    pub async fn send_buttons(
        &self,
        to: &str,
        header: Option<&str>,
        body: &str,
        buttons: &[Button],
    ) -> Result<(), MessagingClientError> {
        let truncated: Vec<Value> = buttons
            .iter()
            .take(MAX_BUTTONS)
            .map(|button| {
                json!({
                    "type": "reply",
                    "reply": {
                        "id": truncate(&button.id, ROW_ID_MAX),
                        "title": truncate(&button.title, BUTTON_TITLE_MAX),
                    }
                })
            })
            .collect();

        let mut interactive = json!({
            "type": "button",
            "body": { "text": body },
            "action": { "buttons": truncated },
        });
        if let Some(header) = header {
            interactive["header"] = json!({ "type": "text", "text": header });
        }

        let payload = json!({
            "from": self.sender_number,
            "to": to,
            "type": "interactive",
            "interactive": interactive,
        });

        if let Err(err) = self.post_message(&payload).await {
            warn!(error = %err, "interactive button send failed, falling back to text");
            return self
                .send_text(to, &render_buttons_as_text(header, body, buttons))
                .await;
        }
        Ok(())
    }

    pub async fn send_list(
        &self,
        to: &str,
        header: &str,
        body: &str,
        sections: &[ListSection],
        button_label: &str,
    ) -> Result<(), MessagingClientError> {
        let mut remaining = MAX_LIST_ROWS;
        let truncated_sections: Vec<Value> = sections
            .iter()
            .take(10)
            .filter_map(|section| {
                if remaining == 0 {
                    return None;
                }
                let rows: Vec<Value> = section
                    .rows
                    .iter()
                    .take(remaining)
                    .map(|row| {
                        json!({
                            "id": truncate(&row.id, ROW_ID_MAX),
                            "title": truncate(&row.title, LIST_ROW_TITLE_MAX),
                            "description": row.description,
                        })
                    })
                    .collect();
                remaining -= rows.len();
                Some(json!({ "title": section.title, "rows": rows }))
            })
            .collect();

        let payload = json!({
            "from": self.sender_number,
            "to": to,
            "type": "interactive",
            "interactive": {
                "type": "list",
                "header": { "type": "text", "text": header },
                "body": { "text": body },
                "action": {
                    "button": button_label,
                    "sections": truncated_sections,
                },
            },
        });

        if let Err(err) = self.post_message(&payload).await {
            warn!(error = %err, "interactive list send failed, falling back to text");
            return self
                .send_text(to, &render_list_as_text(header, body, sections))
                .await;
        }
        Ok(())
    }

    /// Precedes a reply with a typing indicator (if replying to a specific inbound
    /// message) and a length-proportional artificial delay, so automated replies
    /// read as human-paced.
    pub async fn smart_send(
        &self,
        to: &str,
        text: &str,
        options: SmartSendOptions,
    ) -> Result<(), MessagingClientError> {
        if let Some(inbound_id) = &options.inbound_message_id {
            if let Err(err) = self.send_typing_indicator(inbound_id).await {
                warn!(error = %err, "typing indicator send failed, continuing");
            }
        }

        let delay = smart_send_delay(text, options.message_type, options.urgency);
        tokio::time::sleep(delay).await;

        self.send_text(to, text).await
    }

    async fn send_typing_indicator(&self, inbound_message_id: &str) -> Result<(), MessagingClientError> {
        let url = format!("{}/messages/{}/typing", self.base_url, inbound_message_id);
        let response = self
            .http
            .post(&url)
            .header("X-API-Key", &self.api_key)
            .timeout(SEND_TIMEOUT)
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }

    async fn post_message(&self, payload: &Value) -> Result<(), MessagingClientError> {
        let url = format!("{}/messages", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("X-API-Key", &self.api_key)
            .timeout(SEND_TIMEOUT)
            .json(payload)
            .send()
            .await?;
        check_status(response).await.map(|_| ())
    }

    /// Downloads an inbound document. Direct `link`s are fetched with the API-key
    /// header; media `id`s are resolved through `/media/{id}` first to obtain a
    /// signed URL, which is then fetched the same way.
    pub async fn download_by_link(&self, link: &str) -> Result<DownloadedDocument, MessagingClientError> {
        self.download_url(link).await
    }

    pub async fn download_by_media_id(&self, media_id: &str) -> Result<DownloadedDocument, MessagingClientError> {
        let url = format!("{}/media/{}", self.base_url, media_id);
        let response = self
            .http
            .get(&url)
            .header("X-API-Key", &self.api_key)
            .timeout(SEND_TIMEOUT)
            .send()
            .await?;
        let response = check_status(response).await?;
        let signed: crate::messaging::types::MediaUrlResponse = response.json().await?;
        self.download_url(&signed.url).await
    }

    async fn download_url(&self, url: &str) -> Result<DownloadedDocument, MessagingClientError> {
        let response = self
            .http
            .get(url)
            .header("X-API-Key", &self.api_key)
            .timeout(SEND_TIMEOUT)
            .send()
            .await?;
        let response = check_status(response).await?;

        if let Some(len) = response.content_length() {
            if len as usize > MAX_CV_BYTES {
                return Err(MessagingClientError::TooLarge(MAX_CV_BYTES));
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let bytes = response.bytes().await?;
        if bytes.len() > MAX_CV_BYTES {
            return Err(MessagingClientError::TooLarge(MAX_CV_BYTES));
        }

        Ok(DownloadedDocument {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, MessagingClientError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(MessagingClientError::GatewayStatus { status, body })
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

fn render_buttons_as_text(header: Option<&str>, body: &str, buttons: &[Button]) -> String {
    let mut rendered = String::new();
    if let Some(header) = header {
        rendered.push_str(header);
        rendered.push('\n');
    }
    rendered.push_str(body);
    for (index, button) in buttons.iter().take(MAX_BUTTONS).enumerate() {
        rendered.push_str(&format!("\n{}. {}", index + 1, button.title));
    }
    rendered
}

fn render_list_as_text(header: &str, body: &str, sections: &[ListSection]) -> String {
    let mut rendered = format!("{header}\n{body}");
    for section in sections {
        rendered.push_str(&format!("\n\n*{}*", section.title));
        for row in &section.rows {
            rendered.push_str(&format!("\n- {}", row.title));
        }
    }
    rendered
}

fn smart_send_delay(text: &str, message_type: MessageType, urgency: Urgency) -> Duration {
    let base_secs = match message_type {
        MessageType::SearchResults => 3.0,
        MessageType::Processing => 5.0,
        MessageType::PaymentInfo => 2.0,
        MessageType::InstantResponse => 0.5,
        MessageType::Default => (text.chars().count() as f64 / 3.3).clamp(1.0, 25.0),
    };

    let scale = match urgency {
        Urgency::High => 0.5,
        Urgency::Normal => 1.0,
        Urgency::Low => 1.5,
    };

    Duration::from_secs_f64((base_secs * scale).max(0.0))
}
