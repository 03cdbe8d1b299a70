use serde::{Deserialize, Serialize};

/// A row in a `SendList` section, max 24 chars for `title`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListSection {
    pub title: String,
    pub rows: Vec<ListRow>,
}

/// A button in a `SendButtons` payload, max 20 chars for `title`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Button {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    SearchResults,
    Processing,
    PaymentInfo,
    InstantResponse,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    High,
    Normal,
    Low,
}

#[derive(Debug, Clone)]
pub struct SmartSendOptions {
    pub inbound_message_id: Option<String>,
    pub message_type: MessageType,
    pub urgency: Urgency,
}

impl Default for SmartSendOptions {
    fn default() -> Self {
        Self {
            inbound_message_id: None,
            message_type: MessageType::Default,
            urgency: Urgency::Normal,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaUrlResponse {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct DownloadedDocument {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}
