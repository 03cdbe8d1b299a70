pub mod client;
pub mod types;

pub use client::{MessagingClient, MessagingClientError};
pub use types::{
    Button, DownloadedDocument, ListRow, ListSection, MediaUrlResponse, MessageType,
    SmartSendOptions, Urgency,
};
