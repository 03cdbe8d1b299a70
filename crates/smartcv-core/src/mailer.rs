use std::path::Path;
use std::time::Duration;

use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

use crate::config::SmtpConfig;

const PER_EMAIL_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("invalid address {0}")]
    InvalidAddress(String),
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("failed to read attachment: {0}")]
    Attachment(#[from] std::io::Error),
    #[error("smtp send failed: {0}")]
    Smtp(String),
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

pub struct OutboundEmail<'a> {
    pub to: &'a str,
    pub reply_to: Option<&'a str>,
    pub subject: &'a str,
    pub body: &'a str,
    pub attachment_path: Option<&'a Path>,
    pub attachment_filename: Option<&'a str>,
}

/// One lettre `AsyncSmtpTransport` bound to a fixed identity. The recruiter
/// mailer and the applicant-confirmation mailer are two separate instances so
/// a compromised or rate-limited credential on one never blocks the other.
#[derive(Clone)]
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_name: String,
    from_address: String,
}

impl Mailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailerError> {
        let credentials = Credentials::new(config.user.clone(), config.pass.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|err| MailerError::Smtp(err.to_string()))?
            .port(config.port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport,
            from_name: config.from_name.clone(),
            from_address: config.from_address.clone(),
        })
    }

    pub async fn send(&self, email: OutboundEmail<'_>) -> Result<(), MailerError> {
        let message = self.build_message(&email)?;
        tokio::time::timeout(PER_EMAIL_TIMEOUT, self.transport.send(message))
            .await
            .map_err(|_| MailerError::Timeout(PER_EMAIL_TIMEOUT))?
            .map_err(|err| MailerError::Smtp(err.to_string()))?;
        Ok(())
    }

    fn build_message(&self, email: &OutboundEmail<'_>) -> Result<Message, MailerError> {
        let from: Mailbox = format!("{} <{}>", self.from_name, self.from_address)
            .parse()
            .map_err(|_| MailerError::InvalidAddress(self.from_address.clone()))?;
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|_| MailerError::InvalidAddress(email.to.to_string()))?;

        let mut builder = Message::builder().from(from).to(to).subject(email.subject);

        if let Some(reply_to) = email.reply_to {
            let reply_to: Mailbox = reply_to
                .parse()
                .map_err(|_| MailerError::InvalidAddress(reply_to.to_string()))?;
            builder = builder.reply_to(reply_to);
        }

        let body_part = SinglePart::builder().header(ContentType::TEXT_PLAIN).body(email.body.to_string());

        let message = match (email.attachment_path, email.attachment_filename) {
            (Some(path), Some(filename)) => {
                let bytes = std::fs::read(path)?;
                let attachment = Attachment::new(filename.to_string())
                    .body(bytes, "application/octet-stream".parse().unwrap());
                builder
                    .multipart(MultiPart::mixed().singlepart(body_part).singlepart(attachment))
                    .map_err(|err| MailerError::Build(err.to_string()))?
            }
            _ => builder
                .singlepart(body_part)
                .map_err(|err| MailerError::Build(err.to_string()))?,
        };

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".into(),
            port: 587,
            user: "user@example.com".into(),
            pass: "secret".into(),
            from_name: "Recruit".into(),
            from_address: "recruit@smartcv.example".into(),
        }
    }

    #[test]
    fn rejects_malformed_recipient_address() {
        let mailer = Mailer::new(&config()).expect("mailer");
        let email = OutboundEmail {
            to: "not-an-email",
            reply_to: None,
            subject: "Application",
            body: "body",
            attachment_path: None,
            attachment_filename: None,
        };
        let err = mailer.build_message(&email).expect_err("should reject");
        assert!(matches!(err, MailerError::InvalidAddress(_)));
    }

    #[test]
    fn builds_plain_message_without_attachment() {
        let mailer = Mailer::new(&config()).expect("mailer");
        let email = OutboundEmail {
            to: "recipient@example.com",
            reply_to: Some("applicant@example.com"),
            subject: "New application",
            body: "Please find the CV attached.",
            attachment_path: None,
            attachment_filename: None,
        };
        mailer.build_message(&email).expect("message should build");
    }
}
