use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::AdminConfig;
use crate::mailer::{Mailer, MailerError, OutboundEmail};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    CvProcessing,
    ApplicationWorker,
    UnsignedPaymentWebhook,
    RecruiterFormFlagged,
}

impl FailureClass {
    fn label(&self) -> &'static str {
        match self {
            FailureClass::CvProcessing => "cv_processing_failure",
            FailureClass::ApplicationWorker => "application_worker_error",
            FailureClass::UnsignedPaymentWebhook => "unsigned_payment_webhook",
            FailureClass::RecruiterFormFlagged => "recruiter_form_flagged",
        }
    }
}

/// Salts and hashes an end-user identifier (phone number) before it ever
/// leaves the process in an operator-facing notification.
pub fn mask_identifier(identifier: &str, ip_salt: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(ip_salt.as_bytes()).expect("hmac accepts any key length");
    mac.update(identifier.as_bytes());
    let digest = mac.finalize().into_bytes();
    hex_encode(&digest[..8])
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Sends failure digests to the operator mailbox. Reuses the confirmation SMTP
/// identity, since operator alerts don't carry applicant-facing content and a
/// third dedicated SMTP credential would duplicate one of the two already
/// configured for outbound traffic.
pub struct AdminNotifier {
    mailer: Mailer,
    admin: AdminConfig,
}

impl AdminNotifier {
    pub fn new(mailer: Mailer, admin: AdminConfig) -> Self {
        Self { mailer, admin }
    }

    pub async fn notify(
        &self,
        class: FailureClass,
        identifier: &str,
        detail: &str,
    ) -> Result<(), MailerError> {
        let masked = mask_identifier(identifier, &self.admin.ip_salt);
        let body = format!(
            "class: {}\nidentifier: {}\ndetail: {}",
            class.label(),
            masked,
            detail
        );

        self.mailer
            .send(OutboundEmail {
                to: &self.admin.email,
                reply_to: None,
                subject: &format!("[smartcv] {}", class.label()),
                body: &body,
                attachment_path: None,
                attachment_filename: None,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masking_is_deterministic_and_does_not_leak_the_identifier() {
        let masked = mask_identifier("+2348012345678", "salt-value");
        assert_eq!(masked.len(), 16);
        assert!(!masked.contains("234"));
        assert_eq!(masked, mask_identifier("+2348012345678", "salt-value"));
    }

    #[test]
    fn different_salts_produce_different_masks() {
        let a = mask_identifier("+2348012345678", "salt-a");
        let b = mask_identifier("+2348012345678", "salt-b");
        assert_ne!(a, b);
    }
}
