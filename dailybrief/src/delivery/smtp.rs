use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

use super::Mailer;
use crate::error::DeliveryError;

/// Implicit-TLS SMTP port
pub const DEFAULT_SMTP_PORT: u16 = 465;

/// SMTP submission over implicit TLS, logging in as the sender address
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(
        server: &str,
        port: u16,
        address: &str,
        password: &str,
        timeout_secs: u64,
    ) -> Result<Self, DeliveryError> {
        let from = parse_mailbox(address)?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(server)
            .map_err(|e| DeliveryError::Email(format!("invalid SMTP relay {}: {}", server, e)))?
            .port(port)
            .credentials(Credentials::new(address.to_string(), password.to_string()))
            .timeout(Some(Duration::from_secs(timeout_secs)))
            .build();

        Ok(Self { transport, from })
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| DeliveryError::InvalidAddress(format!("{}: {}", address, e)))
}

/// Plain-text message; the report is already formatted.
pub fn build_message(from: Mailbox, to: &str, subject: &str, body: &str) -> Result<Message, DeliveryError> {
    Message::builder()
        .from(from)
        .to(parse_mailbox(to)?)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())
        .map_err(|e| DeliveryError::Email(e.to_string()))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let message = build_message(self.from.clone(), to, subject, body)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| DeliveryError::Email(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_plain_text_message() {
        let from = parse_mailbox("briefing@example.com").expect("from");
        let message = build_message(from, "reader@example.com", "Daily Briefing", "Summary:\n- a\n")
            .expect("message");
        let raw = String::from_utf8(message.formatted()).expect("utf8");
        assert!(raw.contains("Subject: Daily Briefing"));
        assert!(raw.contains("To: reader@example.com"));
        assert!(raw.contains("text/plain"));
    }

    #[test]
    fn rejects_invalid_recipient() {
        let from = parse_mailbox("briefing@example.com").expect("from");
        let err = build_message(from, "not an address", "s", "b").unwrap_err();
        assert!(matches!(err, DeliveryError::InvalidAddress(_)));
    }

    #[test]
    fn rejects_invalid_sender() {
        let result = SmtpMailer::new("smtp.example.com", DEFAULT_SMTP_PORT, "nope", "pw", 5);
        assert!(matches!(result, Err(DeliveryError::InvalidAddress(_))));
    }
}
