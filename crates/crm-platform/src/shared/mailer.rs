//! Outgoing mail
//!
//! `SmtpMailer` sends through lettre's async SMTP transport. Without an SMTP
//! host configured, `LogMailer` records the message in the logs instead.

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use crate::shared::error::{PlatformError, Result};

/// A plain-text e-mail
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<()>;
}

/// SMTP settings
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings) -> Result<Self> {
        let from: Mailbox = settings
            .from_address
            .parse()
            .map_err(|e| PlatformError::internal(format!("Invalid sender address: {}", e)))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .map_err(|e| PlatformError::internal(format!("Invalid SMTP relay: {}", e)))?
            .port(settings.port);

        if !settings.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ));
        }

        info!(host = %settings.host, port = settings.port, "SMTP mailer configured");

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        let to: Mailbox = mail.to.parse().map_err(|_| {
            PlatformError::validation(format!("Adresse e-mail du destinataire invalide : {}", mail.to))
        })?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body)
            .map_err(|e| PlatformError::Mail { message: e.to_string() })?;

        self.transport
            .send(message)
            .await
            .map_err(|e| PlatformError::Mail { message: e.to_string() })?;

        info!(to = %mail.to, "Mail sent");
        Ok(())
    }
}

/// Mailer used when SMTP is not configured
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        warn!(
            to = %mail.to,
            subject = %mail.subject,
            body_len = mail.body.len(),
            "SMTP not configured, mail not delivered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_mailer_accepts_mail() {
        let mail = OutgoingMail {
            to: "client@example.fr".into(),
            subject: "Facture FAC-2024-001".into(),
            body: "Bonjour".into(),
        };
        assert!(LogMailer.send(mail).await.is_ok());
    }

    #[test]
    fn test_smtp_mailer_rejects_bad_sender() {
        let settings = SmtpSettings {
            host: "smtp.example.fr".into(),
            port: 587,
            username: String::new(),
            password: String::new(),
            from_address: "not an address".into(),
        };
        assert!(SmtpMailer::new(&settings).is_err());
    }
}
