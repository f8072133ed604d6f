use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;
use tracing::info;

use crate::config::{AppConfig, SmtpConfig};
use crate::utils::retry::retry_async;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAttachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub attachments: Vec<EmailAttachment>,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address '{address}': {reason}")]
    Address { address: String, reason: String },
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("delivery failed: {0}")]
    Delivery(String),
}

impl MailError {
    /// Only transport failures can succeed on a later attempt; a bad address
    /// or message stays bad.
    pub fn is_transient(&self) -> bool {
        matches!(self, MailError::Delivery(_))
    }
}

#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(smtp: &SmtpConfig, from: &str) -> anyhow::Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
            .with_context(|| format!("invalid SMTP host {}", smtp.host))?
            .port(smtp.port);
        if let (Some(username), Some(password)) = (&smtp.username, &smtp.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        let from = from
            .parse::<Mailbox>()
            .with_context(|| format!("EMAIL_FROM is not a valid mailbox: {from}"))?;
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

pub fn build_message(from: &Mailbox, email: &OutgoingEmail) -> Result<Message, MailError> {
    let to = email
        .to
        .parse::<Mailbox>()
        .map_err(|err| MailError::Address {
            address: email.to.clone(),
            reason: err.to_string(),
        })?;

    let builder = Message::builder()
        .from(from.clone())
        .to(to)
        .subject(email.subject.clone());

    let text = SinglePart::builder()
        .header(ContentType::TEXT_PLAIN)
        .body(email.text_body.clone());

    let message = if email.attachments.is_empty() {
        builder.singlepart(text)
    } else {
        let mut body = MultiPart::mixed().singlepart(text);
        for attachment in &email.attachments {
            let content_type = ContentType::parse(&attachment.content_type)
                .map_err(|err| MailError::Build(err.to_string()))?;
            body = body.singlepart(
                Attachment::new(attachment.file_name.clone())
                    .body(attachment.bytes.clone(), content_type),
            );
        }
        builder.multipart(body)
    };

    message.map_err(|err| MailError::Build(err.to_string()))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        let message = build_message(&self.from, &email)?;
        self.transport
            .send(message)
            .await
            .map_err(|err| MailError::Delivery(err.to_string()))?;
        info!(to = %email.to, subject = %email.subject, "email delivered");
        Ok(())
    }
}

/// Used when no SMTP host is configured: logs instead of sending.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        info!(
            to = %email.to,
            subject = %email.subject,
            attachments = email.attachments.len(),
            "SMTP not configured, email logged only"
        );
        Ok(())
    }
}

pub fn from_config(config: &AppConfig) -> anyhow::Result<Box<dyn Mailer>> {
    match &config.smtp {
        Some(smtp) => Ok(Box::new(SmtpMailer::new(smtp, &config.email_from)?)),
        None => Ok(Box::new(LogMailer)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempts: u32,
    pub error: Option<String>,
}

impl DeliveryReport {
    pub fn status(&self) -> &'static str {
        if self.error.is_none() {
            "sent"
        } else {
            "failed"
        }
    }
}

/// Sends with exponential backoff between transient failures. Never fails
/// the caller: the outcome is reported so it can be stored.
pub async fn deliver(
    mailer: &dyn Mailer,
    email: OutgoingEmail,
    max_attempts: u32,
    base_delay: Duration,
) -> DeliveryReport {
    let outcome = retry_async(max_attempts, base_delay, MailError::is_transient, |_| {
        mailer.send(email.clone())
    })
    .await;
    match outcome.result {
        Ok(()) => DeliveryReport {
            attempts: outcome.attempts,
            error: None,
        },
        Err(err) => {
            tracing::error!(
                to = %email.to,
                subject = %email.subject,
                attempts = outcome.attempts,
                error = %err,
                "email delivery failed"
            );
            DeliveryReport {
                attempts: outcome.attempts,
                error: Some(err.to_string()),
            }
        }
    }
}
