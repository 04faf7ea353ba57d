//! Outbound mail contract.
//!
//! Handlers never wait on delivery: mail is sent from a background task and
//! failures are logged. [`LogMailer`] is the bundled implementation; it
//! records each delivery as a structured event instead of talking SMTP.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub const USER_WELCOME: &str = "user_welcome";
pub const TOKEN_ACTIVATION: &str = "token_activation";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("unknown template: {0}")]
    UnknownTemplate(String),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipient: &str, template: &str, data: Value) -> Result<(), MailError>;
}

/// Mailer that writes deliveries to the log.
#[derive(Debug, Clone)]
pub struct LogMailer {
    sender: String,
}

impl LogMailer {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, recipient: &str, template: &str, data: Value) -> Result<(), MailError> {
        if ![USER_WELCOME, TOKEN_ACTIVATION].contains(&template) {
            return Err(MailError::UnknownTemplate(template.to_string()));
        }

        // The payload carries token plaintext; only its keys are logged.
        let fields: Vec<&str> = data
            .as_object()
            .map(|map| map.keys().map(String::as_str).collect())
            .unwrap_or_default();
        tracing::info!(
            sender = %self.sender,
            recipient,
            template,
            fields = ?fields,
            "Mail delivered"
        );
        Ok(())
    }
}
