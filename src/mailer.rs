//! Outgoing email: verification codes, auto-delivered goods and admin
//! broadcasts.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::providers::REQUEST_TIMEOUT;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail relay unreachable: {0}")]
    Transport(String),
    #[error("mail relay refused message: HTTP {0}")]
    Refused(u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailError>;
}

/// Hands messages to an HTTP mail relay as JSON.
#[derive(Debug, Clone)]
pub struct RelayMailer {
    client: Client,
    relay_url: String,
    from: String,
}

impl RelayMailer {
    pub fn new(relay_url: impl Into<String>, from: impl Into<String>) -> Result<Self, MailError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MailError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            relay_url: relay_url.into(),
            from: from.into(),
        })
    }
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    #[serde(flatten)]
    email: &'a Email,
}

#[async_trait]
impl Mailer for RelayMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        let response = self
            .client
            .post(&self.relay_url)
            .json(&RelayMessage {
                from: &self.from,
                email: &email,
            })
            .send()
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(MailError::Refused(response.status().as_u16()));
        }
        info!(to = %email.to, subject = %email.subject, "mail relayed");
        Ok(())
    }
}

/// Used when no relay is configured: the message only reaches the log.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        info!(to = %email.to, subject = %email.subject, "mail relay not configured, message dropped");
        Ok(())
    }
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    outbox: Mutex<Vec<Email>>,
}

impl MemoryMailer {
    pub fn sent(&self) -> Vec<Email> {
        self.outbox.lock().clone()
    }

    pub fn sent_to(&self, to: &str) -> Vec<Email> {
        self.outbox
            .lock()
            .iter()
            .filter(|e| e.to == to)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        self.outbox.lock().push(email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_payload_flattens_email() {
        let email = Email {
            to: "a@b.test".into(),
            subject: "Hi".into(),
            html: "<p>x</p>".into(),
        };
        let json = serde_json::to_value(RelayMessage {
            from: "shop@test",
            email: &email,
        })
        .unwrap();
        assert_eq!(json["from"], "shop@test");
        assert_eq!(json["to"], "a@b.test");
        assert_eq!(json["html"], "<p>x</p>");
    }

    #[tokio::test]
    async fn memory_mailer_records() {
        let mailer = MemoryMailer::default();
        mailer
            .send(Email {
                to: "x@y.test".into(),
                subject: "s".into(),
                html: "h".into(),
            })
            .await
            .unwrap();
        assert_eq!(mailer.sent_to("x@y.test").len(), 1);
        assert!(mailer.sent_to("other@y.test").is_empty());
    }
}
