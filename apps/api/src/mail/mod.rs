//! Outgoing email. Handlers build an `OutgoingMail` from a template and hand
//! it to whichever `Mailer` the app was started with.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::MailConfig;

pub mod templates;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("mail API error (status {status}): {body}")]
    Api { status: u16, body: String },
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

#[derive(Serialize)]
struct SendEmailPayload<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    text: &'a str,
}

/// Sends mail through a Resend-style JSON API (`POST` with a bearer key).
#[derive(Clone)]
pub struct HttpMailer {
    client: Client,
    config: MailConfig,
    from: String,
}

impl HttpMailer {
    pub fn new(config: MailConfig, from: String) -> Result<Self, MailError> {
        let client = Client::builder()
            .user_agent(concat!("here-i-am/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            config,
            from,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let payload = SendEmailPayload {
            from: &self.from,
            to: vec![&mail.to],
            subject: &mail.subject,
            text: &mail.text,
        };

        let started = Instant::now();
        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        debug!(
            "Mail API responded {status} in {} ms",
            started.elapsed().as_millis()
        );

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Api {
                status: status.as_u16(),
                body,
            });
        }

        info!("Sent '{}' mail to {}", mail.subject, mail.to);
        Ok(())
    }
}

/// Logs mail instead of sending it. Keeps a copy of everything "sent".
#[derive(Clone, Default)]
pub struct LogMailer {
    outbox: Arc<Mutex<Vec<OutgoingMail>>>,
}

impl LogMailer {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.outbox.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        info!(
            "Mail delivery disabled; would send '{}' to {}",
            mail.subject, mail.to
        );
        if let Ok(mut outbox) = self.outbox.lock() {
            outbox.push(mail);
        }
        Ok(())
    }
}
