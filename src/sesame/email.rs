//! Outbound mail.
//!
//! Workflows call [`Mailer::enqueue`], which pushes the message onto an
//! unbounded channel and returns immediately. A background task drains the
//! channel and hands each message to an [`EmailSender`]. Delivery is
//! at-most-once: failures are logged and the message is dropped.
//!
//! `LogEmailSender` is the local default. `WebhookEmailSender` POSTs a JSON
//! document to an HTTP endpoint (a mail relay or provider API).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{error, info, Instrument};
use url::Url;

use crate::APP_USER_AGENT;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to,
            subject = %message.subject,
            body = %message.text,
            "email send stub"
        );
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct WebhookEmailSender {
    client: Client,
    url: Url,
}

impl WebhookEmailSender {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: Url) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build mail webhook client")?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl EmailSender for WebhookEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let response = self
            .client
            .post(self.url.clone())
            .json(message)
            .send()
            .await
            .context("mail webhook request failed")?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(anyhow!("mail webhook rejected message (status={status}): {body}"))
    }
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    from: String,
    webhook_url: Option<Url>,
}

impl MailConfig {
    #[must_use]
    pub fn new(from: String) -> Self {
        Self {
            from,
            webhook_url: None,
        }
    }

    #[must_use]
    pub fn with_webhook_url(mut self, url: Option<Url>) -> Self {
        self.webhook_url = url;
        self
    }

    #[must_use]
    pub fn from(&self) -> &str {
        &self.from
    }

    /// Webhook delivery when a URL is configured, log output otherwise.
    ///
    /// # Errors
    /// Returns an error if the webhook client cannot be built.
    pub fn sender(&self) -> Result<Arc<dyn EmailSender>> {
        match &self.webhook_url {
            Some(url) => Ok(Arc::new(WebhookEmailSender::new(url.clone())?)),
            None => Ok(Arc::new(LogEmailSender)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Mailer {
    from: String,
    tx: mpsc::UnboundedSender<EmailMessage>,
}

impl Mailer {
    /// Create a mailer and the receiving end of its queue.
    #[must_use]
    pub fn channel(from: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<EmailMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                from: from.into(),
                tx,
            },
            rx,
        )
    }

    /// Create a mailer whose queue is drained by a worker using `sender`.
    pub fn spawn(from: impl Into<String>, sender: Arc<dyn EmailSender>) -> (Self, JoinHandle<()>) {
        let (mailer, rx) = Self::channel(from);
        (mailer, spawn_mail_worker(rx, sender))
    }

    /// Queue a message. Returns `false` if the worker is gone.
    pub fn enqueue(&self, to: &str, subject: &str, text: String) -> bool {
        let message = EmailMessage {
            from: self.from.clone(),
            to: to.to_string(),
            subject: subject.to_string(),
            text,
        };

        match self.tx.send(message) {
            Ok(()) => true,
            Err(err) => {
                error!(to_email = %err.0.to, "mail queue closed, message dropped");
                false
            }
        }
    }

    pub fn enqueue_activation(&self, to: &str, username: &str, url: &str) -> bool {
        self.enqueue(
            to,
            "Activate your account",
            format!("Hello {username},\n\nActivate your account by visiting:\n{url}\n"),
        )
    }

    pub fn enqueue_password_reset(&self, to: &str, username: &str, url: &str) -> bool {
        self.enqueue(
            to,
            "Reset your password",
            format!(
                "Hello {username},\n\nA password reset was requested for your account. \
                 Choose a new password by visiting:\n{url}\n\n\
                 If you did not ask for this, ignore this message.\n"
            ),
        )
    }
}

/// Drain `rx`, delivering each message once. Ends when every `Mailer` is dropped.
pub fn spawn_mail_worker(
    mut rx: mpsc::UnboundedReceiver<EmailMessage>,
    sender: Arc<dyn EmailSender>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let span = tracing::info_span!("email.send", to_email = %message.to);
            if let Err(err) = sender.send(&message).instrument(span).await {
                error!("email delivery failed: {err:#}");
            }
        }
    })
}

/// Link embedded in activation messages.
#[must_use]
pub fn activation_url(frontend_base_url: &str, key: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/auth/activate?key={key}")
}

/// Link embedded in password reset messages.
#[must_use]
pub fn reset_url(frontend_base_url: &str, key: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/auth/reset-password?key={key}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<EmailMessage>>,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl EmailSender for Recording {
        async fn send(&self, message: &EmailMessage) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if message.to == "fail@example.com" {
                return Err(anyhow!("smtp relay unavailable"));
            }
            self.sent.lock().await.push(message.clone());
            Ok(())
        }
    }

    #[test]
    fn urls_embed_the_key() {
        assert_eq!(
            activation_url("https://app.example.com/", "abc"),
            "https://app.example.com/auth/activate?key=abc"
        );
        assert_eq!(
            reset_url("http://localhost:8080", "xyz"),
            "http://localhost:8080/auth/reset-password?key=xyz"
        );
    }

    #[tokio::test]
    async fn enqueue_does_not_wait_for_delivery() {
        let (mailer, mut rx) = Mailer::channel("no-reply@example.com");
        assert!(mailer.enqueue_activation(
            "alice@example.com",
            "alice01",
            "http://localhost/auth/activate?key=k"
        ));

        let message = rx.recv().await;
        let message = message.as_ref();
        assert_eq!(message.map(|m| m.to.as_str()), Some("alice@example.com"));
        assert_eq!(
            message.map(|m| m.from.as_str()),
            Some("no-reply@example.com")
        );
        assert!(message.is_some_and(|m| m.text.contains("?key=k")));
    }

    #[tokio::test]
    async fn enqueue_reports_closed_queue() {
        let (mailer, rx) = Mailer::channel("no-reply@example.com");
        drop(rx);
        assert!(!mailer.enqueue("alice@example.com", "subject", "body".to_string()));
    }

    #[tokio::test]
    async fn worker_keeps_going_after_a_failure() -> Result<()> {
        let sender = Arc::new(Recording::default());
        let (mailer, worker) = Mailer::spawn("no-reply@example.com", sender.clone());

        mailer.enqueue("fail@example.com", "first", "body".to_string());
        mailer.enqueue_password_reset("bob@example.com", "bob0001", "http://x/reset");
        drop(mailer);
        worker.await?;

        assert_eq!(sender.attempts.load(Ordering::SeqCst), 2);
        let sent = sender.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "bob@example.com");
        assert_eq!(sent[0].subject, "Reset your password");
        Ok(())
    }

    #[tokio::test]
    async fn log_sender_accepts_everything() -> Result<()> {
        let message = EmailMessage {
            from: "a@example.com".to_string(),
            to: "b@example.com".to_string(),
            subject: "s".to_string(),
            text: "t".to_string(),
        };
        LogEmailSender.send(&message).await
    }

    #[test]
    fn webhook_sender_builds() -> Result<()> {
        let url = Url::parse("http://localhost:9000/mail")?;
        let sender = WebhookEmailSender::new(url)?;
        assert_eq!(sender.url.path(), "/mail");
        Ok(())
    }
}
