//! Fire-and-forget email delivery over SMTP.
//!
//! [`Notifier`] owns a bounded queue drained by a fixed number of worker
//! tasks that share one `lettre` async SMTP transport. Enqueueing never
//! waits: when the queue is full the message is dropped and logged.
//! Configuration comes from the environment; without `SMTP_HOST`,
//! [`EmailConfig::from_env`] returns `None` and no notifier is started.

use std::sync::Arc;

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Email build error: {0}")]
    Build(String),
}

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_FROM_ADDRESS: &str = "noreply@campus.local";

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// RFC 5322 "From" address.
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable        | Required | Default                 |
    /// |-----------------|----------|-------------------------|
    /// | `SMTP_HOST`     | yes      |                         |
    /// | `SMTP_PORT`     | no       | `587`                   |
    /// | `SMTP_FROM`     | no       | `noreply@campus.local`  |
    /// | `SMTP_USER`     | no       |                         |
    /// | `SMTP_PASSWORD` | no       |                         |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok().filter(|h| !h.is_empty())?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// One plain-text email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Notification {
    fn into_message(self, from: &str) -> Result<Message, EmailError> {
        Message::builder()
            .from(from.parse()?)
            .to(self.to.parse()?)
            .subject(self.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(self.body)
            .map_err(|e| EmailError::Build(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

type Transport = AsyncSmtpTransport<Tokio1Executor>;

/// Handle to the worker pool. Cheap to clone.
#[derive(Clone)]
pub struct Notifier {
    queue: mpsc::Sender<Notification>,
}

impl Notifier {
    /// Build the SMTP transport and spawn `workers` delivery tasks over a
    /// queue of `capacity` messages. The workers exit once every handle
    /// has been dropped and the queue is drained.
    pub fn start(
        config: &EmailConfig,
        workers: usize,
        capacity: usize,
    ) -> Result<(Self, Vec<JoinHandle<()>>), EmailError> {
        let mut builder = Transport::starttls_relay(&config.smtp_host)?.port(config.smtp_port);
        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        let transport = Arc::new(builder.build());
        let from: Arc<str> = Arc::from(config.from_address.as_str());

        let (notifier, rx) = Self::channel(capacity);
        let rx = Arc::new(Mutex::new(rx));
        let handles = (0..workers.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let transport = Arc::clone(&transport);
                let from = Arc::clone(&from);
                tokio::spawn(async move {
                    loop {
                        let next = rx.lock().await.recv().await;
                        let Some(notification) = next else {
                            break;
                        };
                        let to = notification.to.clone();
                        if let Err(e) = deliver(&transport, &from, notification).await {
                            tracing::warn!(worker, to = %to, error = %e, "Notification email failed");
                        }
                    }
                    tracing::debug!(worker, "Notifier worker stopped");
                })
            })
            .collect();

        tracing::info!(workers = workers.max(1), capacity, "Notifier started");
        Ok((notifier, handles))
    }

    fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (queue, rx) = mpsc::channel(capacity.max(1));
        (Self { queue }, rx)
    }

    /// Enqueue without waiting. Returns `false` when the message was
    /// dropped because the queue is full or closed.
    pub fn notify(&self, notification: Notification) -> bool {
        match self.queue.try_send(notification) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(n)) => {
                tracing::warn!(to = %n.to, "Notification queue full, dropping email");
                false
            }
            Err(mpsc::error::TrySendError::Closed(n)) => {
                tracing::warn!(to = %n.to, "Notifier stopped, dropping email");
                false
            }
        }
    }
}

async fn deliver(transport: &Transport, from: &str, notification: Notification) -> Result<(), EmailError> {
    let to = notification.to.clone();
    let message = notification.into_message(from)?;
    transport.send(message).await?;
    tracing::info!(to = %to, "Notification email sent");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
