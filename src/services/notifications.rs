//! Shipping notifications.
//!
//! Emails are handed to a bounded queue drained by a single background
//! worker. Enqueueing never blocks the request that triggered it: a full
//! queue is reported immediately and each accepted email gets a
//! [`DeliveryHandle`] that resolves once the worker has finished with it.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::middleware_helpers::retry::{with_retry, RetryConfig, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Error)]
pub enum MailerError {
    #[error("mail transport failed: {0}")]
    Transport(String),

    #[error("mail provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Retries transport failures, throttling and provider-side errors.
struct MailerRetryPolicy;

impl RetryPolicy<MailerError> for MailerRetryPolicy {
    fn is_retryable(&self, error: &MailerError) -> bool {
        match error {
            MailerError::Transport(_) => true,
            MailerError::Rejected { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailerError>;
}

/// Sends through a JSON mail API (`POST {from,to,subject,html}` with a
/// bearer key).
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpMailer {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailerError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(message)
            .send()
            .await
            .map_err(|e| MailerError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(MailerError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Writes messages to the log. Used when no mail provider is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailerError> {
        info!(to = %message.to, subject = %message.subject, "email (log mailer)");
        Ok(())
    }
}

pub fn mailer_from_config(config: &AppConfig) -> Arc<dyn Mailer> {
    match &config.mailer_api_key {
        Some(key) if !key.trim().is_empty() => {
            Arc::new(HttpMailer::new(config.mailer_api_url.clone(), key.clone()))
        }
        _ => {
            warn!("mailer_api_key not set; shipping emails will only be logged");
            Arc::new(LogMailer)
        }
    }
}

/// Order that just moved to `shipped`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShippingEmail {
    pub order_id: Uuid,
    pub to: String,
    pub customer_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryReport {
    Delivered { attempts: u32 },
    Failed { attempts: u32, error: String },
    /// The worker stopped before handling the email
    Abandoned,
}

/// Resolves once the worker finished with one queued email.
#[derive(Debug)]
pub struct DeliveryHandle {
    rx: oneshot::Receiver<DeliveryReport>,
}

impl DeliveryHandle {
    pub async fn wait(self) -> DeliveryReport {
        self.rx.await.unwrap_or(DeliveryReport::Abandoned)
    }
}

struct Job {
    email: ShippingEmail,
    done: oneshot::Sender<DeliveryReport>,
}

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub capacity: usize,
    pub retry: RetryConfig,
    pub from: String,
    pub shop_name: String,
}

impl From<&AppConfig> for NotifierConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            capacity: cfg.email_queue_capacity,
            retry: cfg.email_retry(),
            from: cfg.mailer_from.clone(),
            shop_name: cfg.shop_name.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ShippingNotifier {
    tx: mpsc::Sender<Job>,
}

impl ShippingNotifier {
    /// Starts the worker. Must be called inside a tokio runtime; the worker
    /// exits once every notifier clone is dropped and the queue is drained.
    pub fn spawn(mailer: Arc<dyn Mailer>, config: NotifierConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let worker = tokio::spawn(run_worker(rx, mailer, config));
        (Self { tx }, worker)
    }

    /// Queues an email without waiting. Fails when the queue is full or the
    /// worker is gone.
    pub fn enqueue(&self, email: ShippingEmail) -> Result<DeliveryHandle, ServiceError> {
        let (done, rx) = oneshot::channel();
        let order_id = email.order_id;
        self.tx
            .try_send(Job { email, done })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    warn!(%order_id, "shipping email queue full");
                    ServiceError::QueueError("shipping email queue is full".into())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    error!(%order_id, "shipping email worker stopped");
                    ServiceError::QueueError("shipping email worker stopped".into())
                }
            })?;
        Ok(DeliveryHandle { rx })
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn render_shipping_email(email: &ShippingEmail, from: &str, shop_name: &str) -> EmailMessage {
    let short_id = email.order_id.simple().to_string()[..8].to_uppercase();
    let greeting = email
        .customer_name
        .as_deref()
        .map(|name| format!("Hi {},", escape_html(name)))
        .unwrap_or_else(|| "Hi there,".to_string());

    EmailMessage {
        from: from.to_string(),
        to: email.to.clone(),
        subject: format!("Your {} order #{} has shipped", shop_name, short_id),
        html: format!(
            "<p>{}</p><p>Good news: your order <strong>#{}</strong> is on its way.</p><p>Thanks for shopping with {}.</p>",
            greeting,
            short_id,
            escape_html(shop_name)
        ),
    }
}

async fn run_worker(mut rx: mpsc::Receiver<Job>, mailer: Arc<dyn Mailer>, config: NotifierConfig) {
    while let Some(job) = rx.recv().await {
        let report = deliver(mailer.as_ref(), &job.email, &config).await;
        // caller may have dropped the handle
        let _ = job.done.send(report);
    }
    info!("shipping notification worker stopped");
}

#[instrument(skip(mailer, email, config), fields(order_id = %email.order_id))]
async fn deliver(mailer: &dyn Mailer, email: &ShippingEmail, config: &NotifierConfig) -> DeliveryReport {
    let message = render_shipping_email(email, &config.from, &config.shop_name);
    let report = with_retry(&config.retry, &MailerRetryPolicy, || mailer.send(&message)).await;

    match report.result {
        Ok(()) => {
            info!(attempts = report.attempts, "shipping email sent");
            DeliveryReport::Delivered {
                attempts: report.attempts,
            }
        }
        Err(e) => {
            error!(attempts = report.attempts, error = %e, "shipping email failed");
            DeliveryReport::Failed {
                attempts: report.attempts,
                error: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Fails the first `failures` sends with the given error status.
    struct FlakyMailer {
        failures: u32,
        status: u16,
        calls: AtomicU32,
        sent: Mutex<Vec<EmailMessage>>,
    }

    impl FlakyMailer {
        fn new(failures: u32, status: u16) -> Self {
            Self {
                failures,
                status,
                calls: AtomicU32::new(0),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Mailer for FlakyMailer {
        async fn send(&self, message: &EmailMessage) -> Result<(), MailerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(MailerError::Rejected {
                    status: self.status,
                    body: "nope".into(),
                });
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn config(capacity: usize) -> NotifierConfig {
        NotifierConfig {
            capacity,
            retry: RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                backoff_factor: 2.0,
            },
            from: "orders@shop.test".into(),
            shop_name: "Shop".into(),
        }
    }

    fn email() -> ShippingEmail {
        ShippingEmail {
            order_id: Uuid::new_v4(),
            to: "buyer@example.com".into(),
            customer_name: Some("Ada".into()),
        }
    }

    #[tokio::test]
    async fn retries_server_errors_until_delivered() {
        let mailer = Arc::new(FlakyMailer::new(2, 503));
        let (notifier, _worker) = ShippingNotifier::spawn(mailer.clone(), config(8));

        let report = notifier.enqueue(email()).unwrap().wait().await;
        assert_eq!(report, DeliveryReport::Delivered { attempts: 3 });
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let mailer = Arc::new(FlakyMailer::new(5, 422));
        let (notifier, _worker) = ShippingNotifier::spawn(mailer.clone(), config(8));

        let report = notifier.enqueue(email()).unwrap().wait().await;
        assert!(matches!(report, DeliveryReport::Failed { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn full_queue_is_reported_without_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let notifier = ShippingNotifier { tx };

        assert!(notifier.enqueue(email()).is_ok());
        assert!(matches!(
            notifier.enqueue(email()),
            Err(ServiceError::QueueError(_))
        ));
    }

    #[tokio::test]
    async fn dropped_worker_abandons_pending_handles() {
        let (tx, rx) = mpsc::channel(4);
        let notifier = ShippingNotifier { tx };
        let handle = notifier.enqueue(email()).unwrap();
        drop(rx);
        assert_eq!(handle.wait().await, DeliveryReport::Abandoned);
    }

    #[test]
    fn rendered_email_names_the_order() {
        let email = email();
        let message = render_shipping_email(&email, "orders@shop.test", "Shop");
        let short = email.order_id.simple().to_string()[..8].to_uppercase();
        assert!(message.subject.contains(&short));
        assert!(message.html.contains("Hi Ada,"));
        assert_eq!(message.to, "buyer@example.com");
    }

    #[test]
    fn customer_name_is_escaped_in_html() {
        let mut email = email();
        email.customer_name = Some("<script>alert(\"x\")</script> & Co".into());
        let message = render_shipping_email(&email, "orders@shop.test", "Shop");
        assert!(!message.html.contains("<script>"));
        assert!(message
            .html
            .contains("Hi &lt;script&gt;alert(&quot;x&quot;)&lt;/script&gt; &amp; Co,"));
    }
}
