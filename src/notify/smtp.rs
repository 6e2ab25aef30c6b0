//! SMTP transport: enforces a minimum 1s gap between consecutive sends and
//! keeps the underlying connection warm for 10s after the last message.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::types::SmtpConfig;
use crate::error::NotifyError;
use crate::types::{StatusType, Target};

use super::Transport;

const MIN_GAP: Duration = Duration::from_secs(1);
const KEEPALIVE: Duration = Duration::from_secs(10);

pub struct SmtpTransport {
    config: SmtpConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
    last_sent: Mutex<Option<Instant>>,
}

impl SmtpTransport {
    pub fn new(config: SmtpConfig) -> Result<Self, NotifyError> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| NotifyError::Transport {
                transport: "smtp".into(),
                reason: format!("invalid smtp host {}: {e}", config.host),
            })?
            .credentials(creds)
            .port(config.port);
        if config.skip_verify {
            builder = builder.tls(lettre::transport::smtp::client::Tls::None);
        }
        // Keeping the pool's idle connection warm for KEEPALIVE approximates
        // the source's "leave the dialer open 10s after the last send".
        let pool_config = lettre::transport::smtp::PoolConfig::new().idle_timeout(KEEPALIVE);
        let transport = builder.pool_config(pool_config).build();
        Ok(SmtpTransport {
            config,
            transport,
            last_sent: Mutex::new(None),
        })
    }

    async fn wait_for_gap(&self) {
        let wait = {
            let last = self.last_sent.lock().expect("smtp pacing lock poisoned");
            last.and_then(|t| MIN_GAP.checked_sub(t.elapsed()))
        };
        if let Some(wait) = wait {
            tokio::time::sleep(wait).await;
        }
    }

    fn mark_sent(&self) {
        *self.last_sent.lock().expect("smtp pacing lock poisoned") = Some(Instant::now());
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    fn name(&self) -> &'static str {
        "smtp"
    }

    fn normalize(&self, target: &Target, status: StatusType) -> (String, String) {
        let subject = format!("[{:?}] {}", status, target.display_name());
        let body = format!("{} is now {:?}", target.url, status);
        (subject, body)
    }

    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.wait_for_gap().await;

        let from: Mailbox = self
            .config
            .from
            .parse()
            .map_err(|e| NotifyError::Transport {
                transport: "smtp".into(),
                reason: format!("invalid from address: {e}"),
            })?;

        for to_addr in &self.config.to {
            let to: Mailbox = to_addr.parse().map_err(|e| NotifyError::Transport {
                transport: "smtp".into(),
                reason: format!("invalid to address {to_addr}: {e}"),
            })?;
            let email = Message::builder()
                .from(from.clone())
                .to(to)
                .subject(subject)
                .body(body.to_string())
                .map_err(|e| NotifyError::Transport {
                    transport: "smtp".into(),
                    reason: e.to_string(),
                })?;
            self.transport
                .send(email)
                .await
                .map_err(|e| NotifyError::Transport {
                    transport: "smtp".into(),
                    reason: e.to_string(),
                })?;
        }

        self.mark_sent();
        Ok(())
    }
}
