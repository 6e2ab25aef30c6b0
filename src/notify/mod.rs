//! Multi-transport notification fan-out: lifecycle messages, per-transport
//! logged-not-fatal send errors, and a serialisation lock so two targets
//! transitioning at once never interleave their sends.

pub mod slack;
pub mod smtp;
pub mod telegram;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::config::types::AlertsConfig;
use crate::error::NotifyError;
use crate::types::{StatusType, Target};

#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;
    fn normalize(&self, target: &Target, status: StatusType) -> (String, String);
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError>;
}

pub struct Notifier {
    transports: Vec<Box<dyn Transport>>,
    lock: Mutex<()>,
    pub initialization_message: bool,
    pub shutdown_message: bool,
}

impl Notifier {
    pub fn from_config(cfg: &AlertsConfig) -> Result<Self, NotifyError> {
        let mut transports: Vec<Box<dyn Transport>> = Vec::new();
        if let Some(slack) = &cfg.slack {
            transports.push(Box::new(slack::SlackTransport::new(
                slack.token.clone(),
                slack.channel.clone(),
            )));
        }
        if let Some(telegram) = &cfg.telegram {
            transports.push(Box::new(telegram::TelegramTransport::new(
                telegram.token.clone(),
                telegram.chat_ids.clone(),
            )));
        }
        if let Some(smtp) = &cfg.smtp {
            transports.push(Box::new(smtp::SmtpTransport::new(smtp.clone())?));
        }
        Ok(Notifier {
            transports,
            lock: Mutex::new(()),
            initialization_message: cfg.initialization_message,
            shutdown_message: cfg.shutdown_message,
        })
    }

    fn transports_for(&self, target: &Target) -> Vec<&Box<dyn Transport>> {
        self.transports
            .iter()
            .filter(|t| target.wants_transport(t.name()))
            .collect()
    }

    pub async fn notify(&self, target: &Target, status: StatusType) {
        let _guard = self.lock.lock().await;
        for transport in self.transports_for(target) {
            let (subject, body) = transport.normalize(target, status);
            if let Err(e) = transport.send(&subject, &body).await {
                tracing::warn!(transport = transport.name(), error = %e, "notification send failed");
                break;
            }
        }
    }

    pub async fn lifecycle(&self, message: &str) {
        let _guard = self.lock.lock().await;
        for transport in &self.transports {
            if let Err(e) = transport.send("watchkeep", message).await {
                tracing::warn!(transport = transport.name(), error = %e, "lifecycle message failed");
            }
        }
    }

    pub async fn startup(&self) {
        if self.initialization_message {
            self.lifecycle("online").await;
        }
    }

    pub async fn shutdown(&self) {
        if self.shutdown_message {
            self.lifecycle("offline").await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use std::sync::Mutex as StdMutex;

    struct RecordingTransport {
        name: &'static str,
        sent: StdArc<StdMutex<Vec<(String, String)>>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        fn name(&self) -> &'static str {
            self.name
        }

        fn normalize(&self, target: &Target, status: StatusType) -> (String, String) {
            (
                format!("{} is {:?}", target.display_name(), status),
                target.url.clone(),
            )
        }

        async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
            self.sent
                .lock()
                .unwrap()
                .push((subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn test_target(alerts: Vec<String>) -> Target {
        Target {
            id: "t1".into(),
            kind: crate::types::TargetKind::Http,
            url: "https://example.com".into(),
            method: None,
            headers: Default::default(),
            name: None,
            description: None,
            group: None,
            tags: vec![],
            interval: std::time::Duration::from_secs(30),
            timeout: std::time::Duration::from_secs(1),
            initial_delay: std::time::Duration::ZERO,
            success_threshold: 2,
            failure_threshold: 3,
            conditions: crate::types::Conditions::default(),
            alerts,
            hidden: false,
            index: 0,
        }
    }

    fn notifier_with(transports: Vec<Box<dyn Transport>>) -> Notifier {
        Notifier {
            transports,
            lock: Mutex::new(()),
            initialization_message: true,
            shutdown_message: true,
        }
    }

    #[tokio::test]
    async fn notify_only_reaches_transports_the_target_opted_into() {
        let slack_sent = StdArc::new(StdMutex::new(Vec::new()));
        let telegram_sent = StdArc::new(StdMutex::new(Vec::new()));
        let notifier = notifier_with(vec![
            Box::new(RecordingTransport {
                name: "slack",
                sent: StdArc::clone(&slack_sent),
            }),
            Box::new(RecordingTransport {
                name: "telegram",
                sent: StdArc::clone(&telegram_sent),
            }),
        ]);

        let target = test_target(vec!["slack".to_string()]);
        notifier.notify(&target, StatusType::Down).await;

        assert_eq!(slack_sent.lock().unwrap().len(), 1);
        assert!(telegram_sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn a_target_with_no_alert_list_reaches_every_transport() {
        let slack_sent = StdArc::new(StdMutex::new(Vec::new()));
        let telegram_sent = StdArc::new(StdMutex::new(Vec::new()));
        let notifier = notifier_with(vec![
            Box::new(RecordingTransport {
                name: "slack",
                sent: StdArc::clone(&slack_sent),
            }),
            Box::new(RecordingTransport {
                name: "telegram",
                sent: StdArc::clone(&telegram_sent),
            }),
        ]);

        let target = test_target(vec![]);
        notifier.notify(&target, StatusType::Up).await;

        assert_eq!(slack_sent.lock().unwrap().len(), 1);
        assert_eq!(telegram_sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn startup_and_shutdown_emit_lifecycle_messages_to_every_transport() {
        let sent = StdArc::new(StdMutex::new(Vec::new()));
        let notifier = notifier_with(vec![Box::new(RecordingTransport {
            name: "slack",
            sent: StdArc::clone(&sent),
        })]);

        notifier.startup().await;
        notifier.shutdown().await;

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].1, "online");
        assert_eq!(sent[1].1, "offline");
    }

    #[tokio::test]
    async fn lifecycle_messages_are_suppressed_when_disabled() {
        let sent = StdArc::new(StdMutex::new(Vec::new()));
        let mut notifier = notifier_with(vec![Box::new(RecordingTransport {
            name: "slack",
            sent: StdArc::clone(&sent),
        })]);
        notifier.initialization_message = false;
        notifier.shutdown_message = false;

        notifier.startup().await;
        notifier.shutdown().await;

        assert!(sent.lock().unwrap().is_empty());
    }
}
