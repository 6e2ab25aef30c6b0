//! Telegram transport: parallel fan-out to every configured chat id with
//! all-success semantics — one failed chat id fails the whole send.

use async_trait::async_trait;
use futures::future::try_join_all;

use crate::error::NotifyError;
use crate::types::{StatusType, Target};

use super::Transport;

pub struct TelegramTransport {
    token: String,
    chat_ids: Vec<i64>,
    client: reqwest::Client,
}

impl TelegramTransport {
    pub fn new(token: String, chat_ids: Vec<i64>) -> Self {
        TelegramTransport {
            token,
            chat_ids,
            client: reqwest::Client::new(),
        }
    }

    fn icon(status: StatusType) -> &'static str {
        match status {
            StatusType::Up => "\u{2705}",
            StatusType::Degraded => "\u{26A0}\u{FE0F}",
            StatusType::Down => "\u{1F6A8}",
            StatusType::Unknown => "\u{2753}",
        }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn normalize(&self, target: &Target, status: StatusType) -> (String, String) {
        let subject = format!("{} {}", Self::icon(status), target.display_name());
        let body = format!("{}\n{} is now {:?}", subject, target.url, status);
        (subject, body)
    }

    async fn send(&self, _subject: &str, body: &str) -> Result<(), NotifyError> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        let sends = self.chat_ids.iter().map(|chat_id| {
            let url = url.clone();
            let body = body.to_string();
            let client = self.client.clone();
            async move {
                let response = client
                    .post(&url)
                    .json(&serde_json::json!({ "chat_id": chat_id, "text": body }))
                    .send()
                    .await
                    .map_err(|e| NotifyError::Transport {
                        transport: "telegram".into(),
                        reason: e.to_string(),
                    })?;
                if !response.status().is_success() {
                    return Err(NotifyError::Transport {
                        transport: "telegram".into(),
                        reason: format!("chat {chat_id} returned {}", response.status()),
                    });
                }
                Ok::<(), NotifyError>(())
            }
        });
        try_join_all(sends).await?;
        Ok(())
    }
}
