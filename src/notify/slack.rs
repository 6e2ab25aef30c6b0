//! Slack transport: `chat.postMessage` over a bearer token, checking the
//! `"ok":true` response field.

use async_trait::async_trait;

use crate::error::NotifyError;
use crate::types::{StatusType, Target};

use super::Transport;

pub struct SlackTransport {
    token: String,
    channel: String,
    client: reqwest::Client,
}

impl SlackTransport {
    pub fn new(token: String, channel: String) -> Self {
        SlackTransport {
            token,
            channel,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Transport for SlackTransport {
    fn name(&self) -> &'static str {
        "slack"
    }

    fn normalize(&self, target: &Target, status: StatusType) -> (String, String) {
        let subject = format!("{}: {:?}", target.display_name(), status);
        let body = format!("{} is now {:?}", target.url, status);
        (subject, body)
    }

    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let text = format!("*{subject}*\n{body}");
        let response = self
            .client
            .post("https://slack.com/api/chat.postMessage")
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "channel": self.channel, "text": text }))
            .send()
            .await
            .map_err(|e| NotifyError::Transport {
                transport: "slack".into(),
                reason: e.to_string(),
            })?;

        let payload: serde_json::Value =
            response.json().await.map_err(|e| NotifyError::Transport {
                transport: "slack".into(),
                reason: e.to_string(),
            })?;

        if payload.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            return Err(NotifyError::Transport {
                transport: "slack".into(),
                reason: format!("unexpected response: {payload}"),
            });
        }
        Ok(())
    }
}
