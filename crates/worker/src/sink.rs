use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::jobs::dispatch::Notification;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("channel {0} no longer exists")]
    ChannelGone(String),
    #[error("chat api rejected request: HTTP {0}")]
    Rejected(u16),
    #[error("chat api transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// A channel that was confirmed reachable just before sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTarget {
    pub channel_id: String,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn resolve(&self, channel_id: &str) -> Result<ChannelTarget, SinkError>;

    async fn send(
        &self,
        target: &ChannelTarget,
        notification: &Notification,
    ) -> Result<(), SinkError>;
}

/// Delivers through a chat REST API (`/channels/{id}` and `/channels/{id}/messages`).
pub struct HttpSink {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl HttpSink {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn channel_url(&self, channel_id: &str) -> String {
        format!("{}/channels/{}", self.api_base, channel_id)
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token)
    }
}

#[derive(Debug, Deserialize)]
struct ChannelInfo {
    id: String,
    #[serde(default)]
    thread_metadata: Option<ThreadMetadata>,
}

#[derive(Debug, Deserialize)]
struct ThreadMetadata {
    #[serde(default)]
    archived: bool,
}

impl ChannelInfo {
    fn is_archived(&self) -> bool {
        self.thread_metadata.as_ref().is_some_and(|m| m.archived)
    }
}

#[derive(Debug, Serialize)]
struct MessagePayload<'a> {
    content: &'a str,
    allowed_mentions: AllowedMentions,
}

#[derive(Debug, Serialize)]
struct AllowedMentions {
    parse: [&'static str; 1],
}

impl<'a> MessagePayload<'a> {
    fn new(content: &'a str) -> Self {
        Self {
            content,
            allowed_mentions: AllowedMentions { parse: ["users"] },
        }
    }
}

#[async_trait]
impl NotificationSink for HttpSink {
    async fn resolve(&self, channel_id: &str) -> Result<ChannelTarget, SinkError> {
        let resp = self
            .client
            .get(self.channel_url(channel_id))
            .header("Authorization", self.auth_header())
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SinkError::ChannelGone(channel_id.to_string()));
        }
        if !status.is_success() {
            return Err(SinkError::Rejected(status.as_u16()));
        }

        let info: ChannelInfo = resp.json().await?;
        if info.is_archived() {
            return Err(SinkError::ChannelGone(info.id));
        }
        Ok(ChannelTarget { channel_id: info.id })
    }

    async fn send(
        &self,
        target: &ChannelTarget,
        notification: &Notification,
    ) -> Result<(), SinkError> {
        let resp = self
            .client
            .post(format!("{}/messages", self.channel_url(&target.channel_id)))
            .header("Authorization", self.auth_header())
            .json(&MessagePayload::new(&notification.content))
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(SinkError::Rejected(resp.status().as_u16()))
        }
    }
}
