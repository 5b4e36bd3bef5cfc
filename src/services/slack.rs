use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

const SLACK_API_URL: &str = "https://slack.com/api";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackMessage {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<SlackAttachment>,
    #[serde(default)]
    pub blocks: Vec<SlackBlock>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackAttachment {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<SlackText>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackText {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    ok: bool,
    error: Option<String>,
    #[serde(default)]
    messages: Vec<SlackMessage>,
}

#[derive(Debug, Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
    thread_ts: &'a str,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    error: Option<String>,
}

pub struct SlackClient {
    client: Client,
    bot_token: String,
}

impl SlackClient {
    pub fn new(bot_token: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, bot_token })
    }

    /// The single message at `ts` in `channel`, if Slack still has it.
    pub async fn message_at(&self, channel: &str, ts: &str) -> Result<Option<SlackMessage>> {
        let response = self
            .client
            .get(format!("{}/conversations.history", SLACK_API_URL))
            .bearer_auth(&self.bot_token)
            .query(&[
                ("channel", channel),
                ("latest", ts),
                ("limit", "1"),
                ("inclusive", "true"),
            ])
            .send()
            .await?;

        let history: HistoryResponse = response.json().await?;
        if !history.ok {
            return Err(AppError::SlackApi(
                history.error.unwrap_or_else(|| "conversations.history failed".to_string()),
            ));
        }
        Ok(history.messages.into_iter().next())
    }

    pub async fn reply_in_thread(&self, channel: &str, thread_ts: &str, text: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/chat.postMessage", SLACK_API_URL))
            .bearer_auth(&self.bot_token)
            .json(&PostMessageRequest {
                channel,
                text,
                thread_ts,
            })
            .send()
            .await?;

        let posted: PostMessageResponse = response.json().await?;
        if !posted.ok {
            return Err(AppError::SlackApi(
                posted.error.unwrap_or_else(|| "chat.postMessage failed".to_string()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_history_with_blocks() {
        let body = r#"{"ok":true,"messages":[{"text":"look","blocks":[{"type":"section","text":{"type":"mrkdwn","text":"<https://example.com/x>"}},{"type":"divider"}]}]}"#;
        let history: HistoryResponse = serde_json::from_str(body).unwrap();
        assert!(history.ok);
        let message = &history.messages[0];
        assert_eq!(message.blocks.len(), 2);
        assert!(message.blocks[1].text.is_none());
    }

    #[test]
    fn decodes_api_errors() {
        let history: HistoryResponse =
            serde_json::from_str(r#"{"ok":false,"error":"channel_not_found"}"#).unwrap();
        assert!(!history.ok);
        assert_eq!(history.error.as_deref(), Some("channel_not_found"));
    }
}
