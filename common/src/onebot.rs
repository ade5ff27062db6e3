use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::impl_from_str_for_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    GROUP,
    PRIVATE,
}

impl_from_str_for_enum!(MessageKind, GROUP, PRIVATE);

/// Where a reply for an incoming message has to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTarget {
    Group(i64),
    Private(i64),
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    message_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    group_id: Option<i64>,
    message: &'a str,
    auto_escape: bool,
}

impl<'a> SendMessageRequest<'a> {
    fn new(target: MessageTarget, message: &'a str) -> Self {
        let (message_type, user_id, group_id) = match target {
            MessageTarget::Group(group_id) => ("group", None, Some(group_id)),
            MessageTarget::Private(user_id) => ("private", Some(user_id), None),
        };
        Self {
            message_type,
            user_id,
            group_id,
            message,
            auto_escape: true,
        }
    }
}

/// Client for the OneBot v11 HTTP API exposed by the QQ bot host.
#[derive(Clone)]
pub struct OneBotClient {
    http: reqwest::Client,
    api_url: Option<String>,
    access_token: Option<String>,
}

impl OneBotClient {
    pub fn new(api_url: Option<String>, access_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.map(|url| url.trim_end_matches('/').to_string()),
            access_token,
        }
    }

    /// Without an API url nothing can be pushed; replies must ride on the
    /// event response instead.
    pub fn is_connected(&self) -> bool {
        self.api_url.is_some()
    }

    pub async fn send_message(&self, target: MessageTarget, message: &str) -> Result<()> {
        let Some(api_url) = &self.api_url else {
            debug!(?target, "No OneBot API configured, dropping message");
            return Ok(());
        };

        let url = format!("{}/send_msg", api_url);
        let request = SendMessageRequest::new(target, message);

        let mut builder = self.http.post(&url).json(&request);
        if let Some(token) = &self.access_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .context("OneBot send_msg request failed")?;
        info!(?target, status = %response.status(), "OneBot send_msg");

        if !response.status().is_success() {
            let error_text = response.text().await?;
            error!("OneBot API error: {}", error_text);
            return Ok(());
        }

        // The host answers 200 with its own status field even on failure.
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if body.get("status").and_then(Value::as_str) == Some("failed") {
            error!(retcode = ?body.get("retcode"), "OneBot rejected send_msg");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_kind_parses_case_insensitively() {
        assert_eq!("group".parse::<MessageKind>().unwrap(), MessageKind::GROUP);
        assert_eq!("private".parse::<MessageKind>().unwrap(), MessageKind::PRIVATE);
        assert!("guild".parse::<MessageKind>().is_err());
    }

    #[test]
    fn send_request_carries_only_the_target_id() {
        let group = serde_json::to_value(SendMessageRequest::new(MessageTarget::Group(42), "hi"))
            .unwrap();
        assert_eq!(group["message_type"], "group");
        assert_eq!(group["group_id"], 42);
        assert!(group.get("user_id").is_none());

        let private =
            serde_json::to_value(SendMessageRequest::new(MessageTarget::Private(7), "hi")).unwrap();
        assert_eq!(private["message_type"], "private");
        assert_eq!(private["user_id"], 7);
        assert!(private.get("group_id").is_none());
    }

    #[tokio::test]
    async fn sending_without_api_is_a_no_op() -> anyhow::Result<()> {
        let client = OneBotClient::new(None, None);
        assert!(!client.is_connected());
        client.send_message(MessageTarget::Private(1), "hello").await?;
        Ok(())
    }
}
