//! Slack-compatible Web API sink (`chat.postMessage` / `chat.update`)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ChatError, ChatSink, MessageId};
use crate::config::ChatConfig;
use crate::constants;

#[derive(Debug, Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_ts: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct UpdateMessage<'a> {
    channel: &'a str,
    ts: &'a str,
    text: &'a str,
}

/// Every Web API reply carries `ok`; failures carry `error`
#[derive(Debug, Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ApiReply {
    fn into_result(self) -> Result<Option<String>, ChatError> {
        if self.ok {
            Ok(self.ts)
        } else {
            Err(ChatError::Api(
                self.error.unwrap_or_else(|| "unknown_error".to_string()),
            ))
        }
    }
}

pub struct HttpChatSink {
    http: Client,
    api_base: String,
    token: String,
}

impl HttpChatSink {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Self {
        let http = Client::builder()
            .connect_timeout(constants::http::CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub fn from_config(config: &ChatConfig) -> Result<Self, ChatError> {
        let token = config.token.clone().ok_or(ChatError::MissingToken)?;
        Ok(Self::new(config.api_base.clone(), token))
    }

    async fn call<B: Serialize + ?Sized>(&self, method: &str, body: &B) -> Result<ApiReply, ChatError> {
        let url = format!("{}/{}", self.api_base, method);
        debug!("Calling chat API {}", method);

        let response = self
            .http
            .post(&url)
            .header("authorization", format!("Bearer {}", self.token))
            .header("content-type", "application/json; charset=utf-8")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!("Chat API {} returned {}: {}", method, status, text);
            return Err(ChatError::Api(format!("HTTP {}", status)));
        }

        Ok(response.json::<ApiReply>().await?)
    }
}

#[async_trait]
impl ChatSink for HttpChatSink {
    async fn post(
        &self,
        channel: &str,
        thread: Option<&str>,
        text: &str,
    ) -> Result<MessageId, ChatError> {
        let body = PostMessage {
            channel,
            text,
            thread_ts: thread,
        };
        self.call("chat.postMessage", &body)
            .await?
            .into_result()?
            .ok_or_else(|| ChatError::Api("reply carried no message ts".to_string()))
    }

    async fn update(&self, channel: &str, message_id: &str, text: &str) -> Result<(), ChatError> {
        let body = UpdateMessage {
            channel,
            ts: message_id,
            text,
        };
        self.call("chat.update", &body).await?.into_result()?;
        Ok(())
    }
}
