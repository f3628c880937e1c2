//! Chat notifier adapter (Slack Web API).
//!
//! Posts one message to the configured channel. Slack answers HTTP 200 for
//! most failures and reports them in the `{ ok, error }` envelope.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{http, render, AdapterError, Credentials, Published, SessionUpdate};

const AUTH_ERRORS: &[&str] = &[
    "not_authed",
    "invalid_auth",
    "account_inactive",
    "token_revoked",
    "token_expired",
    "missing_scope",
];

#[derive(Debug, Clone)]
pub struct ChatNotifierAdapter {
    client: Client,
    api_url: String,
    channel: String,
}

#[derive(Debug, Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

impl ChatNotifierAdapter {
    pub fn new(client: Client, api_url: String, channel: String) -> Self {
        Self {
            client,
            api_url,
            channel,
        }
    }

    pub async fn send(
        &self,
        update: &SessionUpdate,
        credentials: &Credentials,
    ) -> Result<Published, AdapterError> {
        let token = credentials.expose("token")?;
        let text = render::chat(update);

        let response = self
            .client
            .post(http::endpoint(&self.api_url, "chat.postMessage"))
            .bearer_auth(token)
            .json(&PostMessageRequest {
                channel: &self.channel,
                text: &text,
            })
            .send()
            .await?;
        let result: SlackResponse = http::json(response).await?;

        if !result.ok {
            let error = result.error.unwrap_or_else(|| "unknown_error".to_string());
            return Err(if AUTH_ERRORS.contains(&error.as_str()) {
                AdapterError::Auth(error)
            } else {
                AdapterError::Rejected {
                    status: 200,
                    message: error,
                }
            });
        }

        tracing::debug!(channel = %self.channel, "Chat message sent");
        Ok(Published::Created(
            result.ts.unwrap_or_else(|| self.channel.clone()),
        ))
    }
}
