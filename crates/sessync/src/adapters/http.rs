//! Shared HTTP plumbing for the adapters.

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::AdapterError;

/// Build the client shared by every adapter in a process.
pub fn build_client() -> Result<Client, AdapterError> {
    Client::builder()
        .user_agent(concat!("sessync/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AdapterError::Config(format!("HTTP client: {e}")))
}

/// Join a base URL and a path without doubling slashes.
pub fn endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    #[serde(rename = "errorMessages")]
    error_messages: Option<Vec<String>>,
}

/// Map a non-success response to an error, keeping the remote message.
pub async fn check(response: Response) -> Result<Response, AdapterError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| {
            b.message
                .or_else(|| b.error_messages.map(|m| m.join("; ")))
        })
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            let trimmed: String = body.chars().take(200).collect();
            if trimmed.is_empty() {
                status.canonical_reason().unwrap_or("no body").to_string()
            } else {
                trimmed
            }
        });

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AdapterError::Auth(format!("{}: {message}", status.as_u16()))
        }
        _ => AdapterError::Rejected {
            status: status.as_u16(),
            message,
        },
    })
}

/// Check the status and decode the JSON body.
pub async fn json<T: DeserializeOwned>(response: Response) -> Result<T, AdapterError> {
    let response = check(response).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| AdapterError::Transport(format!("unexpected response body: {e}")))
}
