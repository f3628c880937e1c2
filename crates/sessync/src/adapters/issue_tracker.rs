//! Issue tracker adapter (Jira Cloud REST v3).
//!
//! Adds one comment per referenced issue key, in reference order. A key the
//! tracker rejects does not stop the keys after it. Basic auth with
//! `username` + `api_token`.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{http, render, AdapterError, Credentials, ItemResults, Published, SessionUpdate};

#[derive(Debug, Clone)]
pub struct IssueTrackerAdapter {
    client: Client,
    base_url: String,
    project_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentCreated {
    id: String,
}

impl IssueTrackerAdapter {
    pub fn new(client: Client, base_url: String, project_key: Option<String>) -> Self {
        Self {
            client,
            base_url,
            project_key,
        }
    }

    /// Referenced work items that look like keys of this tracker.
    fn issue_keys<'a>(&self, update: &'a SessionUpdate) -> Vec<&'a str> {
        update
            .references
            .work_items
            .iter()
            .map(String::as_str)
            .filter(|item| match split_key(item) {
                Some((project, _)) => self.project_key.as_deref().map_or(true, |k| k == project),
                None => false,
            })
            .collect()
    }

    fn comment_body(update: &SessionUpdate) -> serde_json::Value {
        let heading = render::title("Session Update", update);
        json!({
            "body": {
                "type": "doc",
                "version": 1,
                "content": [
                    { "type": "paragraph", "content": [{ "type": "text", "text": heading }] },
                    { "type": "paragraph", "content": [{ "type": "text", "text": render::plain_text(update) }] }
                ]
            }
        })
    }

    pub async fn send(
        &self,
        update: &SessionUpdate,
        credentials: &Credentials,
    ) -> Result<Published, AdapterError> {
        let keys = self.issue_keys(update);
        if keys.is_empty() {
            return Ok(Published::NothingToDo(
                "no issue keys referenced".to_string(),
            ));
        }

        let username = credentials.expose("username")?;
        let token = credentials.expose("api_token")?;
        let body = Self::comment_body(update);

        let mut results = ItemResults::default();
        for key in keys {
            let result = self.comment(key, username, token, &body).await;
            results.record(key, result);
        }
        results.finish()
    }

    async fn comment(
        &self,
        key: &str,
        username: &str,
        token: &str,
        body: &serde_json::Value,
    ) -> Result<String, AdapterError> {
        let url = http::endpoint(&self.base_url, &format!("rest/api/3/issue/{key}/comment"));
        let response = self
            .client
            .post(&url)
            .basic_auth(username, Some(token))
            .json(body)
            .send()
            .await?;
        let comment: CommentCreated = http::json(response).await?;

        tracing::debug!(issue = %key, comment_id = %comment.id, "Issue comment added");
        Ok(format!("{key}#{}", comment.id))
    }
}

/// Split `PROJ-123` into `("PROJ", "123")`.
fn split_key(item: &str) -> Option<(&str, &str)> {
    let (project, number) = item.split_once('-')?;
    let mut chars = project.chars();
    let well_formed = chars.next().is_some_and(|c| c.is_ascii_uppercase())
        && project.len() >= 2
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        && !number.is_empty()
        && number.chars().all(|c| c.is_ascii_digit());
    well_formed.then_some((project, number))
}
