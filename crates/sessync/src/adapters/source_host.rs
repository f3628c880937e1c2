//! Source host adapter (GitHub REST API).
//!
//! Comments on each referenced issue (`#12` or `issue-12`) of the configured
//! repository, in reference order. A failed issue does not stop the rest.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{http, render, AdapterError, Credentials, ItemResults, Published, SessionUpdate};

#[derive(Debug, Clone)]
pub struct SourceHostAdapter {
    client: Client,
    api_url: String,
    repository: String,
}

#[derive(Debug, Deserialize)]
struct CommentCreated {
    id: u64,
}

/// Issue number from `#12`, `12` or `issue-12` (any case).
fn issue_number(item: &str) -> Option<u64> {
    let digits = item
        .strip_prefix('#')
        .or_else(|| {
            item.get(..6)
                .filter(|p| p.eq_ignore_ascii_case("issue-"))
                .map(|_| &item[6..])
        })
        .unwrap_or(item);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl SourceHostAdapter {
    pub fn new(client: Client, api_url: String, repository: String) -> Self {
        Self {
            client,
            api_url,
            repository,
        }
    }

    fn check_repository(&self) -> Result<(), AdapterError> {
        match self.repository.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(())
            }
            _ => Err(AdapterError::Config(format!(
                "repository `{}` is not in owner/name form",
                self.repository
            ))),
        }
    }

    pub async fn send(
        &self,
        update: &SessionUpdate,
        credentials: &Credentials,
    ) -> Result<Published, AdapterError> {
        self.check_repository()?;

        let mut numbers: Vec<u64> = Vec::new();
        for n in update.references.work_items.iter().filter_map(|i| issue_number(i)) {
            if !numbers.contains(&n) {
                numbers.push(n);
            }
        }
        if numbers.is_empty() {
            return Ok(Published::NothingToDo(
                "no issue numbers referenced".to_string(),
            ));
        }

        let token = credentials.expose("token")?;
        let body = json!({ "body": render::markdown(update) });

        let mut results = ItemResults::default();
        for number in numbers {
            let result = self.comment(number, token, &body).await;
            results.record(&format!("#{number}"), result);
        }
        results.finish()
    }

    async fn comment(
        &self,
        number: u64,
        token: &str,
        body: &serde_json::Value,
    ) -> Result<String, AdapterError> {
        let url = http::endpoint(
            &self.api_url,
            &format!("repos/{}/issues/{number}/comments", self.repository),
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .json(body)
            .send()
            .await?;
        let comment: CommentCreated = http::json(response).await?;

        tracing::debug!(issue = number, comment_id = comment.id, "Issue comment added");
        Ok(format!("#{number}:{}", comment.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessync_core::extract::{extract, ExtractionPatterns};
    use sessync_core::SessionSummary;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn update(text: &str) -> SessionUpdate {
        SessionUpdate {
            project: "Atlas".to_string(),
            summary: SessionSummary::new(text),
            references: extract(text, &ExtractionPatterns::defaults()),
            categories: Vec::new(),
        }
    }

    #[test]
    fn parses_issue_references() {
        assert_eq!(issue_number("#42"), Some(42));
        assert_eq!(issue_number("Issue-7"), Some(7));
        assert_eq!(issue_number("ATL-7"), None);
        assert_eq!(issue_number("#"), None);
    }

    #[tokio::test]
    async fn comments_once_per_issue() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/atlas/issues/41/comments"))
            .and(header("authorization", "Bearer ghp_test"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 555 })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = SourceHostAdapter::new(Client::new(), server.uri(), "acme/atlas".to_string());
        let creds = Credentials::from_pairs(&[("token", "ghp_test")]);
        let published = adapter
            .send(&update("Closed #41, follow-up to issue-41"), &creds)
            .await
            .unwrap();

        assert_eq!(published, Published::Created("#41:555".to_string()));
    }

    #[tokio::test]
    async fn missing_issue_does_not_stop_the_next() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/atlas/issues/3/comments"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/atlas/issues/4/comments"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 8 })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = SourceHostAdapter::new(Client::new(), server.uri(), "acme/atlas".to_string());
        let creds = Credentials::from_pairs(&[("token", "ghp_test")]);
        let published = adapter.send(&update("Fixed #3 and #4"), &creds).await.unwrap();

        match published {
            Published::Created(reference) => {
                assert!(reference.starts_with("#4:8; failed: "));
                assert!(reference.contains("#3: "));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_repository_is_config_error() {
        let adapter = SourceHostAdapter::new(
            Client::new(),
            "http://127.0.0.1:9".to_string(),
            "atlas".to_string(),
        );
        let creds = Credentials::from_pairs(&[("token", "t")]);
        let err = adapter.send(&update("#1"), &creds).await.unwrap_err();
        assert!(matches!(err, AdapterError::Config(_)));
    }
}
