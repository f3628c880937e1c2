//! Wiki adapter (Confluence Cloud content API).
//!
//! Creates one page per session in the configured space, optionally under a
//! parent page. A single POST; the new page ID is the external reference.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{http, render, AdapterError, Credentials, Published, SessionUpdate};

#[derive(Debug, Clone)]
pub struct WikiAdapter {
    client: Client,
    base_url: String,
    space_key: String,
    parent_page_id: Option<String>,
    title_prefix: String,
}

#[derive(Debug, Deserialize)]
struct PageCreated {
    id: String,
}

impl WikiAdapter {
    pub fn new(
        client: Client,
        base_url: String,
        space_key: String,
        parent_page_id: Option<String>,
        title_prefix: String,
    ) -> Self {
        Self {
            client,
            base_url,
            space_key,
            parent_page_id,
            title_prefix,
        }
    }

    fn page(&self, update: &SessionUpdate) -> serde_json::Value {
        let mut page = json!({
            "type": "page",
            "title": render::title(&self.title_prefix, update),
            "space": { "key": self.space_key },
            "body": {
                "storage": {
                    "value": render::storage_html(update),
                    "representation": "storage"
                }
            }
        });
        if let Some(parent) = &self.parent_page_id {
            page["ancestors"] = json!([{ "id": parent }]);
        }
        page
    }

    pub async fn send(
        &self,
        update: &SessionUpdate,
        credentials: &Credentials,
    ) -> Result<Published, AdapterError> {
        let username = credentials.expose("username")?;
        let token = credentials.expose("api_token")?;

        let response = self
            .client
            .post(http::endpoint(&self.base_url, "wiki/rest/api/content"))
            .basic_auth(username, Some(token))
            .json(&self.page(update))
            .send()
            .await?;
        let page: PageCreated = http::json(response).await?;

        tracing::debug!(space = %self.space_key, page_id = %page.id, "Wiki page created");
        Ok(Published::Created(format!("page {}", page.id)))
    }
}
