//! Note database adapter (Notion pages API).
//!
//! Adds one page per session to the configured database. The summary body is
//! split into paragraph blocks because rich text content is capped per block.

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{http, render, AdapterError, Credentials, Published, SessionUpdate};

const NOTION_VERSION: &str = "2022-06-28";
const MAX_BLOCK_CHARS: usize = 2000;

#[derive(Debug, Clone)]
pub struct NoteDatabaseAdapter {
    client: Client,
    api_url: String,
    database_id: String,
    title_property: String,
}

#[derive(Debug, Deserialize)]
struct PageCreated {
    id: String,
}

fn chunk_chars(text: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

fn paragraph(content: &str) -> Value {
    json!({
        "object": "block",
        "type": "paragraph",
        "paragraph": {
            "rich_text": [{ "type": "text", "text": { "content": content } }]
        }
    })
}

impl NoteDatabaseAdapter {
    pub fn new(
        client: Client,
        api_url: String,
        database_id: String,
        title_property: String,
    ) -> Self {
        Self {
            client,
            api_url,
            database_id,
            title_property,
        }
    }

    fn page(&self, update: &SessionUpdate) -> Value {
        let title = render::title("Session Update", update);
        let children: Vec<Value> = chunk_chars(&render::plain_text(update), MAX_BLOCK_CHARS)
            .iter()
            .map(|c| paragraph(c))
            .collect();

        let mut properties = serde_json::Map::new();
        properties.insert(
            self.title_property.clone(),
            json!({ "title": [{ "text": { "content": title } }] }),
        );

        json!({
            "parent": { "database_id": self.database_id },
            "properties": properties,
            "children": children,
        })
    }

    pub async fn send(
        &self,
        update: &SessionUpdate,
        credentials: &Credentials,
    ) -> Result<Published, AdapterError> {
        let token = credentials.expose("token")?;

        let response = self
            .client
            .post(http::endpoint(&self.api_url, "pages"))
            .bearer_auth(token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&self.page(update))
            .send()
            .await?;
        let page: PageCreated = http::json(response).await?;

        tracing::debug!(database = %self.database_id, page_id = %page.id, "Note page created");
        Ok(Published::Created(page.id))
    }
}
