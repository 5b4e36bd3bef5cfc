use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, Result};

use super::{ArticleSource, SourceArticle};

const OMNIVORE_API_URL: &str = "https://api-prod.omnivore.app/api/graphql";

const SEARCH_QUERY: &str = r#"
query RecentArticles($after: String, $first: Int) {
    search(after: $after, first: $first, query: "", includeContent: true) {
        ... on SearchSuccess {
            edges {
                node {
                    id
                    title
                    savedAt
                    url
                    content
                }
            }
        }
        ... on SearchError {
            errorCodes
        }
    }
}
"#;

const SAVE_URL_MUTATION: &str = r#"
mutation SaveUrl($input: SaveUrlInput!) {
    saveUrl(input: $input) {
        ... on SaveSuccess {
            url
            clientRequestId
        }
        ... on SaveError {
            errorCodes
            message
        }
    }
}
"#;

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    search: SearchResult,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    edges: Option<Vec<SearchEdge>>,
    #[serde(rename = "errorCodes", default)]
    error_codes: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct SearchEdge {
    node: SearchNode,
}

#[derive(Debug, Deserialize)]
struct SearchNode {
    title: String,
    url: String,
    #[serde(rename = "savedAt")]
    saved_at: DateTime<Utc>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SaveData {
    #[serde(rename = "saveUrl")]
    save_url: SaveResult,
}

#[derive(Debug, Deserialize)]
struct SaveResult {
    url: Option<String>,
    #[serde(rename = "errorCodes")]
    error_codes: Option<Vec<String>>,
    message: Option<String>,
}

pub struct OmnivoreClient {
    client: Client,
    api_key: String,
}

impl OmnivoreClient {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, api_key })
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        let response = self
            .client
            .post(OMNIVORE_API_URL)
            .header("Authorization", &self.api_key)
            .json(&GraphQlRequest { query, variables })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(AppError::OmnivoreApi(format!("HTTP {status}: {error_text}")));
        }

        let body: GraphQlResponse<T> = response.json().await?;
        if let Some(error) = body.errors.first() {
            return Err(AppError::OmnivoreApi(error.message.clone()));
        }
        body.data
            .ok_or_else(|| AppError::OmnivoreApi("response had no data".to_string()))
    }
}

#[async_trait]
impl ArticleSource for OmnivoreClient {
    async fn recent_articles(&self, first: usize) -> Result<Vec<SourceArticle>> {
        let data: SearchData = self
            .post(SEARCH_QUERY, json!({ "after": null, "first": first }))
            .await?;

        if let Some(codes) = data.search.error_codes {
            return Err(AppError::OmnivoreApi(format!("search failed: {}", codes.join(", "))));
        }

        let articles = data
            .search
            .edges
            .unwrap_or_default()
            .into_iter()
            .map(|edge| SourceArticle {
                title: edge.node.title,
                url: edge.node.url,
                content: edge.node.content.unwrap_or_default(),
                saved_at: edge.node.saved_at,
            })
            .collect();
        Ok(articles)
    }

    async fn save_url(&self, url: &str, label: &str) -> Result<String> {
        let url = url.trim_end_matches('>');
        let variables = json!({
            "input": {
                "clientRequestId": Uuid::new_v4().to_string(),
                "source": "api",
                "url": url,
                "labels": [{ "name": label }],
            }
        });

        let data: SaveData = self.post(SAVE_URL_MUTATION, variables).await?;
        match data.save_url {
            SaveResult { url: Some(saved), .. } => {
                tracing::info!("Saved {} to Omnivore with label {}", saved, label);
                Ok(saved)
            }
            SaveResult {
                error_codes: Some(codes),
                message,
                ..
            } => Err(AppError::OmnivoreApi(format!(
                "save failed ({}): {}",
                codes.join(", "),
                message.unwrap_or_else(|| "no message".to_string())
            ))),
            _ => Err(AppError::OmnivoreApi("unexpected saveUrl response".to_string())),
        }
    }
}
