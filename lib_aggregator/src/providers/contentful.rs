//! # Contentful News Feed
//!
//! Reads `newsFeed` entries from the Contentful delivery API and keeps them as
//! a snapshot of short news items.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::configs::RefreshSettings;
use crate::core::{retry, RetryError, Scheduler, SchedulerError, SnapshotStore};
use crate::providers::{require, ProviderError};
use crate::retrieve::{ApiClient, FetchError, HttpOptions};

const DEFAULT_API: &str = "https://cdn.contentful.com/";
const CONTENT_TYPE: &str = "newsFeed";

#[derive(Debug, Clone)]
pub struct ContentfulConfig {
    pub space_id: String,
    /// Delivery API access token.
    pub token: String,
    /// Maximum number of entries fetched per refresh.
    pub limit: usize,
    pub api_url: String,
}

impl ContentfulConfig {
    pub fn new(space_id: impl Into<String>, token: impl Into<String>, limit: usize) -> Self {
        Self {
            space_id: space_id.into(),
            token: token.into(),
            limit,
            api_url: DEFAULT_API.to_string(),
        }
    }
}

/// One news entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EntriesResponse {
    #[serde(default)]
    items: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    fields: NewsItem,
}

/// # Contentful Aggregator
pub struct ContentfulAggregator {
    client: ApiClient,
    space_id: String,
    limit: usize,
    settings: RefreshSettings,
    news: SnapshotStore<Vec<NewsItem>>,
}

impl ContentfulAggregator {
    pub fn new(config: ContentfulConfig, settings: RefreshSettings) -> Result<Self, ProviderError> {
        require("contentful", "space id", &config.space_id)?;
        require("contentful", "access token", &config.token)?;
        let options = HttpOptions {
            timeout: settings.http_timeout(),
            ..HttpOptions::default()
        };

        Ok(Self {
            client: ApiClient::with_options(&config.api_url, Some(config.token), options)?,
            space_id: config.space_id,
            limit: config.limit.max(1),
            settings,
            news: SnapshotStore::new(),
        })
    }

    pub fn start(self: &Arc<Self>, scheduler: &Scheduler) -> Result<(), SchedulerError> {
        let this = Arc::clone(self);
        let token = scheduler.cancellation_token();
        scheduler.schedule("contentful-news", self.settings.cms(), true, move || {
            let this = Arc::clone(&this);
            let token = token.clone();
            async move { this.refresh(&token).await }
        })
    }

    /// Up to `count` items, in the order the CMS returned them.
    pub fn news(&self, count: usize) -> Vec<NewsItem> {
        self.news.load().iter().take(count).cloned().collect()
    }

    pub async fn refresh(&self, cancel: &CancellationToken) {
        match retry("contentful-news", self.settings.retry_policy(), cancel, || self.fetch()).await {
            Ok(items) => {
                log::info!("[contentful-news] loaded {} news items.", items.len());
                self.news.store(items);
            }
            Err(RetryError::Cancelled) => {}
            Err(e) => log::error!("[contentful-news] keeping previous items: {}", e),
        }
    }

    async fn fetch(&self) -> Result<Vec<NewsItem>, FetchError> {
        let path = format!("spaces/{}/entries", self.space_id);
        let limit = self.limit.to_string();
        let response: EntriesResponse = self
            .client
            .get_json(&path, &[("select", "fields"), ("content_type", CONTENT_TYPE), ("limit", limit.as_str())])
            .await?;
        Ok(response.items.into_iter().map(|e| e.fields).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn missing_space_is_rejected() {
        let result = ContentfulAggregator::new(ContentfulConfig::new("", "t", 5), RefreshSettings::default());
        assert!(matches!(result, Err(ProviderError::MissingCredential { what: "space id", .. })));
    }

    #[tokio::test]
    async fn loads_news_items_with_bearer_token() {
        let app = Router::new().route(
            "/spaces/sp1/entries",
            get(|headers: HeaderMap, Query(q): Query<HashMap<String, String>>| async move {
                let authorized = headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer tok");
                if !authorized || q.get("content_type").map(String::as_str) != Some("newsFeed") {
                    return Err(StatusCode::UNAUTHORIZED);
                }
                Ok(Json(json!({ "items": [
                    { "fields": { "text": "Release 5.11", "hashtags": ["release"] } },
                    { "fields": { "text": "Webinar" } },
                    { "sys": { "id": "no-fields" } }
                ] })))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut config = ContentfulConfig::new("sp1", "tok", 10);
        config.api_url = base;
        let cms = ContentfulAggregator::new(config, RefreshSettings::default()).unwrap();
        cms.refresh(&CancellationToken::new()).await;

        let news = cms.news(2);
        assert_eq!(news.len(), 2);
        assert_eq!(news[0].hashtags, vec!["release"]);
        assert!(news[1].hashtags.is_empty());
        assert_eq!(cms.news(10).len(), 3);
    }
}
