//! # YouTube Channel Feed
//!
//! Keeps the newest videos of one channel. Each refresh is a two-step lookup:
//! `search` for the newest video ids, then `videos` for their details.
//!
//! Both calls send the ETag of the previous answer in `If-None-Match`. A
//! `304 Not Modified` from either step means nothing changed and the current
//! snapshot is kept as is.

use std::sync::{Arc, Mutex, PoisonError};

use reqwest::header::{HeaderMap, HeaderValue, ETAG, IF_NONE_MATCH};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::configs::RefreshSettings;
use crate::core::{retry, RetryError, Scheduler, SchedulerError, SnapshotStore};
use crate::providers::{require, ProviderError};
use crate::retrieve::{ApiClient, FetchError, HttpOptions};

const DEFAULT_API: &str = "https://www.googleapis.com/youtube/v3/";

#[derive(Debug, Clone)]
pub struct YouTubeConfig {
    pub api_key: String,
    pub channel_id: String,
    /// Number of videos kept; also the upper bound for `count` on reads.
    pub buffer_size: usize,
    pub api_url: String,
}

impl YouTubeConfig {
    pub fn new(api_key: impl Into<String>, channel_id: impl Into<String>, buffer_size: usize) -> Self {
        Self {
            api_key: api_key.into(),
            channel_id: channel_id.into(),
            buffer_size,
            api_url: DEFAULT_API.to_string(),
        }
    }
}

/// Short description of a video as served to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub thumbnail: String,
    /// ISO 8601 duration, e.g. `PT4M13S`.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub duration: String,
    pub published_at: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    #[serde(default)]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    snippet: Snippet,
    #[serde(default)]
    content_details: Option<ContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    published_at: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    high: Option<Thumbnail>,
    medium: Option<Thumbnail>,
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    #[serde(default)]
    duration: String,
}

impl From<VideoItem> for VideoInfo {
    fn from(item: VideoItem) -> Self {
        let thumbnails = item.snippet.thumbnails;
        let thumbnail = thumbnails
            .high
            .or(thumbnails.medium)
            .or(thumbnails.default)
            .map(|t| t.url)
            .unwrap_or_default();
        VideoInfo {
            id: item.id,
            title: item.snippet.title,
            thumbnail,
            duration: item.content_details.map(|d| d.duration).unwrap_or_default(),
            published_at: item.snippet.published_at,
        }
    }
}

#[derive(Debug, Default)]
struct ETags {
    search: Option<String>,
    videos: Option<String>,
}

/// # YouTube Feed
pub struct YouTubeFeed {
    client: ApiClient,
    api_key: String,
    channel_id: String,
    buffer_size: usize,
    settings: RefreshSettings,
    etags: Mutex<ETags>,
    videos: SnapshotStore<Vec<VideoInfo>>,
}

fn if_none_match(etag: Option<&str>) -> Option<HeaderMap> {
    let value = HeaderValue::from_str(etag?).ok()?;
    let mut headers = HeaderMap::new();
    headers.insert(IF_NONE_MATCH, value);
    Some(headers)
}

impl YouTubeFeed {
    pub fn new(config: YouTubeConfig, settings: RefreshSettings) -> Result<Self, ProviderError> {
        require("youtube", "API key", &config.api_key)?;
        require("youtube", "channel id", &config.channel_id)?;
        if config.buffer_size == 0 {
            return Err(ProviderError::Buffer {
                provider: "youtube",
                source: crate::buf::BufferError::ZeroCapacity,
            });
        }
        let options = HttpOptions {
            timeout: settings.http_timeout(),
            ..HttpOptions::default()
        };

        Ok(Self {
            client: ApiClient::with_options(&config.api_url, None, options)?,
            api_key: config.api_key,
            channel_id: config.channel_id,
            buffer_size: config.buffer_size,
            settings,
            etags: Mutex::new(ETags::default()),
            videos: SnapshotStore::new(),
        })
    }

    pub fn start(self: &Arc<Self>, scheduler: &Scheduler) -> Result<(), SchedulerError> {
        let this = Arc::clone(self);
        let token = scheduler.cancellation_token();
        scheduler.schedule("youtube-videos", self.settings.youtube(), true, move || {
            let this = Arc::clone(&this);
            let token = token.clone();
            async move { this.refresh(&token).await }
        })
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Up to `count` newest videos, newest first.
    pub fn videos(&self, count: usize) -> Vec<VideoInfo> {
        self.videos.load().iter().take(count).cloned().collect()
    }

    pub async fn refresh(&self, cancel: &CancellationToken) {
        match retry("youtube-videos", self.settings.retry_policy(), cancel, || self.fetch()).await {
            Ok(Some(videos)) => {
                log::info!("[youtube-videos] loaded {} video details.", videos.len());
                self.videos.store(videos);
            }
            Ok(None) => log::info!("[youtube-videos] no new videos."),
            Err(RetryError::Cancelled) => {}
            Err(e) => log::error!("[youtube-videos] keeping previous videos: {}", e),
        }
    }

    /// `Ok(None)` when the remote side reports no change.
    async fn fetch(&self) -> Result<Option<Vec<VideoInfo>>, FetchError> {
        let max = self.buffer_size.to_string();
        let (search_tag, videos_tag) = {
            let etags = self.etags.lock().unwrap_or_else(PoisonError::into_inner);
            (etags.search.clone(), etags.videos.clone())
        };

        let search = self
            .client
            .get::<SearchResponse>(
                "search",
                &[
                    ("part", "id"),
                    ("channelId", self.channel_id.as_str()),
                    ("type", "video"),
                    ("order", "date"),
                    ("maxResults", max.as_str()),
                    ("key", self.api_key.as_str()),
                ],
                if_none_match(search_tag.as_deref()),
            )
            .await?;
        let search_etag = search.header(ETAG.as_str()).map(str::to_string);
        let ids: Vec<String> = match search.into_data() {
            Ok(body) => body.items.into_iter().filter_map(|i| i.id.video_id).collect(),
            Err(FetchError::NotModified) => return Ok(None),
            Err(e) => return Err(e),
        };

        if ids.is_empty() {
            self.remember(search_etag, None);
            return Ok(Some(Vec::new()));
        }

        let joined = ids.join(",");
        let details = self
            .client
            .get::<VideosResponse>(
                "videos",
                &[("part", "snippet,contentDetails"), ("id", joined.as_str()), ("maxResults", max.as_str()), ("key", self.api_key.as_str())],
                if_none_match(videos_tag.as_deref()),
            )
            .await?;
        let videos_etag = details.header(ETAG.as_str()).map(str::to_string);
        let items = match details.into_data() {
            Ok(body) => body.items,
            Err(FetchError::NotModified) => {
                self.remember(search_etag, videos_etag.or(videos_tag));
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        self.remember(search_etag, videos_etag);
        Ok(Some(order_by_ids(&ids, items)))
    }

    fn remember(&self, search: Option<String>, videos: Option<String>) {
        let mut etags = self.etags.lock().unwrap_or_else(PoisonError::into_inner);
        etags.search = search;
        etags.videos = videos;
    }
}

/// Detail responses are not guaranteed to follow the requested id order.
fn order_by_ids(ids: &[String], items: Vec<VideoItem>) -> Vec<VideoInfo> {
    let mut videos: Vec<VideoInfo> = items.into_iter().map(VideoInfo::from).collect();
    videos.sort_by_key(|v| ids.iter().position(|id| *id == v.id).unwrap_or(usize::MAX));
    videos
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::{HeaderMap as Headers, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn spawn_api(search_calls: Arc<AtomicUsize>) -> String {
        let app = Router::new()
            .route(
                "/search",
                get(move |headers: Headers, Query(q): Query<HashMap<String, String>>| {
                    let calls = Arc::clone(&search_calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(q.get("key").map(String::as_str), Some("k"));
                        if headers.get("if-none-match").is_some() {
                            return StatusCode::NOT_MODIFIED.into_response();
                        }
                        (
                            [("etag", "\"s1\"")],
                            Json(json!({ "items": [{ "id": { "videoId": "b" } }, { "id": { "videoId": "a" } }] })),
                        )
                            .into_response()
                    }
                }),
            )
            .route(
                "/videos",
                get(|| async {
                    // Deliberately out of order.
                    Json(json!({ "items": [
                        { "id": "a", "snippet": { "title": "A", "publishedAt": "2024-01-01T00:00:00Z",
                          "thumbnails": { "default": { "url": "http://img/a" } } },
                          "contentDetails": { "duration": "PT1M" } },
                        { "id": "b", "snippet": { "title": "B", "publishedAt": "2024-02-01T00:00:00Z",
                          "thumbnails": { "high": { "url": "http://img/b" } } } }
                    ] }))
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        base
    }

    #[test]
    fn zero_buffer_is_rejected() {
        let result = YouTubeFeed::new(YouTubeConfig::new("k", "chan", 0), RefreshSettings::default());
        assert!(matches!(result, Err(ProviderError::Buffer { .. })));
    }

    #[test]
    fn missing_key_is_rejected() {
        let result = YouTubeFeed::new(YouTubeConfig::new("", "chan", 5), RefreshSettings::default());
        assert!(matches!(result, Err(ProviderError::MissingCredential { what: "API key", .. })));
    }

    #[tokio::test]
    async fn second_refresh_is_not_modified_and_keeps_snapshot() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut config = YouTubeConfig::new("k", "chan", 5);
        config.api_url = spawn_api(Arc::clone(&calls)).await;
        let feed = YouTubeFeed::new(config, RefreshSettings::default()).unwrap();
        let token = CancellationToken::new();

        feed.refresh(&token).await;
        let first = feed.videos(10);
        assert_eq!(first.iter().map(|v| v.id.as_str()).collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(first[0].thumbnail, "http://img/b");
        assert_eq!(first[1].thumbnail, "http://img/a");
        assert_eq!(first[1].duration, "PT1M");

        feed.refresh(&token).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(feed.videos(10), first);
        assert_eq!(feed.videos(1).len(), 1);
    }
}
