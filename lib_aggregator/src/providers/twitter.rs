//! # Twitter Feed
//!
//! Polls the v2 API for recent posts and appends them to a
//! [`RingBuffer<TweetInfo>`]. Two modes, picked from the configured term:
//!
//! - `@handle`: the account's own timeline, without replies and reposts.
//! - anything else: recent-search results for the term.
//!
//! Every poll asks only for posts newer than the last buffered one
//! (`since_id`), so the buffer fills in arrival order and duplicates are not
//! re-added. Delivery is best effort: posts that appear and vanish between two
//! polls are missed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::buf::RingBuffer;
use crate::configs::RefreshSettings;
use crate::core::{retry, RetryError, Scheduler, SchedulerError};
use crate::providers::{require, ProviderError};
use crate::retrieve::{ApiClient, FetchError, HttpOptions};

const DEFAULT_API: &str = "https://api.twitter.com/2/";
/// The v2 endpoints reject `max_results` outside this range.
const MIN_RESULTS: usize = 10;
const MAX_RESULTS: usize = 100;

#[derive(Debug, Clone)]
pub struct TwitterConfig {
    pub bearer_token: String,
    /// `@handle` to follow an account, anything else to search.
    pub search_term: String,
    pub buffer_size: usize,
    pub api_url: String,
}

impl TwitterConfig {
    pub fn new(bearer_token: impl Into<String>, search_term: impl Into<String>, buffer_size: usize) -> Self {
        Self {
            bearer_token: bearer_token.into(),
            search_term: search_term.into(),
            buffer_size,
            api_url: DEFAULT_API.to_string(),
        }
    }
}

/// Short form of a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TweetInfo {
    pub id: String,
    pub text: String,
    /// Display name of the author.
    pub user: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct TweetsResponse {
    #[serde(default)]
    data: Vec<RawTweet>,
    #[serde(default)]
    includes: Option<Includes>,
}

#[derive(Debug, Deserialize)]
struct RawTweet {
    id: String,
    text: String,
    #[serde(default)]
    author_id: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    users: Vec<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    data: RawUser,
}

/// Turns a response (newest first) into buffer order (oldest first), with
/// author ids resolved to display names.
fn to_tweet_infos(response: TweetsResponse) -> Vec<TweetInfo> {
    let names: HashMap<String, String> = response
        .includes
        .unwrap_or_default()
        .users
        .into_iter()
        .map(|u| (u.id, u.name))
        .collect();

    response
        .data
        .into_iter()
        .rev()
        .map(|t| TweetInfo {
            user: t.author_id.and_then(|id| names.get(&id).cloned()).unwrap_or_default(),
            id: t.id,
            text: t.text,
            created_at: t.created_at,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Follow(String),
    Search(String),
}

impl Mode {
    fn from_term(term: &str) -> Self {
        match term.trim().strip_prefix('@') {
            Some(handle) => Mode::Follow(handle.to_string()),
            None => Mode::Search(term.trim().to_string()),
        }
    }
}

/// # Twitter Feed
pub struct TwitterFeed {
    client: ApiClient,
    mode: Mode,
    settings: RefreshSettings,
    /// Resolved once for follow mode.
    user_id: OnceCell<String>,
    buffer: RingBuffer<TweetInfo>,
}

impl TwitterFeed {
    pub fn new(config: TwitterConfig, settings: RefreshSettings) -> Result<Self, ProviderError> {
        require("twitter", "bearer token", &config.bearer_token)?;
        require("twitter", "search term", config.search_term.trim_start_matches('@'))?;
        let buffer =
            RingBuffer::new(config.buffer_size).map_err(|source| ProviderError::Buffer { provider: "twitter", source })?;
        let options = HttpOptions {
            timeout: settings.http_timeout(),
            ..HttpOptions::default()
        };

        Ok(Self {
            client: ApiClient::with_options(&config.api_url, Some(config.bearer_token), options)?,
            mode: Mode::from_term(&config.search_term),
            settings,
            user_id: OnceCell::new(),
            buffer,
        })
    }

    pub fn start(self: &Arc<Self>, scheduler: &Scheduler) -> Result<(), SchedulerError> {
        let this = Arc::clone(self);
        let token = scheduler.cancellation_token();
        scheduler.schedule("twitter-poll", self.settings.twitter(), true, move || {
            let this = Arc::clone(&this);
            let token = token.clone();
            async move { this.refresh(&token).await }
        })
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer.capacity()
    }

    /// Up to `count` newest posts, newest first.
    pub fn tweets(&self, count: usize) -> Vec<TweetInfo> {
        self.buffer.latest(count)
    }

    pub async fn refresh(&self, cancel: &CancellationToken) {
        let since_id = self.buffer.last().map(|t| t.id);
        match retry("twitter-poll", self.settings.retry_policy(), cancel, || self.fetch(since_id.as_deref())).await {
            Ok(tweets) => {
                let added = tweets.len();
                for tweet in tweets {
                    self.buffer.add(tweet);
                }
                log::info!("[twitter-poll] {} new posts, {} buffered.", added, self.buffer.len());
            }
            Err(RetryError::Cancelled) => {}
            Err(e) => log::error!("[twitter-poll] no update this cycle: {}", e),
        }
    }

    fn max_results(&self) -> String {
        self.buffer.capacity().clamp(MIN_RESULTS, MAX_RESULTS).to_string()
    }

    async fn fetch(&self, since_id: Option<&str>) -> Result<Vec<TweetInfo>, FetchError> {
        let max = self.max_results();
        let mut query: Vec<(&str, &str)> = vec![
            ("max_results", max.as_str()),
            ("tweet.fields", "created_at,author_id"),
            ("expansions", "author_id"),
            ("user.fields", "name"),
        ];
        if let Some(id) = since_id {
            query.push(("since_id", id));
        }

        let response: TweetsResponse = match &self.mode {
            Mode::Search(term) => {
                query.push(("query", term.as_str()));
                self.client.get_json("tweets/search/recent", &query).await?
            }
            Mode::Follow(handle) => {
                let user_id = self.resolve_user(handle).await?;
                query.push(("exclude", "replies,retweets"));
                self.client.get_json(&format!("users/{}/tweets", user_id), &query).await?
            }
        };

        let mut tweets = to_tweet_infos(response);
        // Keep only what fits; older posts would be overwritten immediately.
        let overflow = tweets.len().saturating_sub(self.buffer.capacity());
        tweets.drain(..overflow);
        Ok(tweets)
    }

    async fn resolve_user(&self, handle: &str) -> Result<&str, FetchError> {
        let id = self
            .user_id
            .get_or_try_init(|| async {
                let user: UserResponse = self.client.get_json(&format!("users/by/username/{}", handle), &[]).await?;
                log::info!("[twitter-poll] following @{} ({}).", handle, user.data.id);
                Ok::<_, FetchError>(user.data.id)
            })
            .await?;
        Ok(id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn mode_is_picked_from_term() {
        assert_eq!(Mode::from_term("@reportportal_io"), Mode::Follow("reportportal_io".into()));
        assert_eq!(Mode::from_term("#testing"), Mode::Search("#testing".into()));
    }

    #[test]
    fn response_is_reversed_and_authors_resolved() {
        let response: TweetsResponse = serde_json::from_value(json!({
            "data": [
                { "id": "3", "text": "newest", "author_id": "u1", "created_at": "2024-03-01T10:00:00.000Z" },
                { "id": "2", "text": "older", "author_id": "u2" }
            ],
            "includes": { "users": [{ "id": "u1", "name": "John" }] }
        }))
        .unwrap();

        let tweets = to_tweet_infos(response);
        assert_eq!(tweets[0].id, "2");
        assert_eq!(tweets[0].user, "");
        assert_eq!(tweets[1].user, "John");
        assert_eq!(tweets[1].created_at.unwrap().to_rfc3339(), "2024-03-01T10:00:00+00:00");
    }

    #[test]
    fn empty_result_has_no_data_field() {
        let response: TweetsResponse = serde_json::from_value(json!({ "meta": { "result_count": 0 } })).unwrap();
        assert!(to_tweet_infos(response).is_empty());
    }

    #[test]
    fn zero_buffer_is_rejected() {
        let result = TwitterFeed::new(TwitterConfig::new("t", "#rust", 0), RefreshSettings::default());
        assert!(matches!(result, Err(ProviderError::Buffer { provider: "twitter", .. })));
    }

    #[tokio::test]
    async fn follow_mode_polls_timeline_with_since_id() {
        let seen_since = Arc::new(Mutex::new(Vec::<Option<String>>::new()));
        let recorder = Arc::clone(&seen_since);

        let app = Router::new()
            .route(
                "/users/by/username/{handle}",
                get(|Path(handle): Path<String>| async move { Json(json!({ "data": { "id": "42", "name": handle } })) }),
            )
            .route(
                "/users/42/tweets",
                get(move |Query(q): Query<HashMap<String, String>>| {
                    let recorder = Arc::clone(&recorder);
                    async move {
                        let since = q.get("since_id").cloned();
                        recorder.lock().unwrap().push(since.clone());
                        let body = match since.as_deref() {
                            None => json!({
                                "data": [{ "id": "11", "text": "b", "author_id": "42" }, { "id": "10", "text": "a", "author_id": "42" }],
                                "includes": { "users": [{ "id": "42", "name": "RP" }] }
                            }),
                            Some(_) => json!({ "data": [{ "id": "12", "text": "c", "author_id": "42" }] }),
                        };
                        Json(body)
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut config = TwitterConfig::new("token", "@rp", 10);
        config.api_url = base;
        let feed = TwitterFeed::new(config, RefreshSettings::default()).unwrap();
        let token = CancellationToken::new();

        feed.refresh(&token).await;
        feed.refresh(&token).await;

        let ids: Vec<String> = feed.tweets(10).into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["12", "11", "10"]);
        assert_eq!(*seen_since.lock().unwrap(), vec![None, Some("11".to_string())]);
        assert_eq!(feed.tweets(10)[1].user, "RP");
    }
}
