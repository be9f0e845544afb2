use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

use lib_aggregator::providers::github::{CommitActivity, ContributionStats, IssueStats, Stars};
use lib_aggregator::providers::{NewsItem, TweetInfo, VideoInfo};

use super::jsonp;
use super::state::{AppState, BuildInfo};

/// Items returned by the feed endpoints when no `count` is given.
const DEFAULT_COUNT: usize = 3;

#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    count: Option<String>,
    callback: Option<String>,
    jsonp: Option<String>,
}

impl FeedQuery {
    fn callback(&self) -> Option<&str> {
        self.jsonp.as_deref().or(self.callback.as_deref())
    }

    /// Unparsable counts fall back to the default.
    fn count(&self) -> usize {
        self.count
            .as_deref()
            .and_then(|c| c.trim().parse().ok())
            .unwrap_or(DEFAULT_COUNT)
    }

    /// The requested count, or a ready-made 400 when it exceeds `limit`.
    fn bounded_count(&self, limit: usize) -> Result<usize, Response> {
        let count = self.count();
        if count > limit {
            let body = json!({ "error": format!("count must not exceed {}", limit) });
            return Err(jsonp::respond(StatusCode::BAD_REQUEST, &body, self.callback()));
        }
        Ok(count)
    }
}

#[derive(Debug, Serialize)]
struct GitHubSummary {
    stars: Stars,
    contribution: ContributionStats,
    commits: CommitActivity,
    issues: IssueStats,
}

#[derive(Debug, Serialize)]
struct LandingSummary {
    build: BuildInfo,
    versions: BTreeMap<String, String>,
    youtube: Vec<VideoInfo>,
    twitter: Vec<TweetInfo>,
    news: Vec<NewsItem>,
    github: GitHubSummary,
}

impl AppState {
    /// Source-control versions merged with image versions.
    fn versions(&self) -> BTreeMap<String, String> {
        let mut versions = BTreeMap::new();
        if let Some(github) = &self.github {
            versions.extend(github.latest_versions().iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        if let Some(hub) = &self.dockerhub {
            versions.extend(hub.latest_tags().iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        versions
    }

    fn videos(&self, count: usize) -> Vec<VideoInfo> {
        self.youtube.as_ref().map(|y| y.videos(count)).unwrap_or_default()
    }

    fn tweets(&self, count: usize) -> Vec<TweetInfo> {
        self.twitter.as_ref().map(|t| t.tweets(count)).unwrap_or_default()
    }

    fn news_items(&self, count: usize) -> Vec<NewsItem> {
        self.news.as_ref().map(|n| n.news(count)).unwrap_or_default()
    }

    fn github_summary(&self) -> GitHubSummary {
        match &self.github {
            Some(github) => GitHubSummary {
                stars: github.stars(),
                contribution: (*github.contribution_stats()).clone(),
                commits: (*github.commit_activity()).clone(),
                issues: (*github.issue_stats()).clone(),
            },
            None => GitHubSummary {
                stars: Stars::default(),
                contribution: ContributionStats::default(),
                commits: CommitActivity::default(),
                issues: IssueStats::default(),
            },
        }
    }
}

pub fn router(app_state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/", get(landing_handler))
        .route("/info", get(info_handler))
        .route("/versions", get(versions_handler))
        .route("/youtube", get(youtube_handler))
        .route("/twitter", get(twitter_handler))
        .route("/news", get(news_handler))
        .route("/github/stars", get(stars_handler))
        .route("/github/contribution", get(contribution_handler))
        .route("/github/commits", get(commits_handler))
        .route("/github/issues", get(issues_handler))
        .route("/health", get(health_handler))
        .fallback(not_found_handler)
        .layer(cors)
        .with_state(app_state)
}

pub async fn run(port: u16, app_state: AppState, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
    let app = router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("Landing server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.recv().await.ok();
            log::info!("Landing server shutting down.");
        })
        .await?;
    Ok(())
}

async fn landing_handler(State(state): State<AppState>, Query(q): Query<FeedQuery>) -> Response {
    let summary = LandingSummary {
        build: state.build.clone(),
        versions: state.versions(),
        youtube: state.videos(DEFAULT_COUNT),
        twitter: state.tweets(DEFAULT_COUNT),
        news: state.news_items(DEFAULT_COUNT),
        github: state.github_summary(),
    };
    jsonp::respond(StatusCode::OK, &summary, q.callback())
}

async fn info_handler(State(state): State<AppState>, Query(q): Query<FeedQuery>) -> Response {
    jsonp::respond(StatusCode::OK, &state.build, q.callback())
}

async fn versions_handler(State(state): State<AppState>, Query(q): Query<FeedQuery>) -> Response {
    jsonp::respond(StatusCode::OK, &state.versions(), q.callback())
}

async fn youtube_handler(State(state): State<AppState>, Query(q): Query<FeedQuery>) -> Response {
    let limit = state.youtube.as_ref().map_or(state.youtube_buffer_size, |y| y.buffer_size());
    match q.bounded_count(limit) {
        Ok(count) => jsonp::respond(StatusCode::OK, &state.videos(count), q.callback()),
        Err(response) => response,
    }
}

async fn twitter_handler(State(state): State<AppState>, Query(q): Query<FeedQuery>) -> Response {
    let limit = state.twitter.as_ref().map_or(state.twitter_buffer_size, |t| t.buffer_size());
    match q.bounded_count(limit) {
        Ok(count) => jsonp::respond(StatusCode::OK, &state.tweets(count), q.callback()),
        Err(response) => response,
    }
}

async fn news_handler(State(state): State<AppState>, Query(q): Query<FeedQuery>) -> Response {
    jsonp::respond(StatusCode::OK, &state.news_items(q.count()), q.callback())
}

async fn stars_handler(State(state): State<AppState>, Query(q): Query<FeedQuery>) -> Response {
    let stars = state.github.as_ref().map(|g| g.stars()).unwrap_or_default();
    jsonp::respond(StatusCode::OK, &stars, q.callback())
}

async fn contribution_handler(State(state): State<AppState>, Query(q): Query<FeedQuery>) -> Response {
    let contribution = state.github.as_ref().map(|g| g.contribution_stats()).unwrap_or_default();
    jsonp::respond(StatusCode::OK, &*contribution, q.callback())
}

async fn commits_handler(State(state): State<AppState>, Query(q): Query<FeedQuery>) -> Response {
    let commits = state.github.as_ref().map(|g| g.commit_activity()).unwrap_or_default();
    jsonp::respond(StatusCode::OK, &*commits, q.callback())
}

async fn issues_handler(State(state): State<AppState>, Query(q): Query<FeedQuery>) -> Response {
    let issues = state.github.as_ref().map(|g| g.issue_stats()).unwrap_or_default();
    jsonp::respond(StatusCode::OK, &*issues, q.callback())
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })))
}
