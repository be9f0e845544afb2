//! Runs the GitHub aggregator end to end against an in-process mock of the
//! REST API: a two-page repository listing, tags, a statistics endpoint that
//! answers 202 before it has data, and one repository that always fails.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use lib_aggregator::configs::RefreshSettings;
use lib_aggregator::core::Scheduler;
use lib_aggregator::providers::github::{GitHubAggregator, GitHubConfig, StatRange};

#[derive(Clone)]
struct Mock {
    base: String,
    stats_calls: Arc<AtomicUsize>,
    list_fails: Arc<std::sync::atomic::AtomicBool>,
    tags_fail: Arc<std::sync::atomic::AtomicBool>,
}

fn repo(base: &str, name: &str, stars: u64, open: u64) -> Value {
    json!({
        "name": name,
        "full_name": format!("rp/{name}"),
        "stargazers_count": stars,
        "open_issues_count": open,
        "tags_url": format!("{base}repos/rp/{name}/tags"),
    })
}

async fn list_repos(State(mock): State<Mock>, Query(q): Query<HashMap<String, String>>) -> Response {
    if mock.list_fails.load(Ordering::SeqCst) {
        return (StatusCode::FORBIDDEN, "rate limited").into_response();
    }
    match q.get("page").map(String::as_str) {
        Some("2") => Json(json!([repo(&mock.base, "ui", 5, 0), repo(&mock.base, "broken", 1, 0)])).into_response(),
        _ => {
            let mut headers = HeaderMap::new();
            let link = format!(r#"<{}orgs/rp/repos?page=2>; rel="next""#, mock.base);
            headers.insert("link", HeaderValue::from_str(&link).unwrap());
            (headers, Json(json!([repo(&mock.base, "api", 10, 4)]))).into_response()
        }
    }
}

async fn tags(State(mock): State<Mock>, Path(name): Path<String>, Query(q): Query<HashMap<String, String>>) -> Response {
    if mock.tags_fail.load(Ordering::SeqCst) {
        return StatusCode::NOT_FOUND.into_response();
    }
    match (name.as_str(), q.get("page").map(String::as_str)) {
        // Name-ordered like GitHub: the newest release is on the second page.
        ("api", Some("2")) => Json(json!([{ "name": "5.10.0" }])).into_response(),
        ("api", _) => {
            let mut headers = HeaderMap::new();
            let link = format!(r#"<{}repos/rp/api/tags?page=2>; rel="next""#, mock.base);
            headers.insert("link", HeaderValue::from_str(&link).unwrap());
            (headers, Json(json!([{ "name": "5.11.0-beta" }, { "name": "5.9.3" }]))).into_response()
        }
        ("ui", _) => Json(json!([{ "name": "latest" }])).into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn contributors(State(mock): State<Mock>, Path(name): Path<String>) -> Response {
    if name == "broken" {
        return StatusCode::NOT_FOUND.into_response();
    }
    // GitHub computes statistics lazily; the first request for each repo is 202.
    if mock.stats_calls.fetch_add(1, Ordering::SeqCst) < 2 {
        return (StatusCode::ACCEPTED, Json(json!({}))).into_response();
    }
    Json(json!([
        { "author": { "login": "alice" }, "weeks": [{ "c": 3 }, { "c": 2 }] },
        { "author": { "login": format!("{name}-dev") }, "weeks": [{ "c": 1 }, { "c": 0 }] }
    ]))
    .into_response()
}

async fn commit_activity(Path(name): Path<String>) -> Response {
    let weekly = if name == "api" { 2 } else { 0 };
    let weeks: Vec<Value> = (0..52).map(|_| json!({ "total": weekly })).collect();
    Json(Value::Array(weeks)).into_response()
}

async fn pulls(Path(name): Path<String>) -> Response {
    let open = if name == "api" { 1 } else { 0 };
    let pulls: Vec<Value> = (0..open).map(|n| json!({ "number": n })).collect();
    Json(Value::Array(pulls)).into_response()
}

async fn spawn_github() -> Mock {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mock = Mock {
        base: format!("http://{}/", listener.local_addr().unwrap()),
        stats_calls: Arc::new(AtomicUsize::new(0)),
        list_fails: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        tags_fail: Arc::new(std::sync::atomic::AtomicBool::new(false)),
    };

    let app = Router::new()
        .route("/orgs/rp/repos", get(list_repos))
        .route("/repos/rp/{name}/tags", get(tags))
        .route("/repos/rp/{name}/stats/contributors", get(contributors))
        .route("/repos/rp/{name}/stats/commit_activity", get(commit_activity))
        .route("/repos/rp/{name}/pulls", get(pulls))
        .with_state(mock.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    mock
}

fn fast_settings() -> RefreshSettings {
    RefreshSettings {
        retry_attempts: 3,
        retry_delay_secs: 0,
        fan_out_concurrency: 2,
        ..RefreshSettings::default()
    }
}

fn aggregator(mock: &Mock) -> Arc<GitHubAggregator> {
    let mut config = GitHubConfig::new("rp");
    config.api_url = mock.base.clone();
    config.token = Some("test-token".into());
    Arc::new(GitHubAggregator::new(config, fast_settings()).unwrap())
}

#[tokio::test]
async fn refresh_cycle_publishes_every_aggregate() {
    let mock = spawn_github().await;
    let github = aggregator(&mock);
    let cancel = CancellationToken::new();

    github.refresh_repositories(&cancel).await;
    let names: Vec<String> = github.repositories().iter().map(|r| r.full_name.clone()).collect();
    assert_eq!(names, vec!["rp/api", "rp/ui", "rp/broken"]);

    github.refresh_versions(&cancel).await;
    let versions = github.latest_versions();
    assert_eq!(versions.get("rp/api").map(String::as_str), Some("5.10.0"));
    assert!(!versions.contains_key("rp/ui"));
    assert!(!versions.contains_key("rp/broken"));

    github.refresh_contribution(&cancel).await;
    let contribution = github.contribution_stats();
    // api and ui each: alice 2 + dev 0 last week; alice 5 + dev 1 over four weeks.
    assert_eq!(contribution.commits[&StatRange::WEEK], 4);
    assert_eq!(contribution.commits[&StatRange::MONTH], 12);
    // alice is counted once across repositories.
    assert_eq!(contribution.unique_contributors[&StatRange::WEEK], 1);
    assert_eq!(contribution.unique_contributors[&StatRange::MONTH], 3);

    github.refresh_commit_activity(&cancel).await;
    let activity = github.commit_activity();
    assert_eq!(activity.commits[&StatRange::MONTH], 8);
    assert_eq!(activity.active_repositories[&StatRange::QUARTER], 1);

    github.refresh_issues(&cancel).await;
    let issues = github.issue_stats();
    assert_eq!(issues.open_pull_requests, 1);
    assert_eq!(issues.open_issues, 3);
    assert_eq!(issues.repositories.len(), 3);

    let stars = github.stars();
    assert_eq!(stars.total, 16);
}

#[tokio::test]
async fn failed_listing_keeps_previous_repositories() {
    let mock = spawn_github().await;
    let github = aggregator(&mock);
    let cancel = CancellationToken::new();

    github.refresh_repositories(&cancel).await;
    assert_eq!(github.repositories().len(), 3);

    mock.list_fails.store(true, Ordering::SeqCst);
    github.refresh_repositories(&cancel).await;
    assert_eq!(github.repositories().len(), 3);
}

#[tokio::test]
async fn versions_survive_a_cycle_where_every_repository_fails() {
    let mock = spawn_github().await;
    let github = aggregator(&mock);
    let cancel = CancellationToken::new();

    github.refresh_repositories(&cancel).await;
    github.refresh_versions(&cancel).await;
    assert_eq!(github.latest_versions().get("rp/api").map(String::as_str), Some("5.10.0"));

    mock.tags_fail.store(true, Ordering::SeqCst);
    github.refresh_versions(&cancel).await;
    assert_eq!(github.latest_versions().get("rp/api").map(String::as_str), Some("5.10.0"));
}

#[tokio::test]
async fn scheduled_jobs_fill_snapshots_and_stop_on_shutdown() {
    let mock = spawn_github().await;
    let github = aggregator(&mock);
    let scheduler = Scheduler::new();

    github.start(&scheduler).unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    while github.latest_versions().is_empty() || github.issue_stats().repositories.is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "snapshots were not published in time");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    scheduler.shutdown().await;
    assert_eq!(scheduler.running_jobs(), 0);
}
