//! # GitHub Organization Aggregator
//!
//! Keeps a set of organization-wide aggregates fresh in the background:
//!
//! | Job                  | Source endpoint                          | Snapshot              |
//! |----------------------|------------------------------------------|-----------------------|
//! | `github-repos`       | `/orgs/{org}/repos` (paginated)          | `Vec<Repository>`     |
//! | `github-versions`    | `tags_url` of each repository            | [`VersionMap`]        |
//! | `github-contributors`| `/repos/{repo}/stats/contributors`       | [`ContributionStats`] |
//! | `github-commits`     | `/repos/{repo}/stats/commit_activity`    | [`CommitActivity`]    |
//! | `github-issues`      | `/repos/{repo}/pulls?state=open`         | [`IssueStats`]        |
//!
//! Stars are derived from the repository list on read.
//!
//! Detail jobs work off a copy of the last published repository list and wait
//! for the first one before their first run. A failed listing keeps the
//! previous list, so detail jobs keep working with slightly stale input.
//!
//! The statistics endpoints answer `202 Accepted` while GitHub computes the
//! numbers in the background; that surfaces as [`FetchError::Pending`] and is
//! absorbed by the per-repository retry.

pub mod stats;

use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::de::IgnoredAny;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::configs::RefreshSettings;
use crate::core::{collect_pages, latest_version, retry, FanOut, FanOutReport, Page, RetryError, Scheduler, SchedulerError, SnapshotStore};
use crate::providers::{require, ProviderError, VersionMap};
use crate::retrieve::{next_link_from_headers, ApiClient, FetchError, HttpOptions};

pub use stats::{
    CommitActivity, ContributionStats, ContributionTally, IssueStats, RepoIssueCounts, Repository, StatRange, Stars,
};
use stats::{ContributorStats, Tag, WeeklyCommits};

const DEFAULT_API: &str = "https://api.github.com/";
const PER_PAGE: &str = "100";

/// Construction parameters for [`GitHubAggregator`].
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// Organization whose repositories are aggregated.
    pub org: String,
    /// Personal access token. Anonymous access works but is heavily rate limited.
    pub token: Option<String>,
    /// Keep tags containing `beta` when picking the latest version.
    pub include_beta: bool,
    /// API root, overridable for tests.
    pub api_url: String,
}

impl GitHubConfig {
    pub fn new(org: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            token: None,
            include_beta: false,
            api_url: DEFAULT_API.to_string(),
        }
    }
}

/// # GitHub Aggregator
pub struct GitHubAggregator {
    client: ApiClient,
    org: String,
    include_beta: bool,
    settings: RefreshSettings,

    repos: SnapshotStore<Vec<Repository>>,
    repos_ready: watch::Sender<bool>,
    versions: SnapshotStore<VersionMap>,
    contribution: SnapshotStore<ContributionStats>,
    commits: SnapshotStore<CommitActivity>,
    issues: SnapshotStore<IssueStats>,
}

fn github_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
    headers.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));
    headers
}

impl GitHubAggregator {
    /// Builds the aggregator. Nothing is fetched until [`GitHubAggregator::start`].
    ///
    /// # Errors
    /// An empty organization name or an unusable API URL.
    pub fn new(config: GitHubConfig, settings: RefreshSettings) -> Result<Self, ProviderError> {
        require("github", "organization", &config.org)?;

        let token = config.token.filter(|t| !t.trim().is_empty());
        if token.is_none() {
            log::warn!("GitHub token not set; requests will use the anonymous rate limit.");
        }
        let options = HttpOptions {
            timeout: settings.http_timeout(),
            ..HttpOptions::default()
        };
        let client = ApiClient::with_options(&config.api_url, token, options)?;
        let (repos_ready, _) = watch::channel(false);

        Ok(Self {
            client,
            org: config.org,
            include_beta: config.include_beta,
            settings,
            repos: SnapshotStore::new(),
            repos_ready,
            versions: SnapshotStore::new(),
            contribution: SnapshotStore::new(),
            commits: SnapshotStore::new(),
            issues: SnapshotStore::new(),
        })
    }

    /// # Start
    ///
    /// Registers every refresh job. The repository list loads immediately;
    /// detail jobs run as soon as the first list is published and then on
    /// their own periods.
    pub fn start(self: &Arc<Self>, scheduler: &Scheduler) -> Result<(), SchedulerError> {
        let cancel = scheduler.cancellation_token();
        let s = &self.settings;

        let this = Arc::clone(self);
        let token = cancel.clone();
        scheduler.schedule("github-repos", s.repo_list(), true, move || {
            let this = Arc::clone(&this);
            let token = token.clone();
            async move { this.refresh_repositories(&token).await }
        })?;

        self.schedule_detail(scheduler, "github-versions", s.versions(), |this, token| async move {
            this.refresh_versions(&token).await
        })?;
        self.schedule_detail(scheduler, "github-contributors", s.contributor_stats(), |this, token| async move {
            this.refresh_contribution(&token).await
        })?;
        self.schedule_detail(scheduler, "github-commits", s.commit_stats(), |this, token| async move {
            this.refresh_commit_activity(&token).await
        })?;
        self.schedule_detail(scheduler, "github-issues", s.issue_stats(), |this, token| async move {
            this.refresh_issues(&token).await
        })?;

        Ok(())
    }

    fn schedule_detail<F, Fut>(
        self: &Arc<Self>,
        scheduler: &Scheduler,
        name: &'static str,
        period: std::time::Duration,
        job: F,
    ) -> Result<(), SchedulerError>
    where
        F: Fn(Arc<Self>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let this = Arc::clone(self);
        let token = scheduler.cancellation_token();
        let job = Arc::new(job);
        scheduler.schedule(name, period, true, move || {
            let this = Arc::clone(&this);
            let token = token.clone();
            let job = Arc::clone(&job);
            async move {
                if !this.wait_for_repositories(&token).await {
                    return;
                }
                job(this, token).await;
            }
        })
    }

    /// Waits until a repository list has been published. `false` on cancellation.
    async fn wait_for_repositories(&self, cancel: &CancellationToken) -> bool {
        let mut ready = self.repos_ready.subscribe();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            seen = ready.wait_for(|ready| *ready) => seen.is_ok(),
        }
    }

    // ---- readers -------------------------------------------------------

    /// Last published repository list.
    pub fn repositories(&self) -> Arc<Vec<Repository>> {
        self.repos.load()
    }

    /// `full_name` → newest tag.
    pub fn latest_versions(&self) -> Arc<VersionMap> {
        self.versions.load()
    }

    pub fn contribution_stats(&self) -> Arc<ContributionStats> {
        self.contribution.load()
    }

    pub fn commit_activity(&self) -> Arc<CommitActivity> {
        self.commits.load()
    }

    pub fn issue_stats(&self) -> Arc<IssueStats> {
        self.issues.load()
    }

    /// Stars per repository, computed from the current repository list.
    pub fn stars(&self) -> Stars {
        stats::stars(&self.repos.load())
    }

    // ---- refresh jobs --------------------------------------------------

    /// Re-lists the organization's repositories. Keeps the previous list if
    /// any page fails.
    pub async fn refresh_repositories(&self, cancel: &CancellationToken) {
        let label = format!("github-repos:{}", self.org);
        let listed = retry(&label, self.settings.retry_policy(), cancel, || self.list_repositories()).await;

        match listed {
            Ok(repos) => {
                log::info!("[{}] loaded {} repositories.", label, repos.len());
                self.repos.store(repos);
                self.repos_ready.send_replace(true);
            }
            Err(RetryError::Cancelled) => log::info!("[{}] cancelled.", label),
            Err(e) => log::error!("[{}] keeping previous list: {}", label, e),
        }
    }

    async fn list_repositories(&self) -> Result<Vec<Repository>, FetchError> {
        let first = format!("orgs/{}/repos", self.org);
        collect_pages(|cursor: Option<String>| {
            let first = first.clone();
            async move {
                let response = match cursor {
                    None => {
                        self.client
                            .get::<Vec<Repository>>(&first, &[("type", "all"), ("per_page", PER_PAGE)], Some(github_headers()))
                            .await?
                    }
                    Some(next) => self.client.get::<Vec<Repository>>(&next, &[], Some(github_headers())).await?,
                };
                let next = next_link_from_headers(&response.headers);
                Ok::<_, FetchError>(Page {
                    items: response.into_data()?,
                    next,
                })
            }
        })
        .await
    }

    fn fan_out(&self, cancel: &CancellationToken) -> FanOut {
        FanOut::new(self.settings.fan_out_concurrency, self.settings.retry_policy(), cancel.clone())
    }

    fn publish<A>(store: &SnapshotStore<A>, job: &str, report: FanOutReport<A>) {
        if report.cancelled {
            log::info!("[{}] cancelled; snapshot not replaced.", job);
            return;
        }
        if report.all_failed() {
            log::error!("[{}] all {} repositories failed; keeping previous snapshot.", job, report.total());
            return;
        }
        log::info!("[{}] publishing {}/{} repositories.", job, report.succeeded, report.total());
        store.store(report.aggregate);
    }

    /// Recomputes the newest tag of every repository.
    pub async fn refresh_versions(&self, cancel: &CancellationToken) {
        let repos = self.repos.load().as_ref().clone();
        let client = self.client.clone();
        let include_beta = self.include_beta;

        let report = self
            .fan_out(cancel)
            .run(
                "github-versions",
                repos,
                move |repo: Arc<Repository>| {
                    let client = client.clone();
                    async move {
                        let path = if repo.tags_url.is_empty() {
                            format!("repos/{}/tags", repo.full_name)
                        } else {
                            repo.tags_url.clone()
                        };
                        let tags = list_tags(&client, &path).await?;
                        let latest = latest_version(tags.iter().map(|t| t.name.as_str()), include_beta);
                        Ok::<_, FetchError>((repo.full_name.clone(), latest))
                    }
                },
                |versions: &mut VersionMap, (name, latest): (String, Option<String>)| {
                    if let Some(tag) = latest {
                        versions.insert(name, tag);
                    }
                },
            )
            .await;

        Self::publish(&self.versions, "github-versions", report);
    }

    /// Recomputes commit and contributor counts over the trailing windows.
    pub async fn refresh_contribution(&self, cancel: &CancellationToken) {
        let repos = self.repos.load().as_ref().clone();
        let client = self.client.clone();

        let report = self
            .fan_out(cancel)
            .run(
                "github-contributors",
                repos,
                move |repo: Arc<Repository>| {
                    let client = client.clone();
                    async move {
                        let path = format!("repos/{}/stats/contributors", repo.full_name);
                        let contributors: Vec<ContributorStats> =
                            client.get(&path, &[], Some(github_headers())).await?.into_data()?;
                        Ok::<_, FetchError>(stats::summarize_contributors(&contributors))
                    }
                },
                |tally: &mut ContributionTally, repo: stats::RepoContribution| tally.merge(repo),
            )
            .await;

        if report.cancelled {
            log::info!("[github-contributors] cancelled; snapshot not replaced.");
            return;
        }
        if report.all_failed() {
            log::error!("[github-contributors] all {} repositories failed; keeping previous snapshot.", report.total());
            return;
        }
        log::info!("[github-contributors] publishing {}/{} repositories.", report.succeeded, report.total());
        self.contribution.store(report.aggregate.finish());
    }

    /// Recomputes weekly commit totals and active repository counts.
    pub async fn refresh_commit_activity(&self, cancel: &CancellationToken) {
        let repos = self.repos.load().as_ref().clone();
        let client = self.client.clone();

        let report = self
            .fan_out(cancel)
            .run(
                "github-commits",
                repos,
                move |repo: Arc<Repository>| {
                    let client = client.clone();
                    async move {
                        let path = format!("repos/{}/stats/commit_activity", repo.full_name);
                        let weeks: Vec<WeeklyCommits> = client.get(&path, &[], Some(github_headers())).await?.into_data()?;
                        Ok::<_, FetchError>(stats::summarize_commit_activity(&weeks))
                    }
                },
                |activity: &mut CommitActivity, per_range: BTreeMap<StatRange, u64>| activity.merge(per_range),
            )
            .await;

        Self::publish(&self.commits, "github-commits", report);
    }

    /// Recounts open issues and pull requests per repository.
    pub async fn refresh_issues(&self, cancel: &CancellationToken) {
        let repos = self.repos.load().as_ref().clone();
        let client = self.client.clone();

        let report = self
            .fan_out(cancel)
            .run(
                "github-issues",
                repos,
                move |repo: Arc<Repository>| {
                    let client = client.clone();
                    async move {
                        let pulls = count_open_pulls(&client, &repo.full_name).await?;
                        Ok::<_, FetchError>((repo.full_name.clone(), stats::issue_counts(&repo, pulls)))
                    }
                },
                |issues: &mut IssueStats, entry: (String, RepoIssueCounts)| issues.merge(entry),
            )
            .await;

        Self::publish(&self.issues, "github-issues", report);
    }
}

/// Every tag of a repository. GitHub orders tags by name, not by date, so
/// the newest release can sit on any page.
async fn list_tags(client: &ApiClient, first: &str) -> Result<Vec<Tag>, FetchError> {
    collect_pages(|cursor: Option<String>| async move {
        let response = match cursor {
            None => client.get::<Vec<Tag>>(first, &[("per_page", PER_PAGE)], Some(github_headers())).await?,
            Some(next) => client.get::<Vec<Tag>>(&next, &[], Some(github_headers())).await?,
        };
        let next = next_link_from_headers(&response.headers);
        Ok::<_, FetchError>(Page {
            items: response.into_data()?,
            next,
        })
    })
    .await
}

/// Number of open pull requests, following every page.
async fn count_open_pulls(client: &ApiClient, full_name: &str) -> Result<u64, FetchError> {
    let first = format!("repos/{}/pulls", full_name);
    let pulls = collect_pages(|cursor: Option<String>| {
        let first = first.clone();
        async move {
            let response = match cursor {
                None => {
                    client
                        .get::<Vec<IgnoredAny>>(&first, &[("state", "open"), ("per_page", PER_PAGE)], Some(github_headers()))
                        .await?
                }
                Some(next) => client.get::<Vec<IgnoredAny>>(&next, &[], Some(github_headers())).await?,
            };
            let next = next_link_from_headers(&response.headers);
            Ok::<_, FetchError>(Page {
                items: response.into_data()?,
                next,
            })
        }
    })
    .await?;
    Ok(pulls.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_org_is_rejected() {
        let result = GitHubAggregator::new(GitHubConfig::new("  "), RefreshSettings::default());
        assert!(matches!(result, Err(ProviderError::MissingCredential { what: "organization", .. })));
    }

    #[test]
    fn invalid_api_url_is_rejected() {
        let mut config = GitHubConfig::new("reportportal");
        config.api_url = "not a url".into();
        let result = GitHubAggregator::new(config, RefreshSettings::default());
        assert!(matches!(result, Err(ProviderError::Client(FetchError::Url(_)))));
    }

    #[tokio::test]
    async fn readers_get_empty_values_before_first_refresh() {
        let aggregator = GitHubAggregator::new(GitHubConfig::new("reportportal"), RefreshSettings::default()).unwrap();
        assert!(aggregator.repositories().is_empty());
        assert!(aggregator.latest_versions().is_empty());
        assert_eq!(*aggregator.contribution_stats(), ContributionStats::default());
        assert_eq!(aggregator.stars().total, 0);
    }

    #[tokio::test]
    async fn detail_wait_returns_false_on_cancel() {
        let aggregator = GitHubAggregator::new(GitHubConfig::new("reportportal"), RefreshSettings::default()).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        assert!(!aggregator.wait_for_repositories(&token).await);
    }
}
