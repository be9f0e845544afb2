//! # Docker Hub Tags
//!
//! Lists every repository of a Docker Hub namespace and publishes the newest
//! version tag of each one. Map keys are `docker.io/{namespace}/{repository}`
//! so the map can be merged with the source-control version map without
//! collisions.

use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::configs::RefreshSettings;
use crate::core::{collect_pages, latest_version, retry, FanOut, Page, RetryError, Scheduler, SchedulerError, SnapshotStore};
use crate::providers::{require, ProviderError, VersionMap};
use crate::retrieve::{ApiClient, FetchError, HttpOptions, PagedBody};

const DEFAULT_API: &str = "https://hub.docker.com/";
const PAGE_SIZE: &str = "100";

#[derive(Debug, Clone)]
pub struct DockerHubConfig {
    pub namespace: String,
    /// Keep tags containing `beta` when picking the latest version.
    pub include_beta: bool,
    pub api_url: String,
}

impl DockerHubConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            include_beta: false,
            api_url: DEFAULT_API.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NamedEntry {
    name: String,
}

/// # Docker Hub Tags
pub struct DockerHubTags {
    client: ApiClient,
    namespace: String,
    include_beta: bool,
    settings: RefreshSettings,
    latest: SnapshotStore<VersionMap>,
}

impl DockerHubTags {
    pub fn new(config: DockerHubConfig, settings: RefreshSettings) -> Result<Self, ProviderError> {
        require("dockerhub", "namespace", &config.namespace)?;
        let options = HttpOptions {
            timeout: settings.http_timeout(),
            ..HttpOptions::default()
        };
        Ok(Self {
            client: ApiClient::with_options(&config.api_url, None, options)?,
            namespace: config.namespace,
            include_beta: config.include_beta,
            settings,
            latest: SnapshotStore::new(),
        })
    }

    pub fn start(self: &Arc<Self>, scheduler: &Scheduler) -> Result<(), SchedulerError> {
        let this = Arc::clone(self);
        let token = scheduler.cancellation_token();
        scheduler.schedule("dockerhub-tags", self.settings.dockerhub(), true, move || {
            let this = Arc::clone(&this);
            let token = token.clone();
            async move { this.refresh(&token).await }
        })
    }

    /// `docker.io/{namespace}/{repository}` → newest tag.
    pub fn latest_tags(&self) -> Arc<VersionMap> {
        self.latest.load()
    }

    async fn list_repositories(&self) -> Result<Vec<String>, FetchError> {
        let first = format!("v2/repositories/{}/", self.namespace);
        self.collect_names(&first).await
    }

    async fn list_tags(client: &ApiClient, namespace: &str, repository: &str) -> Result<Vec<String>, FetchError> {
        // Newest first; a single page is enough to find the latest release.
        let path = format!("v2/repositories/{}/{}/tags", namespace, repository);
        let page: PagedBody<NamedEntry> = client
            .get_json(&path, &[("page_size", PAGE_SIZE), ("ordering", "last_updated")])
            .await?;
        Ok(page.results.into_iter().map(|t| t.name).collect())
    }

    async fn collect_names(&self, first: &str) -> Result<Vec<String>, FetchError> {
        collect_pages(|cursor: Option<String>| async move {
            let page: PagedBody<NamedEntry> = match cursor {
                None => self.client.get_json(first, &[("page_size", PAGE_SIZE)]).await?,
                Some(next) => self.client.get_json(&next, &[]).await?,
            };
            Ok::<_, FetchError>(Page {
                items: page.results.into_iter().map(|r| r.name).collect(),
                next: page.next.filter(|n| !n.is_empty()),
            })
        })
        .await
    }

    /// Re-lists the namespace and recomputes every repository's newest tag.
    /// A failed listing skips the cycle and keeps the previous map.
    pub async fn refresh(&self, cancel: &CancellationToken) {
        let label = format!("dockerhub:{}", self.namespace);
        let repositories = match retry(&label, self.settings.retry_policy(), cancel, || self.list_repositories()).await {
            Ok(names) => names,
            Err(RetryError::Cancelled) => return,
            Err(e) => {
                log::error!("[{}] repository listing failed, keeping previous tags: {}", label, e);
                return;
            }
        };

        let client = self.client.clone();
        let namespace = self.namespace.clone();
        let include_beta = self.include_beta;
        let fan_out = FanOut::new(self.settings.fan_out_concurrency, self.settings.retry_policy(), cancel.clone());

        let report = fan_out
            .run(
                "dockerhub-tags",
                repositories,
                move |repository: Arc<String>| {
                    let client = client.clone();
                    let namespace = namespace.clone();
                    async move {
                        let tags = Self::list_tags(&client, &namespace, &repository).await?;
                        let key = format!("docker.io/{}/{}", namespace, repository);
                        Ok::<_, FetchError>((key, latest_version(&tags, include_beta)))
                    }
                },
                |map: &mut VersionMap, (key, latest): (String, Option<String>)| {
                    if let Some(tag) = latest {
                        map.insert(key, tag);
                    }
                },
            )
            .await;

        if report.cancelled {
            return;
        }
        if report.all_failed() {
            log::error!("[{}] all {} images failed; keeping previous tags.", label, report.total());
            return;
        }
        log::info!("[{}] {} images tagged, {} failed.", label, report.aggregate.len(), report.failures.len());
        self.latest.store(report.aggregate);
    }
}
