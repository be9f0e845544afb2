use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use lib_aggregator::configs::RefreshSettings;
use lib_aggregator::core::Scheduler;
use lib_aggregator::providers::{
    ContentfulAggregator, ContentfulConfig, DockerHubConfig, DockerHubTags, GitHubAggregator, GitHubConfig,
    TwitterConfig, TwitterFeed, YouTubeConfig, YouTubeFeed,
};

use super::config::Config;

/// Version data baked in at build time.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: String,
    pub branch: String,
    pub build_date: String,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            branch: env!("LANDING_GIT_BRANCH").to_string(),
            build_date: env!("LANDING_BUILD_DATE").to_string(),
        }
    }
}

/// Providers are optional: one without credentials is never started and its
/// endpoints serve empty data.
#[derive(Clone)]
pub struct AppState {
    pub build: BuildInfo,
    pub github: Option<Arc<GitHubAggregator>>,
    pub dockerhub: Option<Arc<DockerHubTags>>,
    pub youtube: Option<Arc<YouTubeFeed>>,
    pub twitter: Option<Arc<TwitterFeed>>,
    pub news: Option<Arc<ContentfulAggregator>>,
    // Upper bounds for `count`, also when the feed is disabled
    pub youtube_buffer_size: usize,
    pub twitter_buffer_size: usize,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl AppState {
    pub fn new(build: BuildInfo) -> Self {
        Self {
            build,
            github: None,
            dockerhub: None,
            youtube: None,
            twitter: None,
            news: None,
            youtube_buffer_size: 10,
            twitter_buffer_size: 10,
        }
    }

    /// Builds every provider the configuration has credentials for. A
    /// provider that is configured but rejects its settings is fatal.
    pub fn from_config(config: &Config, settings: &RefreshSettings) -> Result<Self> {
        let mut state = AppState::new(BuildInfo::current());
        state.youtube_buffer_size = config.youtube_buffer_size.unwrap_or(10);
        state.twitter_buffer_size = config.twitter_buffer_size.unwrap_or(10);
        let include_beta = config.github_include_beta.unwrap_or(false);

        if let Some(org) = present(&config.github_org) {
            let mut github = GitHubConfig::new(org);
            github.token = present(&config.github_token).map(str::to_string);
            github.include_beta = include_beta;
            let provider = GitHubAggregator::new(github, settings.clone()).context("GitHub provider")?;
            state.github = Some(Arc::new(provider));
        } else {
            log::warn!("No GitHub organization configured, GitHub data disabled.");
        }

        if let Some(namespace) = present(&config.dockerhub_namespace) {
            let mut hub = DockerHubConfig::new(namespace);
            hub.include_beta = include_beta;
            let provider = DockerHubTags::new(hub, settings.clone()).context("Docker Hub provider")?;
            state.dockerhub = Some(Arc::new(provider));
        } else {
            log::warn!("No Docker Hub namespace configured, image versions disabled.");
        }

        match (present(&config.youtube_api_key), present(&config.youtube_channel_id)) {
            (Some(key), Some(channel)) => {
                let youtube = YouTubeConfig::new(key, channel, state.youtube_buffer_size);
                let provider = YouTubeFeed::new(youtube, settings.clone()).context("YouTube provider")?;
                state.youtube = Some(Arc::new(provider));
            }
            _ => log::warn!("YouTube API key or channel missing, video feed disabled."),
        }

        match (present(&config.twitter_bearer_token), present(&config.twitter_search_term)) {
            (Some(token), Some(term)) => {
                let twitter = TwitterConfig::new(token, term, state.twitter_buffer_size);
                let provider = TwitterFeed::new(twitter, settings.clone()).context("Twitter provider")?;
                state.twitter = Some(Arc::new(provider));
            }
            _ => log::warn!("Twitter bearer token or search term missing, post feed disabled."),
        }

        match (present(&config.contentful_space_id), present(&config.contentful_token)) {
            (Some(space), Some(token)) => {
                let cms = ContentfulConfig::new(space, token, config.contentful_limit.unwrap_or(10));
                let provider = ContentfulAggregator::new(cms, settings.clone()).context("Contentful provider")?;
                state.news = Some(Arc::new(provider));
            }
            _ => log::warn!("Contentful space or token missing, news feed disabled."),
        }

        Ok(state)
    }

    /// Schedules the refresh jobs of every enabled provider.
    pub fn start(&self, scheduler: &Scheduler) -> Result<()> {
        if let Some(github) = &self.github {
            github.start(scheduler)?;
        }
        if let Some(hub) = &self.dockerhub {
            hub.start(scheduler)?;
        }
        if let Some(youtube) = &self.youtube {
            youtube.start(scheduler)?;
        }
        if let Some(twitter) = &self.twitter {
            twitter.start(scheduler)?;
        }
        if let Some(news) = &self.news {
            news.start(scheduler)?;
        }
        log::info!("Scheduled {} refresh jobs.", scheduler.running_jobs());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credentials_disable_providers() {
        let config = Config {
            dockerhub_namespace: None,
            ..Config::defaults()
        };
        let state = AppState::from_config(&config, &RefreshSettings::default()).unwrap();
        assert!(state.github.is_some());
        assert!(state.dockerhub.is_none());
        assert!(state.youtube.is_none());
        assert!(state.twitter.is_none());
        assert!(state.news.is_none());
    }

    #[test]
    fn configured_feed_with_bad_settings_is_fatal() {
        let config = Config {
            twitter_bearer_token: Some("token".into()),
            twitter_buffer_size: Some(0),
            ..Config::defaults()
        };
        assert!(AppState::from_config(&config, &RefreshSettings::default()).is_err());
    }
}
