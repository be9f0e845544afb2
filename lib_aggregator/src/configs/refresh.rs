use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::retry::RetryPolicy;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

/// # Refresh Settings
///
/// Periods are kept in whole seconds so the struct maps directly onto a JSON
/// config file or environment overrides. Missing fields fall back to
/// [`RefreshSettings::default`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RefreshSettings {
    pub repo_list_secs: u64,
    pub versions_secs: u64,
    pub contributor_stats_secs: u64,
    pub commit_stats_secs: u64,
    pub issue_stats_secs: u64,
    pub dockerhub_secs: u64,
    pub youtube_secs: u64,
    pub twitter_secs: u64,
    pub cms_secs: u64,
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
    pub fan_out_concurrency: usize,
    /// Transport timeout applied to every outgoing HTTP request.
    pub http_timeout_secs: u64,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            repo_list_secs: 4 * HOUR,
            versions_secs: HOUR,
            contributor_stats_secs: 12 * HOUR,
            commit_stats_secs: 6 * HOUR,
            issue_stats_secs: 30 * MINUTE,
            dockerhub_secs: HOUR,
            youtube_secs: 10 * MINUTE,
            twitter_secs: MINUTE,
            cms_secs: 2 * MINUTE,
            retry_attempts: 5,
            retry_delay_secs: 10,
            fan_out_concurrency: 8,
            http_timeout_secs: 30,
        }
    }
}

impl RefreshSettings {
    pub fn repo_list(&self) -> Duration {
        Duration::from_secs(self.repo_list_secs)
    }

    pub fn versions(&self) -> Duration {
        Duration::from_secs(self.versions_secs)
    }

    pub fn contributor_stats(&self) -> Duration {
        Duration::from_secs(self.contributor_stats_secs)
    }

    pub fn commit_stats(&self) -> Duration {
        Duration::from_secs(self.commit_stats_secs)
    }

    pub fn issue_stats(&self) -> Duration {
        Duration::from_secs(self.issue_stats_secs)
    }

    pub fn dockerhub(&self) -> Duration {
        Duration::from_secs(self.dockerhub_secs)
    }

    pub fn youtube(&self) -> Duration {
        Duration::from_secs(self.youtube_secs)
    }

    pub fn twitter(&self) -> Duration {
        Duration::from_secs(self.twitter_secs)
    }

    pub fn cms(&self) -> Duration {
        Duration::from_secs(self.cms_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Retry policy for one unit of remote work.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_secs(self.retry_delay_secs))
    }
}

impl fmt::Display for RefreshSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RefreshSettings
    Repositories: {}s, versions: {}s
    Contributors: {}s, commits: {}s, issues: {}s
    Docker Hub: {}s, YouTube: {}s, Twitter: {}s, CMS: {}s
    Retry: {} x {}s, fan-out: {}, HTTP timeout: {}s
",
            self.repo_list_secs,
            self.versions_secs,
            self.contributor_stats_secs,
            self.commit_stats_secs,
            self.issue_stats_secs,
            self.dockerhub_secs,
            self.youtube_secs,
            self.twitter_secs,
            self.cms_secs,
            self.retry_attempts,
            self.retry_delay_secs,
            self.fan_out_concurrency,
            self.http_timeout_secs
        )
    }
}
