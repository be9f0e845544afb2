use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use lib_aggregator::configs::RefreshSettings;

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Landing page aggregator: cached GitHub, Docker Hub, YouTube, Twitter and CMS data", version)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    #[clap(long, env = "LANDING_PORT", help = "Port to listen on for HTTP clients.")]
    pub port: Option<u16>,

    #[clap(long, env = "LANDING_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "LANDING_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "LANDING_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    // --- GitHub ---
    #[clap(long, env = "GITHUB_TOKEN", help = "GitHub personal access token.")]
    pub github_token: Option<String>,

    #[clap(long, env = "GITHUB_ORG", help = "GitHub organization to aggregate.")]
    pub github_org: Option<String>,

    #[clap(long, env = "GITHUB_INCLUDE_BETA", help = "Consider beta tags when picking latest versions.")]
    pub github_include_beta: Option<bool>,

    // --- Docker Hub ---
    #[clap(long, env = "DOCKERHUB_NAMESPACE", help = "Docker Hub namespace whose image tags are tracked.")]
    pub dockerhub_namespace: Option<String>,

    // --- YouTube ---
    #[clap(long, env = "YOUTUBE_API_KEY", help = "YouTube Data API key.")]
    pub youtube_api_key: Option<String>,

    #[clap(long, env = "YOUTUBE_CHANNEL_ID", help = "YouTube channel to list videos from.")]
    pub youtube_channel_id: Option<String>,

    #[clap(long, env = "YOUTUBE_BUFFER_SIZE", help = "Number of videos kept.")]
    pub youtube_buffer_size: Option<usize>,

    // --- Twitter ---
    #[clap(long, env = "TWITTER_BEARER_TOKEN", help = "Twitter API v2 bearer token.")]
    pub twitter_bearer_token: Option<String>,

    #[clap(long, env = "TWITTER_SEARCH_TERM", help = "Search term, or @handle to follow an account.")]
    pub twitter_search_term: Option<String>,

    #[clap(long, env = "TWITTER_BUFFER_SIZE", help = "Number of posts kept.")]
    pub twitter_buffer_size: Option<usize>,

    // --- Contentful ---
    #[clap(long, env = "CONTENTFUL_SPACE_ID", help = "Contentful space id.")]
    pub contentful_space_id: Option<String>,

    #[clap(long, env = "CONTENTFUL_TOKEN", help = "Contentful delivery API token.")]
    pub contentful_token: Option<String>,

    #[clap(long, env = "CONTENTFUL_LIMIT", help = "Maximum number of news entries fetched.")]
    pub contentful_limit: Option<usize>,

    // --- Refresh periods, in seconds ---
    #[clap(long, env = "REFRESH_REPOS_SECONDS")]
    pub refresh_repos_seconds: Option<u64>,

    #[clap(long, env = "REFRESH_VERSIONS_SECONDS")]
    pub refresh_versions_seconds: Option<u64>,

    #[clap(long, env = "REFRESH_CONTRIBUTORS_SECONDS")]
    pub refresh_contributors_seconds: Option<u64>,

    #[clap(long, env = "REFRESH_COMMITS_SECONDS")]
    pub refresh_commits_seconds: Option<u64>,

    #[clap(long, env = "REFRESH_ISSUES_SECONDS")]
    pub refresh_issues_seconds: Option<u64>,

    #[clap(long, env = "REFRESH_DOCKERHUB_SECONDS")]
    pub refresh_dockerhub_seconds: Option<u64>,

    #[clap(long, env = "REFRESH_YOUTUBE_SECONDS")]
    pub refresh_youtube_seconds: Option<u64>,

    #[clap(long, env = "REFRESH_TWITTER_SECONDS")]
    pub refresh_twitter_seconds: Option<u64>,

    #[clap(long, env = "REFRESH_CMS_SECONDS")]
    pub refresh_cms_seconds: Option<u64>,

    #[clap(long, env = "RETRY_ATTEMPTS", help = "Attempts per unit of remote work.")]
    pub retry_attempts: Option<u32>,

    #[clap(long, env = "RETRY_DELAY_SECONDS", help = "Pause between attempts.")]
    pub retry_delay_seconds: Option<u64>,

    #[clap(long, env = "FAN_OUT_CONCURRENCY", help = "Maximum concurrent per-repository requests.")]
    pub fan_out_concurrency: Option<usize>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            github_token: other.github_token.or(self.github_token),
            github_org: other.github_org.or(self.github_org),
            github_include_beta: other.github_include_beta.or(self.github_include_beta),
            dockerhub_namespace: other.dockerhub_namespace.or(self.dockerhub_namespace),
            youtube_api_key: other.youtube_api_key.or(self.youtube_api_key),
            youtube_channel_id: other.youtube_channel_id.or(self.youtube_channel_id),
            youtube_buffer_size: other.youtube_buffer_size.or(self.youtube_buffer_size),
            twitter_bearer_token: other.twitter_bearer_token.or(self.twitter_bearer_token),
            twitter_search_term: other.twitter_search_term.or(self.twitter_search_term),
            twitter_buffer_size: other.twitter_buffer_size.or(self.twitter_buffer_size),
            contentful_space_id: other.contentful_space_id.or(self.contentful_space_id),
            contentful_token: other.contentful_token.or(self.contentful_token),
            contentful_limit: other.contentful_limit.or(self.contentful_limit),
            refresh_repos_seconds: other.refresh_repos_seconds.or(self.refresh_repos_seconds),
            refresh_versions_seconds: other.refresh_versions_seconds.or(self.refresh_versions_seconds),
            refresh_contributors_seconds: other.refresh_contributors_seconds.or(self.refresh_contributors_seconds),
            refresh_commits_seconds: other.refresh_commits_seconds.or(self.refresh_commits_seconds),
            refresh_issues_seconds: other.refresh_issues_seconds.or(self.refresh_issues_seconds),
            refresh_dockerhub_seconds: other.refresh_dockerhub_seconds.or(self.refresh_dockerhub_seconds),
            refresh_youtube_seconds: other.refresh_youtube_seconds.or(self.refresh_youtube_seconds),
            refresh_twitter_seconds: other.refresh_twitter_seconds.or(self.refresh_twitter_seconds),
            refresh_cms_seconds: other.refresh_cms_seconds.or(self.refresh_cms_seconds),
            retry_attempts: other.retry_attempts.or(self.retry_attempts),
            retry_delay_seconds: other.retry_delay_seconds.or(self.retry_delay_seconds),
            fan_out_concurrency: other.fan_out_concurrency.or(self.fan_out_concurrency),
        }
    }

    pub fn defaults() -> Config {
        Config {
            port: Some(8080),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            github_org: Some("reportportal".to_string()),
            github_include_beta: Some(false),
            dockerhub_namespace: Some("reportportal".to_string()),
            youtube_buffer_size: Some(10),
            twitter_search_term: Some("@reportportal_io".to_string()),
            twitter_buffer_size: Some(10),
            contentful_limit: Some(10),
            ..Default::default()
        }
    }

    /// Refresh settings with every configured override applied.
    pub fn refresh_settings(&self) -> RefreshSettings {
        let mut s = RefreshSettings::default();
        let overrides = [
            (self.refresh_repos_seconds, &mut s.repo_list_secs),
            (self.refresh_versions_seconds, &mut s.versions_secs),
            (self.refresh_contributors_seconds, &mut s.contributor_stats_secs),
            (self.refresh_commits_seconds, &mut s.commit_stats_secs),
            (self.refresh_issues_seconds, &mut s.issue_stats_secs),
            (self.refresh_dockerhub_seconds, &mut s.dockerhub_secs),
            (self.refresh_youtube_seconds, &mut s.youtube_secs),
            (self.refresh_twitter_seconds, &mut s.twitter_secs),
            (self.refresh_cms_seconds, &mut s.cms_secs),
            (self.retry_delay_seconds, &mut s.retry_delay_secs),
        ];
        for (value, slot) in overrides {
            if let Some(v) = value {
                *slot = v;
            }
        }
        if let Some(n) = self.retry_attempts {
            s.retry_attempts = n;
        }
        if let Some(n) = self.fan_out_concurrency {
            s.fan_out_concurrency = n;
        }
        s
    }
}

/// Reads a JSON config file. Missing or unreadable files are logged and ignored.
fn read_config_file(path: &Path) -> Option<Config> {
    if !path.exists() {
        log::info!("Config file not found at {}. Using defaults and environment/CLI variables.", path.display());
        return None;
    }
    match fs::read_to_string(path) {
        Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
            Ok(file_config) => Some(file_config),
            Err(e) => {
                log::warn!("Failed to parse config file {}: {}. Falling back to other sources.", path.display(), e);
                None
            }
        },
        Err(e) => {
            log::warn!("Failed to read config file {}: {}. Falling back to other sources.", path.display(), e);
            None
        }
    }
}

/// Layers defaults, then the config file, then `cli` (which already
/// includes environment variables).
pub fn resolve_config(cli: Config) -> Config {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("server_landing.conf"));

    let mut current_config = Config::defaults();
    if let Some(file_config) = read_config_file(&config_file_path) {
        current_config = current_config.merge(file_config);
    }
    current_config.merge(cli)
}

pub fn load_config() -> Config {
    resolve_config(Config::parse())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn cli_overrides_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "port": 9000, "githubOrg": "acme", "twitterBufferSize": 25 }}"#).unwrap();

        let cli = Config {
            config_path: Some(file.path().to_path_buf()),
            port: Some(9100),
            ..Default::default()
        };
        let config = resolve_config(cli);

        assert_eq!(config.port, Some(9100));
        assert_eq!(config.github_org.as_deref(), Some("acme"));
        assert_eq!(config.twitter_buffer_size, Some(25));
        assert_eq!(config.youtube_buffer_size, Some(10));
        assert_eq!(config.log_level.as_deref(), Some("info"));
    }

    #[test]
    fn unparsable_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let config = resolve_config(Config {
            config_path: Some(file.path().to_path_buf()),
            ..Default::default()
        });
        assert_eq!(config.port, Some(8080));
    }

    #[test]
    fn refresh_overrides_apply_on_top_of_defaults() {
        let config = Config {
            refresh_twitter_seconds: Some(15),
            retry_attempts: Some(2),
            ..Config::defaults()
        };
        let s = config.refresh_settings();
        assert_eq!(s.twitter_secs, 15);
        assert_eq!(s.retry_attempts, 2);
        assert_eq!(s.versions_secs, RefreshSettings::default().versions_secs);
    }

    #[test]
    fn parses_cli_flags() {
        let cli = Config::try_parse_from(["server_landing", "--port", "7000", "--github-include-beta", "true"]).unwrap();
        assert_eq!(cli.port, Some(7000));
        assert_eq!(cli.github_include_beta, Some(true));
    }
}
