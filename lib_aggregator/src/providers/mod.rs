//! # Providers Module
//!
//! One aggregator per remote source. Each aggregator owns its snapshot stores
//! (or ring buffer), knows how to refresh them, and registers its refresh jobs
//! with a [`Scheduler`](crate::core::Scheduler) through `start`.
//!
//! ## Sources:
//!
//! - **`github`**: repository list, latest release tags, contributor and
//!   commit statistics, open issue and pull-request counts, stars.
//! - **`dockerhub`**: latest image tag per repository of a namespace.
//! - **`youtube`**: newest videos of a channel, with ETag revalidation.
//! - **`twitter`**: recent posts for a search term or account, buffered in a
//!   ring buffer.
//! - **`contentful`**: news items published through the CMS.
//!
//! Readers only ever call the `get`-style accessors, which never touch the
//! network.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use thiserror::Error;

use crate::retrieve::FetchError;

/// GitHub organization statistics.
pub mod github;

pub mod contentful;
pub mod dockerhub;
pub mod twitter;
pub mod youtube;

pub use contentful::{ContentfulAggregator, ContentfulConfig, NewsItem};
pub use dockerhub::{DockerHubConfig, DockerHubTags};
pub use github::{GitHubAggregator, GitHubConfig};
pub use twitter::{TweetInfo, TwitterConfig, TwitterFeed};
pub use youtube::{VideoInfo, YouTubeConfig, YouTubeFeed};

/// Map of resource name to the newest tag published for it.
pub type VersionMap = std::collections::BTreeMap<String, String>;

/// Failures while constructing an aggregator. Refresh failures never surface
/// here; they are logged and the previous snapshot is kept.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A required credential or identifier is empty.
    #[error("{provider}: missing {what}")]
    MissingCredential {
        /// Which provider was being built.
        provider: &'static str,
        /// Which setting was empty.
        what: &'static str,
    },

    /// A buffer-backed provider was configured with an unusable size.
    #[error("{provider}: {source}")]
    Buffer {
        /// Which provider was being built.
        provider: &'static str,
        /// The underlying buffer error.
        source: crate::buf::BufferError,
    },

    /// The HTTP client could not be built (bad base URL, bad token bytes).
    #[error("http client: {0}")]
    Client(#[from] FetchError),
}

/// Rejects blank values for required settings.
pub(crate) fn require(provider: &'static str, what: &'static str, value: &str) -> Result<(), ProviderError> {
    if value.trim().is_empty() {
        Err(ProviderError::MissingCredential { provider, what })
    } else {
        Ok(())
    }
}
