//! # Data Retrieval Module
//!
//! Generic HTTP plumbing shared by every provider client.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: the `ApiClient` wrapper over `reqwest` and
//!   `reqwest-middleware`, with transport retries, timeouts and a typed
//!   [`FetchError`].
//! - **`pagination`**: next-page cursor extraction for `Link` headers and
//!   body-embedded `next` URLs.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Generic HTTP API client with retry middleware for resilient network requests.
pub mod ky_http;
/// Next-page cursor helpers.
pub mod pagination;

pub use ky_http::{ApiClient, ApiResponse, FetchError, HttpOptions};
pub use pagination::{next_link, next_link_from_headers, PagedBody};
