//! # HTTP Retrieval Utilities
//!
//! Asynchronous API client wrapper around `reqwest`, with exponential-backoff
//! retries for transient transport failures (`reqwest-retry`) and a transport
//! timeout on every request.
//!
//! The client never panics on bad input: a malformed base URL or an invalid
//! header value is reported as a [`FetchError`].

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Errors produced while talking to a remote API.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, TLS or timeout failure, after transport-level retries.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest_middleware::Error),

    /// The body could not be read or decoded.
    #[error("decode error: {0}")]
    Decode(#[from] reqwest::Error),

    /// The request body could not be serialized.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The server answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// The server accepted the request but is still computing the result
    /// (HTTP 202). Asking again later is expected to succeed.
    #[error("result is still being computed (HTTP 202)")]
    Pending,

    /// The cached copy identified by `If-None-Match` is still current (HTTP 304).
    #[error("not modified")]
    NotModified,

    /// The base URL or a path could not be parsed or joined.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// A header value could not be built or read.
    #[error("invalid header: {0}")]
    Header(String),

    /// The underlying HTTP client could not be built.
    #[error("client setup failed: {0}")]
    Client(String),
}

/// A standardized container for API responses.
///
/// Non-success statuses are still returned here so callers can inspect the
/// headers (rate limits, ETags); [`ApiResponse::into_data`] turns the
/// response into a `Result`.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The deserialized body of a 2xx response other than 202/204.
    pub data: Option<T>,
    /// The raw body returned alongside a failure status.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// The headers returned by the server.
    pub headers: HeaderMap,
}

impl<T> ApiResponse<T> {
    /// `true` for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the body, or the error matching the status.
    pub fn into_data(self) -> Result<T, FetchError> {
        match (self.status, self.data) {
            (202, _) => Err(FetchError::Pending),
            (304, _) => Err(FetchError::NotModified),
            (_, Some(data)) => Ok(data),
            (status, None) => Err(FetchError::Status {
                status,
                body: self.error_body.unwrap_or_default(),
            }),
        }
    }

    /// Reads a header as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Transport settings for an [`ApiClient`].
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Per-request timeout, connect through body.
    pub timeout: Duration,
    /// Transport-level retries for transient failures (5xx, 429, connection errors).
    pub max_retries: u32,
    /// Value of the `User-Agent` header.
    pub user_agent: String,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            user_agent: concat!("landing-aggregator/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// A flexible asynchronous HTTP client.
///
/// Handles the base URL, bearer authentication and automatic transport
/// retries. Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct ApiClient {
    inner: ClientWithMiddleware,
    base_url: Url,
    auth_token: Option<String>,
}

impl ApiClient {
    /// Creates a client with [`HttpOptions::default`].
    ///
    /// # Errors
    /// [`FetchError::Url`] if `base_url` is not an absolute URL.
    pub fn new(base_url: &str, auth_token: Option<String>) -> Result<Self, FetchError> {
        Self::with_options(base_url, auth_token, HttpOptions::default())
    }

    /// Creates a client with explicit transport settings.
    pub fn with_options(base_url: &str, auth_token: Option<String>, options: HttpOptions) -> Result<Self, FetchError> {
        let url = Url::parse(base_url)?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(options.max_retries);
        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        let client = ClientBuilder::new(http)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner: client,
            base_url: url,
            auth_token,
        })
    }

    /// The base URL every relative path is joined to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Performs a generic HTTP request.
    ///
    /// `path` may be relative to the base URL or absolute (pagination links
    /// are absolute). `query` pairs are appended to the URL.
    ///
    /// # Errors
    /// Transport and decode failures. A non-success status is *not* an error
    /// here; see [`ApiResponse::into_data`].
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        headers: Option<HeaderMap>,
        body: Option<B>,
    ) -> Result<ApiResponse<T>, FetchError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let full_url = self.base_url.join(path)?;
        let mut req = self.inner.request(method, full_url);

        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(h) = headers {
            req = req.headers(h);
        }
        if let Some(token) = &self.auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| FetchError::Header(e.to_string()))?;
            req = req.header(AUTHORIZATION, value);
        }
        if let Some(b) = body {
            let json_body = serde_json::to_string(&b)?;
            req = req.header(CONTENT_TYPE, "application/json").body(json_body);
        }

        let response = req.send().await?;
        let status = response.status();
        let resp_headers = response.headers().clone();

        if status == StatusCode::ACCEPTED || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
            return Ok(ApiResponse {
                data: None,
                error_body: None,
                status: status.as_u16(),
                headers: resp_headers,
            });
        }

        if status.is_success() {
            let data = response.json::<T>().await?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                headers: resp_headers,
            })
        } else {
            let error_text = response.text().await.ok();
            log::debug!("{} answered {}: {:?}", self.base_url, status, error_text);
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                headers: resp_headers,
            })
        }
    }

    /// GET shorthand for [`ApiClient::request`].
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        headers: Option<HeaderMap>,
    ) -> Result<ApiResponse<T>, FetchError> {
        self.request::<T, ()>(Method::GET, path, query, headers, None).await
    }

    /// GET that fails on any status other than a plain 2xx with a body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, FetchError> {
        self.get(path, query, None).await?.into_data()
    }
}
