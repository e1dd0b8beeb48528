//! HTTP client used to fetch source archives.
//!
//! This module provides a thin wrapper around `reqwest` with:
//! - Custom User-Agent
//! - A connect timeout and an optional stall timeout between reads
//! - Proxy support
//! - Status checking, so callers only ever stream successful bodies
//!
//! Requests are never retried here. A failed transfer surfaces to the caller,
//! and re-running is cheap because verified downloads are skipped. There is
//! no deadline on a whole request: a large archive may take as long as it
//! needs while bytes keep arriving.
//!
//! # Examples
//!
//! ```no_run
//! use buildkit::http::{HttpClient, HttpClientConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HttpClientConfig::new()
//!     .with_read_timeout(Duration::from_secs(120))
//!     .with_proxy("http://proxy.example.com:8080".to_string());
//!
//! let client = HttpClient::with_config(config)?;
//! let response = client.get("https://example.com/source.tar.xz").await?;
//! println!("{:?} bytes", response.content_length());
//! # Ok(())
//! # }
//! ```

use reqwest::{Client, Response};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_USER_AGENT: &str = concat!("buildkit/", env!("CARGO_PKG_VERSION"));
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {url}")]
    HttpStatus { status: u16, url: String },
}

pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_config(HttpClientConfig::default())
    }

    pub fn with_config(config: HttpClientConfig) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent);

        if let Some(read_timeout) = config.read_timeout {
            builder = builder.read_timeout(read_timeout);
        }

        if let Some(proxy_url) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)?;
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Perform a GET request, failing on any non-success status
    pub async fn get(&self, url: &str) -> Result<Response, HttpError> {
        log::debug!("HTTP GET {}", url);
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Longest wait for the next read before a transfer fails; `None` waits forever
    pub read_timeout: Option<Duration>,
    pub connect_timeout: Duration,
    pub proxy: Option<String>,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            read_timeout: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            proxy: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = Some(read_timeout);
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}
