//! HTTP client for the remote graph service
//!
//! Wraps reqwest with:
//! - Semaphore-based concurrency limiting across all collectors
//! - Fixed per-client rate limiting (requests per minute)
//! - Status classification into the transient/auth/malformed taxonomy
//!
//! Retry policy deliberately lives at the collector boundary, not here:
//! a single call either succeeds or fails with a classified error.

use governor::{
    clock::DefaultClock, middleware::NoOpMiddleware, state::InMemoryState, state::NotKeyed, Quota,
    RateLimiter,
};
use reqwest::{header, redirect, Client, Response, StatusCode};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::config::Config;
use crate::error::{HarvestError, Result};

const APP_ID: &str = "936619743392459";

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Maximum concurrent requests across all collectors
    pub max_concurrent_requests: usize,
    /// Requests per minute against the remote service
    pub rate_limit_rpm: u32,
    /// Request timeout
    pub request_timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Session cookie header value, if configured
    pub session_cookie: Option<String>,
    /// CSRF token header value, if configured
    pub csrf_token: Option<String>,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 10,
            rate_limit_rpm: 60,
            request_timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(10),
            session_cookie: None,
            csrf_token: None,
            user_agent: format!("leadharvest/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrent_requests: config.max_concurrent_requests,
            rate_limit_rpm: config.rate_limit_rpm,
            session_cookie: config.session_cookie.clone(),
            csrf_token: config.csrf_token.clone(),
            ..Default::default()
        }
    }
}

/// Classified HTTP client shared by all collectors of a run
pub struct GraphHttpClient {
    client: Client,
    semaphore: Arc<Semaphore>,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>,
    config: HttpClientConfig,
}

impl GraphHttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            // Redirects to the login page signal an expired session and
            // must surface as auth errors, not be followed.
            .redirect(redirect::Policy::none())
            .gzip(true)
            .build()
            .map_err(HarvestError::HttpError)?;

        let quota = Quota::per_minute(
            NonZeroU32::new(config.rate_limit_rpm).unwrap_or(NonZeroU32::new(60).unwrap()),
        );

        Ok(Self {
            client,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_requests)),
            rate_limiter: RateLimiter::direct(quota),
            config,
        })
    }

    /// Executes a GET and parses the body as JSON.
    pub async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<serde_json::Value> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| HarvestError::Transient("request semaphore closed".to_string()))?;
        self.rate_limiter.until_ready().await;

        debug!(method = "GET", url = %url, "Executing HTTP request");
        let request = self.apply_headers(self.client.get(url).query(query));
        let response = request.send().await.map_err(classify_transport)?;
        Self::json_body(response).await
    }

    /// Executes a form POST (GraphQL-style payload) and parses the body
    /// as JSON.
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(&str, String)],
        referer: Option<&str>,
    ) -> Result<serde_json::Value> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| HarvestError::Transient("request semaphore closed".to_string()))?;
        self.rate_limiter.until_ready().await;

        debug!(method = "POST", url = %url, "Executing HTTP request");
        let mut request = self.apply_headers(self.client.post(url).form(form));
        if let Some(referer) = referer {
            request = request.header(header::REFERER, referer);
        }
        let response = request.send().await.map_err(classify_transport)?;
        Self::json_body(response).await
    }

    fn apply_headers(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request = request.header("x-ig-app-id", APP_ID);
        if let Some(ref cookie) = self.config.session_cookie {
            request = request.header(header::COOKIE, cookie);
        }
        if let Some(ref token) = self.config.csrf_token {
            request = request.header("x-csrftoken", token);
        }
        request
    }

    async fn json_body(response: Response) -> Result<serde_json::Value> {
        let status = response.status();
        if status.is_redirection() {
            // Login redirect: cookies expired or invalid
            return Err(HarvestError::Auth(format!(
                "redirected to login (HTTP {})",
                status
            )));
        }
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let text = response.text().await.map_err(classify_transport)?;
        serde_json::from_str(&text).map_err(|_| {
            let snippet: String = text.trim().chars().take(120).collect();
            HarvestError::Malformed(format!("response not JSON: {}", snippet))
        })
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Maps an HTTP status into the error taxonomy.
pub fn classify_status(status: StatusCode) -> HarvestError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            HarvestError::Auth(format!("HTTP {}", status))
        }
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::REQUEST_TIMEOUT
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => HarvestError::Transient(format!("HTTP {}", status)),
        s if s.is_server_error() => HarvestError::Transient(format!("HTTP {}", s)),
        s => HarvestError::Malformed(format!("unexpected HTTP {}", s)),
    }
}

fn classify_transport(error: reqwest::Error) -> HarvestError {
    if error.is_timeout() || error.is_connect() {
        HarvestError::Transient(error.to_string())
    } else {
        HarvestError::HttpError(error)
    }
}
