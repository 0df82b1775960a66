use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use url::Url;

use crate::config::Config;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("upstream returned HTTP {0}")]
    Upstream(reqwest::StatusCode),
    #[error("{0}")]
    Request(String),
}

// ── Fetched page ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects; relative image sources resolve against it.
    pub url: Url,
    pub content_type: Option<String>,
    pub body: String,
}

// ── URL validation ───────────────────────────────────────────────────────────

pub fn validate_url(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url.trim())
        .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(FetchError::InvalidUrl(format!(
                "unsupported scheme {:?}, expected http or https",
                other
            )))
        }
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(FetchError::InvalidUrl(format!("{}: missing host", url)));
    }
    Ok(parsed)
}

// ── HTTP client ──────────────────────────────────────────────────────────────

pub fn build_client(config: &Config) -> Result<reqwest::Client, FetchError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

    let mut builder = reqwest::ClientBuilder::new()
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(10))
        .redirect(reqwest::redirect::Policy::limited(10))
        .user_agent(config.user_agent.as_str())
        .default_headers(headers);

    if config.accept_invalid_certs {
        tracing::warn!("TLS certificate verification is disabled for page fetches");
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder
        .build()
        .map_err(|e| FetchError::Request(e.to_string()))
}

pub(crate) fn describe_request_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("TimeoutError: {}", e)
    } else if e.is_connect() {
        format!("ConnectError: {}", e)
    } else {
        format!("RequestError: {}", e)
    }
}

// ── Fetch ────────────────────────────────────────────────────────────────────

pub async fn fetch_page(client: &reqwest::Client, url: &Url) -> Result<Page, FetchError> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| FetchError::Request(describe_request_error(&e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Upstream(status));
    }

    let final_url = response.url().clone();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_lowercase);

    let body = response
        .text()
        .await
        .map_err(|e| FetchError::Request(describe_request_error(&e)))?;

    tracing::debug!(url = %final_url, bytes = body.len(), "fetched page");

    Ok(Page {
        url: final_url,
        content_type,
        body,
    })
}
