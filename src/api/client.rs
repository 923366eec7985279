//! HTTP client for the chat backend REST API

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use url::Url;

use crate::config::Config;

/// reqwest client with the configured request timeout.
pub fn build_http(config: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("Failed to build HTTP client")
}

/// Client for the backend's `/api` routes.
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::with_http(build_http(config)?, &config.backend_url))
    }

    pub fn with_http(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Absolute URL for a route given as path segments, with the trailing
    /// slash the backend expects. Each segment is percent-encoded.
    pub fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid backend URL {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Backend URL {} cannot take a path", self.base_url))?
            .pop_if_empty()
            .extend(segments)
            .push("");
        Ok(url)
    }

    pub async fn get(&self, segments: &[&str]) -> Result<reqwest::Response> {
        let url = self.url(segments)?;
        tracing::debug!("GET {}", url);

        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        check_response(resp, &url).await
    }

    pub async fn post<T: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &T,
    ) -> Result<reqwest::Response> {
        let url = self.url(segments)?;
        tracing::debug!("POST {}", url);

        let resp = self
            .http
            .post(url.clone())
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;

        check_response(resp, &url).await
    }
}

/// Check HTTP response status code and return a clear error on failure.
async fn check_response(resp: reqwest::Response, url: &Url) -> Result<reqwest::Response> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        bail!(
            "401 Unauthorized for {}. Session may be invalid -- run 'umit-chat login'.",
            url
        );
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("HTTP {} for {}: {}", status.as_u16(), url, body);
    }
    Ok(resp)
}
