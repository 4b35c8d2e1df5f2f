//! HTTP resource fetcher for URL inputs.
//!
//! Downloads the body into a named temporary file whose suffix mirrors the
//! URL's extension, so MIME detection downstream still works.

use std::io::Write;
use std::time::Duration;

use baton_core::workflow::input::{FetchFuture, ResourceFetcher};
use tempfile::TempPath;

/// Fetches `http://` and `https://` inputs with reqwest.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self { client })
    }

    async fn download(&self, url: &str) -> Result<TempPath, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| format!("failed to read body: {e}"))?;

        let mut file = tempfile::Builder::new()
            .prefix("baton-")
            .suffix(&url_suffix(url))
            .tempfile()
            .map_err(|e| format!("failed to create temp file: {e}"))?;
        file.write_all(&body)
            .map_err(|e| format!("failed to write temp file: {e}"))?;

        tracing::debug!(url, bytes = body.len(), path = %file.path().display(), "fetched input");
        Ok(file.into_temp_path())
    }
}

impl ResourceFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(self.download(url))
    }
}

/// File suffix (with dot) taken from the last path segment of `url`.
fn url_suffix(url: &str) -> String {
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or("")
        .splitn(4, '/')
        .nth(3)
        .unwrap_or("");
    let segment = path.rsplit('/').next().unwrap_or("");
    match segment.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 8
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => String::new(),
    }
}
