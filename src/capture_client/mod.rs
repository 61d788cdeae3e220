//! Authenticated HTTP client for the upstream archive.
//!
//! A thin layer over `reqwest`: every request carries the logged-in
//! cookie pair, the identifying User-Agent, and the optional `LOW`
//! authorization header. Responses are classified into the error taxonomy
//! here; retry policy lives one layer up in the fetcher and supervisor.

use std::time::Duration;

use anyhow::{Context, Result};
use futures::Stream;
use reqwest::header::{AUTHORIZATION, COOKIE, HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode, redirect};

use crate::config::{ArchiveCredentials, MirrorConfig};
use crate::error::{MirrorError, MirrorResult};
use crate::utils::constants::{DEFAULT_RETRY_AFTER_SECS, MAX_REDIRECTS, USER_AGENT};
use crate::utils::{archive_url, raw_archive_url};

/// A streaming asset response whose status has already been verified
pub struct AssetDownload {
    response: Response,
}

impl AssetDownload {
    /// Advertised body size, when the upstream sent Content-Length
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    /// MIME type from the Content-Type header, parameters stripped
    #[must_use]
    pub fn content_type(&self) -> Option<String> {
        self.response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
    }

    /// Consume the download as a chunk stream; the body is never buffered
    /// whole here
    pub fn bytes_stream(self) -> impl Stream<Item = reqwest::Result<bytes::Bytes>> + Unpin {
        self.response.bytes_stream()
    }
}

/// Authenticated client for archive captures
#[derive(Debug, Clone)]
pub struct CaptureClient {
    http: Client,
    archive_host: String,
}

impl CaptureClient {
    /// Build a client from configuration and credentials
    pub fn new(config: &MirrorConfig, creds: &ArchiveCredentials) -> Result<Self> {
        let mut headers = HeaderMap::new();

        let cookie = HeaderValue::from_str(&creds.cookie_header())
            .context("Credential cookie contains invalid header characters")?;
        headers.insert(COOKIE, cookie);

        if let Some(authorization) = creds.authorization_header() {
            let value = HeaderValue::from_str(&authorization)
                .context("S3 keys contain invalid header characters")?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.http_timeout_secs()))
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            archive_host: config.archive_host().to_string(),
        })
    }

    /// Fetch the archived document body for `(url, ts)`
    pub async fn get_page(&self, url: &str, timestamp: &str) -> MirrorResult<Vec<u8>> {
        let capture_url = archive_url(&self.archive_host, timestamp, url);
        log::debug!("GET page {capture_url}");

        let response = self.http.get(&capture_url).send().await?;
        classify_status(&response)?;

        let body = response.bytes().await?;
        Ok(body.to_vec())
    }

    /// Open a streaming GET for an asset capture.
    ///
    /// The body is not read here; the caller inspects Content-Length and
    /// decides whether to drain the stream.
    pub async fn get_asset(&self, url: &str, timestamp: &str) -> MirrorResult<AssetDownload> {
        let capture_url = archive_url(&self.archive_host, timestamp, url);
        self.open_stream(&capture_url).await
    }

    /// Same as [`get_asset`](Self::get_asset) but requests the `id_`
    /// variant that returns the original bytes unwrapped
    pub async fn get_raw(&self, url: &str, timestamp: &str) -> MirrorResult<AssetDownload> {
        let capture_url = raw_archive_url(&self.archive_host, timestamp, url);
        self.open_stream(&capture_url).await
    }

    async fn open_stream(&self, capture_url: &str) -> MirrorResult<AssetDownload> {
        log::debug!("GET asset {capture_url}");
        let response = self.http.get(capture_url).send().await?;
        classify_status(&response)?;
        Ok(AssetDownload { response })
    }
}

/// Map an HTTP response status onto the error taxonomy.
///
/// `2xx` passes; `404`/`410` is NotFound; `429` is RateLimited with the
/// Retry-After header (60 s when absent); `5xx` is Transient; any other
/// `4xx` is Permanent.
fn classify_status(response: &Response) -> MirrorResult<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let url = response.url().to_string();
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => Err(MirrorError::NotFound(url)),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            Err(MirrorError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            })
        }
        s if s.is_server_error() => Err(MirrorError::Transient(format!("{s} from {url}"))),
        s => Err(MirrorError::Permanent(format!("{s} from {url}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client(server_url: &str) -> CaptureClient {
        let config = MirrorConfig::builder().archive_host(server_url).build();
        let creds = ArchiveCredentials::new("user", "sig");
        CaptureClient::new(&config, &creds).expect("client builds")
    }

    #[tokio::test]
    async fn page_request_carries_auth_cookie() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "GET",
                "/web/20230101000000/https://example.com/",
            )
            .match_header("cookie", "logged-in-user=user; logged-in-sig=sig")
            .with_body("<html></html>")
            .create_async()
            .await;

        let client = test_client(&server.url());
        let body = client
            .get_page("https://example.com/", "20230101000000")
            .await
            .expect("page fetch succeeds");

        assert_eq!(body, b"<html></html>");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_capture_maps_to_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/web/20230101000000/https://example.com/gone")
            .with_status(404)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let err = client
            .get_page("https://example.com/gone", "20230101000000")
            .await
            .expect_err("404 maps to error");
        assert!(matches!(err, MirrorError::NotFound(_)));
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/web/20230101000000/https://example.com/busy")
            .with_status(429)
            .with_header("retry-after", "17")
            .create_async()
            .await;

        let client = test_client(&server.url());
        let err = client
            .get_page("https://example.com/busy", "20230101000000")
            .await
            .expect_err("429 maps to error");
        match err {
            MirrorError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(17));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_errors_are_transient_and_other_4xx_permanent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/web/20230101000000/https://example.com/flaky")
            .with_status(503)
            .create_async()
            .await;
        server
            .mock("GET", "/web/20230101000000/https://example.com/forbidden")
            .with_status(403)
            .create_async()
            .await;

        let client = test_client(&server.url());
        assert!(matches!(
            client
                .get_page("https://example.com/flaky", "20230101000000")
                .await,
            Err(MirrorError::Transient(_))
        ));
        assert!(matches!(
            client
                .get_page("https://example.com/forbidden", "20230101000000")
                .await,
            Err(MirrorError::Permanent(_))
        ));
    }

    #[tokio::test]
    async fn raw_variant_hits_id_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/web/20230101000000id_/https://example.com/a.png")
            .with_header("content-type", "image/png; charset=binary")
            .with_body(vec![0u8; 16])
            .create_async()
            .await;

        let client = test_client(&server.url());
        let download = client
            .get_raw("https://example.com/a.png", "20230101000000")
            .await
            .expect("raw fetch succeeds");
        assert_eq!(download.content_length(), Some(16));
        assert_eq!(download.content_type().as_deref(), Some("image/png"));
        mock.assert_async().await;
    }
}
