//! Remote track retrieval

use crate::error::{FetchError, Result};
use reqwest::Client;
use std::future::Future;
use tracing::{debug, warn};
use url::Url;

/// Retrieves the complete payload behind a URL
///
/// Implementations must return the whole body or an error, never a partial
/// payload. No retries happen at this layer.
pub trait Fetch: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// HTTP client for downloading tracks
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with a default client
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Create a fetcher around an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn parse_url(url: &str) -> Result<Url> {
        let parsed =
            Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            scheme => Err(FetchError::InvalidUrl(format!(
                "Unsupported scheme {} in {}",
                scheme, url
            ))),
        }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let parsed = Self::parse_url(url)?;
        debug!(url = %parsed, "Fetching");

        let response = self.client.get(parsed).send().await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), url = %url, "Fetch failed");
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(response)
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let data = self.get(url).await?.bytes().await?.to_vec();

        if data.is_empty() {
            warn!(url = %url, "Fetch returned an empty body");
            return Err(FetchError::EmptyBody(url.to_string()));
        }

        debug!(url = %url, size = data.len(), "Fetched track");
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn test_router() -> Router {
        Router::new()
            .route("/song.mp3", get(|| async { vec![0x49u8, 0x44, 0x33, 0x04] }))
            .route("/missing.mp3", get(|| async { StatusCode::NOT_FOUND }))
            .route("/broken.mp3", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route("/empty.mp3", get(|| async { StatusCode::OK }))
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let base = serve(test_router()).await;
        let fetcher = HttpFetcher::new();

        let data = fetcher.fetch(&format!("{}/song.mp3", base)).await.unwrap();
        assert_eq!(data, vec![0x49, 0x44, 0x33, 0x04]);
    }

    #[tokio::test]
    async fn test_fetch_non_success_status() {
        let base = serve(test_router()).await;
        let fetcher = HttpFetcher::new();

        let err = fetcher
            .fetch(&format!("{}/missing.mp3", base))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));

        let err = fetcher
            .fetch(&format!("{}/broken.mp3", base))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_fetch_empty_body() {
        let base = serve(test_router()).await;
        let fetcher = HttpFetcher::new();

        let err = fetcher
            .fetch(&format!("{}/empty.mp3", base))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::EmptyBody(_)));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let fetcher = HttpFetcher::new();

        let err = fetcher.fetch("http://127.0.0.1:1/song.mp3").await.unwrap_err();
        assert!(matches!(err, FetchError::Http(_)));
    }

    #[tokio::test]
    async fn test_fetch_invalid_url() {
        let fetcher = HttpFetcher::new();

        let err = fetcher.fetch("not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));

        let err = fetcher.fetch("file:///etc/passwd").await.unwrap_err();
        assert!(err.to_string().contains("Unsupported scheme file"));
    }
}
