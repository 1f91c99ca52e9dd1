//! Asset retrieval.
//!
//! [`ByteFetcher`] is the seam between provisioning and the network. The
//! production [`HttpFetcher`] speaks `http(s)` and `file` URLs; tests plug in
//! their own implementations.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::error::FetchError;
use crate::transport::EncodedAsset;

/// Retrieves raw bytes from a URL.
#[async_trait]
pub trait ByteFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError>;

    /// Fetch and wrap in the text-safe transport form.
    async fn fetch_encoded(&self, url: &Url) -> Result<EncodedAsset, FetchError> {
        let bytes = self.fetch(url).await?;
        Ok(EncodedAsset::from_bytes(&bytes))
    }
}

/// A fetcher shared between tasks.
pub type SharedFetcher = Arc<dyn ByteFetcher>;

/// Fetches over HTTP with a per-request timeout, or from local files.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cloudbridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }

    /// Use a preconfigured client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_http(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let request_error = |source| FetchError::Request {
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(request_error)?;
        Ok(bytes.to_vec())
    }

    async fn fetch_file(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let path = url.to_file_path().map_err(|()| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: "not a local file path".to_string(),
        })?;
        tokio::fs::read(&path)
            .await
            .map_err(|source| FetchError::Local {
                path: path.display().to_string(),
                source,
            })
    }
}

#[async_trait]
impl ByteFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let bytes = match url.scheme() {
            "http" | "https" => self.fetch_http(url).await?,
            "file" => self.fetch_file(url).await?,
            other => return Err(FetchError::UnsupportedScheme(other.to_string())),
        };
        debug!(url = %url, bytes = bytes.len(), "Fetched asset");
        Ok(bytes)
    }
}

/// Turn an asset location into an absolute URL.
///
/// Absolute URLs are used as-is. Relative locations are joined onto `base`
/// when one is configured, otherwise they name a file relative to the
/// current directory.
pub fn resolve_url(base: Option<&Url>, location: &str) -> Result<Url, FetchError> {
    let invalid = |reason: String| FetchError::InvalidUrl {
        url: location.to_string(),
        reason,
    };

    match Url::parse(location) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => match base {
            Some(base) => base.join(location).map_err(|e| invalid(e.to_string())),
            None => {
                let absolute =
                    std::path::absolute(Path::new(location)).map_err(|e| invalid(e.to_string()))?;
                Url::from_file_path(&absolute)
                    .map_err(|()| invalid("cannot express path as a file URL".to_string()))
            }
        },
        Err(e) => Err(invalid(e.to_string())),
    }
}
