//! HTTP image download into the content directory.
//!
//! ### Safety Gates
//! - Only absolute http(s) URLs with a host are requested.
//! - Hosts resolving to private or reserved addresses are refused, and so are
//!   redirects to such IP literals (unless `allow_private_hosts` is set).
//! - Max redirects: 5
//! - Max body bytes: 20MB (configurable), enforced while streaming.
//! - Responses declaring a non-image Content-Type are rejected.
//!
//! ### Atomic Placement
//! The body is streamed into `<dest>.part` and renamed over `dest` once
//! complete, so a failed or truncated download never leaves a partial image
//! at the path the cache serves.

pub mod ssrf;
pub mod url;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Response, header, redirect};
use tokio::io::AsyncWriteExt;

pub use ssrf::{SsrfError, is_private_or_reserved};
pub use url::{UrlError, parse_image_url};

use imgcache_core::{AppConfig, Error, ImageFetcher};

/// Configuration for the image fetcher.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "imgcache/0.1")
    pub user_agent: String,

    /// Maximum image size in bytes (default: 20MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Reject responses whose Content-Type is present but not `image/*` (default: true)
    pub require_image_type: bool,

    /// Skip the private-address check (default: false)
    pub allow_private_hosts: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "imgcache/0.1".to_string(),
            max_bytes: 20 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
            require_image_type: true,
            allow_private_hosts: false,
        }
    }
}

impl FetchConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_image_bytes,
            timeout: config.timeout(),
            allow_private_hosts: config.allow_private_hosts,
            ..Default::default()
        }
    }
}

/// Downloads images over HTTP.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    http: Client,
    config: FetchConfig,
}

impl HttpImageFetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(redirect_policy(&config))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::FetchFailed(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(http, config))
    }

    pub(crate) fn with_client(http: Client, config: FetchConfig) -> Self {
        Self { http, config }
    }

    /// Download `url` to `dest`, returning the number of bytes written.
    pub async fn download(&self, url_str: &str, dest: &Path) -> Result<u64, Error> {
        let start = Instant::now();
        let url = parse_image_url(url_str).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        if !self.config.allow_private_hosts {
            ssrf::check_host(&url).await.map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
        }

        let response = self
            .http
            .get(url.as_str())
            .header(header::ACCEPT, "image/avif,image/webp,image/*;q=0.9,*/*;q=0.5")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::FetchTimeout(format!("{url}: {e}"))
                } else {
                    Error::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus(status.as_u16()));
        }

        if self.config.require_image_type
            && let Some(content_type) = response.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
            && !content_type.trim_start().to_ascii_lowercase().starts_with("image/")
        {
            return Err(Error::FetchFailed(format!("not an image: {content_type}")));
        }

        if let Some(len) = response.content_length()
            && len > self.config.max_bytes as u64
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let part = part_path(dest);
        let written = match self.write_body(response, &part).await {
            Ok(written) => written,
            Err(err) => {
                discard(&part).await;
                return Err(err);
            }
        };

        if let Err(err) = tokio::fs::rename(&part, dest).await {
            discard(&part).await;
            return Err(err.into());
        }

        tracing::debug!(
            url = %url,
            path = %dest.display(),
            bytes = written,
            fetch_ms = start.elapsed().as_millis() as u64,
            "image downloaded"
        );
        Ok(written)
    }

    async fn write_body(&self, mut response: Response, part: &Path) -> Result<u64, Error> {
        let mut file = tokio::fs::File::create(part).await?;
        let mut written = 0u64;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::Network(format!("failed to read response: {}", e)))?
        {
            written += chunk.len() as u64;
            if written > self.config.max_bytes as u64 {
                return Err(Error::FetchTooLarge(format!("more than {} bytes", self.config.max_bytes)));
            }
            file.write_all(&chunk).await?;
        }

        file.flush().await?;
        Ok(written)
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), Error> {
        self.download(url, dest).await.map(|_| ())
    }
}

/// Follow up to `max_redirects`, refusing private IP-literal targets.
fn redirect_policy(config: &FetchConfig) -> redirect::Policy {
    if config.allow_private_hosts {
        return redirect::Policy::limited(config.max_redirects);
    }
    let max = config.max_redirects;
    redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= max {
            return attempt.error(format!("more than {max} redirects"));
        }
        match ssrf::check_literal(attempt.url()) {
            Ok(()) => attempt.follow(),
            Err(err) => attempt.error(err),
        }
    })
}

/// Sibling path the body is streamed into before the final rename.
fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

async fn discard(part: &Path) {
    if let Err(err) = tokio::fs::remove_file(part).await
        && err.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %part.display(), error = %err, "failed to remove partial download");
    }
}
