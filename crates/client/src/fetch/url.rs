//! Validation of image URLs before any request is made.
//!
//! The cache keys on the caller's URL string verbatim, so nothing here
//! rewrites the URL; it only decides whether it is fetchable.

/// Error type for URL validation failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Parse `input` as an absolute http(s) URL with a host.
///
/// Unlike browser address bars, a missing scheme is an error rather than an
/// implied `https://`.
pub fn parse_image_url(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let parsed = url::Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(UrlError::MissingHost);
    }

    Ok(parsed)
}
