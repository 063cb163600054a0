//! Network side of the image cache.
//!
//! This crate provides the HTTP implementation of [`imgcache_core::ImageFetcher`]
//! used by the server.

pub mod fetch;

pub use fetch::{FetchConfig, HttpImageFetcher, SsrfError, UrlError, parse_image_url};
