//! Content file name derivation.
//!
//! File names are `<xxh64 of the url as unsigned decimal>.<extension>`. The
//! hash is not collision-free: two URLs hashing to the same value share one
//! file. That risk is accepted in exchange for needing no reverse index.

use xxhash_rust::xxh64::xxh64;

/// Extension used when the URL path carries none.
pub const DEFAULT_EXTENSION: &str = "jpg";

const MAX_EXTENSION_LEN: usize = 5;

/// Derive the content file name for a URL.
pub fn file_name_for(url: &str) -> String {
    format!("{}.{}", xxh64(url.as_bytes(), 0), extension_of(url))
}

/// Extract the file extension from the last path segment of a URL.
///
/// Query and fragment are ignored. Anything that does not look like a short
/// alphanumeric suffix falls back to [`DEFAULT_EXTENSION`].
pub fn extension_of(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or_default();
    let path = without_fragment.split('?').next().unwrap_or_default();
    let path = path.split_once("://").map(|(_, rest)| rest).unwrap_or(path);

    // with a scheme and no slash, what remains is only the authority
    let segment = match path.rsplit_once('/') {
        Some((_, last)) => last,
        None if url.contains("://") => "",
        None => path,
    };

    match segment.rsplit_once('.') {
        Some((_, ext))
            if !ext.is_empty() && ext.len() <= MAX_EXTENSION_LEN && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => DEFAULT_EXTENSION.to_string(),
    }
}
