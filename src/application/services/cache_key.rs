//! Cache-key derivation.
//!
//! Keys are a function of source identity and the processing-profile version
//! only; per-request options never change the key.

use sha2::{Digest, Sha256};
use url::Url;

use crate::domain::{CacheKey, FileHash};

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Normalize a URL for use as a `source_ref` and fallback key input.
///
/// Lowercases scheme and host, coerces http to https, drops the fragment,
/// sorts query pairs, strips the configured tracking parameters, and trims a
/// trailing slash from non-root paths.
pub fn normalize_url(raw: &str, strip_params: &[String]) -> Result<String, url::ParseError> {
    let parsed = Url::parse(raw.trim())?;

    let scheme = match parsed.scheme().to_ascii_lowercase().as_str() {
        "http" => "https".to_string(),
        other => other.to_string(),
    };

    let host = parsed.host_str().unwrap_or("").to_ascii_lowercase();

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !strip_params.iter().any(|p| p == k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    let query = if pairs.is_empty() {
        String::new()
    } else {
        let encoded: Vec<String> = pairs
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{}={}", k, v)
                }
            })
            .collect();
        format!("?{}", encoded.join("&"))
    };

    let path = match parsed.path() {
        "/" | "" => "/".to_string(),
        p => p.trim_end_matches('/').to_string(),
    };

    let port = match parsed.port() {
        Some(p) => format!(":{}", p),
        None => String::new(),
    };

    Ok(format!("{}://{}{}{}{}", scheme, host, port, path, query))
}

/// Key for a URL source. Prefers the probed `(extractor, video_id)`
/// identity; falls back to the normalized URL when probing failed.
pub fn url_cache_key(
    identity: Option<(&str, &str)>,
    normalized_url: &str,
    profile_version: &str,
) -> CacheKey {
    let input = match identity {
        Some((extractor, video_id)) => format!(
            "url:{}:{}:{}",
            extractor.to_ascii_lowercase(),
            video_id,
            profile_version
        ),
        None => format!("url:{}:{}", normalized_url, profile_version),
    };
    CacheKey::from_digest_hex(sha256_hex(&input))
}

/// Key for a local source, from the content hash of the uploaded file.
pub fn local_cache_key(file_hash: &FileHash, profile_version: &str) -> CacheKey {
    CacheKey::from_digest_hex(sha256_hex(&format!(
        "file:{}:{}",
        file_hash.as_str(),
        profile_version
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_sorts_query_and_drops_fragment() {
        let a = normalize_url("https://Example.com/v/abc?b=2&a=1#t=30", &[]).unwrap();
        let b = normalize_url("https://example.com/v/abc/?a=1&b=2", &[]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, "https://example.com/v/abc?a=1&b=2");
    }

    #[test]
    fn http_is_coerced_to_https() {
        let n = normalize_url("http://example.com/v", &[]).unwrap();
        assert!(n.starts_with("https://"));
    }

    #[test]
    fn tracking_params_are_stripped() {
        let n = normalize_url(
            "https://example.com/v?utm_source=x&id=1",
            &["utm_source".to_string()],
        )
        .unwrap();
        assert_eq!(n, "https://example.com/v?id=1");
    }

    #[test]
    fn identity_beats_normalized_url() {
        let with_id = url_cache_key(Some(("youtube", "abc")), "https://example.com/v", "v1");
        let without = url_cache_key(None, "https://example.com/v", "v1");
        assert_ne!(with_id, without);

        // Same identity through different URLs yields the same key.
        let other_url = url_cache_key(Some(("youtube", "abc")), "https://youtu.be/abc", "v1");
        assert_eq!(with_id, other_url);
    }

    #[test]
    fn profile_version_salts_the_key() {
        let hash = FileHash::parse(&"ab".repeat(32)).unwrap();
        assert_ne!(local_cache_key(&hash, "v1"), local_cache_key(&hash, "v2"));
    }
}
