// plugsync-net/src/validation.rs
use url::Url;

/// Checks that a URL parses and uses the HTTPS scheme. The error is the
/// reason for refusing it.
pub fn validate_url(url_str: &str) -> std::result::Result<(), String> {
    let url = Url::parse(url_str).map_err(|e| format!("Failed to parse URL: {e}"))?;
    if url.scheme() == "https" {
        Ok(())
    } else {
        Err(format!(
            "Invalid URL scheme: must be https, but got '{}'",
            url.scheme()
        ))
    }
}

/// Last path segment of a URL, used as a filename when a registry does not
/// name its file.
pub fn filename_from_url(url_str: &str) -> Option<String> {
    let url = Url::parse(url_str).ok()?;
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .next_back()
        .map(|s| s.to_string())
}
