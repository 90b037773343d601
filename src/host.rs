//! Target validation and host key derivation
//!
//! Every target is parsed exactly once, before any browser resource exists.
//! The resulting [`HostKey`] names that target's artifacts on disk.

use crate::ScrapeError;
use std::fmt;
use url::Url;

/// Filesystem-safe name derived from a target's host.
///
/// The key is the URL's host plus its port when one is spelled out and is
/// not the scheme default, with every `:` replaced by `_`. It is a pure
/// function of the URL, so the same target always lands on the same files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostKey(String);

impl HostKey {
    pub fn from_url(url: &Url) -> Result<Self, ScrapeError> {
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| ScrapeError::InvalidUrl(format!("{url} has no host")))?;

        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        Ok(HostKey(authority.replace(':', "_")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives the host key for a raw URL.
///
/// # Examples
///
/// ```
/// use sitegrab::normalize;
///
/// assert_eq!(normalize("https://b.test:8080/path").unwrap().as_str(), "b.test_8080");
/// assert!(normalize("not a url").is_err());
/// ```
pub fn normalize(raw: &str) -> Result<HostKey, ScrapeError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ScrapeError::InvalidUrl(format!("{}: {e}", raw.trim())))?;
    HostKey::from_url(&url)
}

/// One validated URL to scrape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    raw: String,
    url: Url,
    host_key: HostKey,
}

impl Target {
    /// Accepts absolute `http`/`https` URLs with a host.
    pub fn parse(raw: &str) -> Result<Self, ScrapeError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ScrapeError::InvalidUrl("empty target".to_string()));
        }

        let url = Url::parse(raw).map_err(|e| ScrapeError::InvalidUrl(format!("{raw}: {e}")))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ScrapeError::InvalidUrl(format!(
                    "{raw}: unsupported scheme {other}"
                )))
            }
        }

        let host_key = HostKey::from_url(&url)?;
        Ok(Self {
            raw: raw.to_string(),
            url,
            host_key,
        })
    }

    /// The URL exactly as the caller supplied it, trimmed.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn host_key(&self) -> &HostKey {
        &self.host_key
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Splits a delimiter-separated target list, trimming entries and dropping
/// empty ones. Order is preserved and entries are not validated here.
pub fn split_targets(input: &str, delimiter: char) -> Vec<String> {
    input
        .split(delimiter)
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}
