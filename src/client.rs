//! Remote range lookup over the Pwned Passwords k-anonymity API.

use std::time::Duration;

use tracing::{debug, warn};

use crate::digest::SUFFIX_LEN;
use crate::error::Error;

/// Default range API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.pwnedpasswords.com";

/// One network round trip per call; retries belong to the caller.
///
/// This is the seam the checker is generic over, so tests can swap in a
/// fake that serves canned buckets and records what was requested.
pub trait RangeLookup {
    /// Fetches the suffix bucket for a 5-character hex prefix.
    ///
    /// The returned suffixes are the 35-character remainders of every
    /// breached digest sharing `prefix`. Must abort the in-flight request
    /// once `timeout` elapses and fail with [`Error::Timeout`].
    fn fetch_range(
        &self,
        prefix: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<String>, Error>>;
}

/// Production client over reqwest with rustls. HTTPS only, no plaintext
/// fallback.
pub struct HibpRangeClient {
    http: reqwest::Client,
    base_url: String,
    add_padding: bool,
}

impl HibpRangeClient {
    /// Builds a client sending `user_agent` on every request. The header
    /// identifies the client for server-side observability and carries no
    /// user data.
    ///
    /// With `add_padding` the server is asked to pad each bucket with
    /// filler entries, hiding real bucket sizes from network observers;
    /// filler is stripped during parsing.
    pub fn new(base_url: &str, user_agent: &str, add_padding: bool) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .https_only(true)
            .build()
            .map_err(Error::ClientBuild)?;

        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string(), add_padding })
    }
}

impl RangeLookup for HibpRangeClient {
    async fn fetch_range(&self, prefix: &str, timeout: Duration) -> Result<Vec<String>, Error> {
        let url = format!("{}/range/{}", self.base_url, prefix);

        let mut request = self.http.get(&url).timeout(timeout);
        if self.add_padding {
            request = request.header("Add-Padding", "true");
        }

        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                Error::Timeout { prefix: prefix.to_string(), timeout }
            } else {
                Error::HttpRequest { prefix: prefix.to_string(), source: e }
            }
        };

        let response = request.send().await.map_err(map_err)?;
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(Error::Throttled { prefix: prefix.to_string() });
        }
        if !status.is_success() {
            return Err(Error::HttpStatus { prefix: prefix.to_string(), status: status.as_u16() });
        }

        let body = response.text().await.map_err(map_err)?;
        let suffixes = parse_bucket(&body, self.add_padding);
        debug!(prefix, suffixes = suffixes.len(), "fetched range bucket");
        Ok(suffixes)
    }
}

/// Parses a `SUFFIX:METADATA` newline-delimited response body.
///
/// Malformed lines are skipped rather than failing the whole parse; a body
/// with zero parsable lines is a valid empty bucket. When `drop_padding` is
/// set, filler entries (metadata exactly `0`) are discarded.
pub fn parse_bucket(body: &str, drop_padding: bool) -> Vec<String> {
    let mut suffixes = Vec::new();
    for line in body.lines() {
        if line.is_empty() {
            continue;
        }
        let (suffix, metadata) = match line.split_once(':') {
            Some(parts) => parts,
            None => {
                warn!(line_len = line.len(), "skipping range line without delimiter");
                continue;
            }
        };
        if suffix.len() != SUFFIX_LEN || !suffix.bytes().all(|b| b.is_ascii_hexdigit()) {
            warn!(line_len = line.len(), "skipping malformed range line");
            continue;
        }
        if drop_padding && metadata.trim() == "0" {
            continue;
        }
        suffixes.push(suffix.to_ascii_uppercase());
    }
    suffixes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bucket_basic() {
        let body = "0018A45C4D1DEF81644B54AB7F969B88D65:1\n\
                    00D4F6E8FA6EECAD2A3AA415EEC418D38EC:2\n\
                    011053FD0102E94D6AE2F8B83D76FAF94F6:9999";
        let suffixes = parse_bucket(body, false);
        assert_eq!(suffixes.len(), 3);
        assert_eq!(suffixes[0], "0018A45C4D1DEF81644B54AB7F969B88D65");
    }

    #[test]
    fn test_parse_bucket_skips_malformed_lines() {
        let body = "0018A45C4D1DEF81644B54AB7F969B88D65:1\n\
                    notahexsuffix:3\n\
                    TOOSHORT:2\n\
                    no-delimiter-at-all\n\
                    \n\
                    00D4F6E8FA6EECAD2A3AA415EEC418D38EC:2";
        let suffixes = parse_bucket(body, false);
        assert_eq!(suffixes.len(), 2);
    }

    #[test]
    fn test_parse_bucket_empty_body_is_empty_bucket() {
        assert!(parse_bucket("", false).is_empty());
        assert!(parse_bucket("garbage\nmore garbage", false).is_empty());
    }

    #[test]
    fn test_parse_bucket_drops_padding_filler() {
        let body = "0018A45C4D1DEF81644B54AB7F969B88D65:1\n\
                    00D4F6E8FA6EECAD2A3AA415EEC418D38EC:0";
        assert_eq!(parse_bucket(body, true).len(), 1);
        // Filler is kept when padding was not requested.
        assert_eq!(parse_bucket(body, false).len(), 2);
    }

    #[test]
    fn test_parse_bucket_uppercases_suffixes() {
        let body = "0018a45c4d1def81644b54ab7f969b88d65:1";
        assert_eq!(parse_bucket(body, false)[0], "0018A45C4D1DEF81644B54AB7F969B88D65");
    }

    #[test]
    fn test_client_build() {
        let client = HibpRangeClient::new(DEFAULT_BASE_URL, "pwncheck-tests", true);
        assert!(client.is_ok());
    }
}
