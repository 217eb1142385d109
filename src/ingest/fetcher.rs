//! Conditional HTTP fetching of feed documents.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{header, Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::errors::FetchError;

/// Connect timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Total timeout in seconds.
const TOTAL_TIMEOUT_SECS: u64 = 30;

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Maximum feed size in bytes (5MB).
pub const MAX_FEED_SIZE: u64 = 5 * 1024 * 1024;

pub const USER_AGENT: &str = concat!(
    "markfeed/",
    env!("CARGO_PKG_VERSION"),
    " (+feed ingestion)"
);

// See: https://stackoverflow.com/a/7001617/5155484
const ACCEPT: &str = concat!(
    "application/rss+xml, application/rdf+xml, application/atom+xml, ",
    "application/feed+json, application/xml;q=0.9, text/xml;q=0.8"
);

/// What a fetch produced.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Server answered 304; nothing to process.
    NotModified,
    /// Raw document bytes. Decoding is left to the parser, which reads the
    /// encoding from the XML prolog.
    Body(Vec<u8>),
}

/// Which certificate checks apply to a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustPolicy {
    Verify,
    /// Accept invalid certificates. Only chosen for hosts listed in `relaxed_tls_hosts`.
    AcceptInvalidCerts,
}

/// HTTP client for feed documents.
///
/// Holds one verifying client and one relaxed client and picks between them per
/// request, so relaxing trust for one host never affects concurrent fetches of others.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    strict: Client,
    relaxed: Client,
    relaxed_hosts: Vec<String>,
}

impl FeedFetcher {
    pub fn new(relaxed_tls_hosts: Vec<String>) -> Result<Self, FetchError> {
        let relaxed_hosts = relaxed_tls_hosts
            .into_iter()
            .map(|h| h.trim().trim_start_matches('.').to_lowercase())
            .filter(|h| !h.is_empty())
            .collect();

        Ok(FeedFetcher {
            strict: build_client(TrustPolicy::Verify)?,
            relaxed: build_client(TrustPolicy::AcceptInvalidCerts)?,
            relaxed_hosts,
        })
    }

    /// Trust policy for `url`: relaxed only for a configured host or one of its subdomains.
    pub fn trust_policy(&self, url: &Url) -> TrustPolicy {
        let host = match url.host_str() {
            Some(host) => host.to_lowercase(),
            None => return TrustPolicy::Verify,
        };
        let relaxed = self
            .relaxed_hosts
            .iter()
            .any(|h| host == *h || host.ends_with(&format!(".{h}")));
        if relaxed {
            TrustPolicy::AcceptInvalidCerts
        } else {
            TrustPolicy::Verify
        }
    }

    /// GET `url`, sending `If-Modified-Since` when `last_fetched` is known.
    pub async fn fetch(
        &self,
        url: &str,
        last_fetched: Option<DateTime<Utc>>,
    ) -> Result<FetchOutcome, FetchError> {
        let parsed = validate_url(url)?;
        let client = match self.trust_policy(&parsed) {
            TrustPolicy::Verify => &self.strict,
            TrustPolicy::AcceptInvalidCerts => {
                debug!(url, "Fetching with relaxed certificate validation");
                &self.relaxed
            }
        };

        let mut request = client.get(parsed).header(header::ACCEPT, ACCEPT);
        if let Some(since) = last_fetched {
            request = request.header(header::IF_MODIFIED_SINCE, http_date(since));
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            debug!(url, "Feed not modified");
            return Ok(FetchOutcome::NotModified);
        }
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        if let Some(size) = response.content_length() {
            if size > MAX_FEED_SIZE {
                return Err(FetchError::TooLarge {
                    size,
                    max: MAX_FEED_SIZE,
                });
            }
        }

        let body = response.bytes().await?.to_vec();
        if body.len() as u64 > MAX_FEED_SIZE {
            return Err(FetchError::TooLarge {
                size: body.len() as u64,
                max: MAX_FEED_SIZE,
            });
        }

        Ok(FetchOutcome::Body(body))
    }
}

fn build_client(policy: TrustPolicy) -> Result<Client, FetchError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(TOTAL_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .user_agent(USER_AGENT)
        .gzip(true)
        .danger_accept_invalid_certs(policy == TrustPolicy::AcceptInvalidCerts)
        .build()
        .map_err(|e| FetchError::Client(e.to_string()))
}

/// Only absolute http(s) URLs with a host are fetched.
pub fn validate_url(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::invalid_url(url, e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(FetchError::invalid_url(
                url,
                format!("unsupported scheme {scheme}"),
            ))
        }
    }
    if parsed.host_str().is_none() {
        return Err(FetchError::invalid_url(url, "missing host"));
    }
    Ok(parsed)
}

/// IMF-fixdate, as `If-Modified-Since` expects.
fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
