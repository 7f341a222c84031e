// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

/// HTTP response with status and the fully buffered body
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: Bytes,
}

impl HttpResponse {
    /// True for 2xx status codes
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction for testability
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform a GET request and buffer the whole response body
    async fn get(&self, url: &str) -> Result<HttpResponse, reqwest::Error>;
}

/// Timeouts and identification used by [`ReqwestClient`]
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            user_agent: concat!("podsync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Default HTTP client implementation using reqwest
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a new ReqwestClient with default timeouts
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_config(&HttpConfig::default())
    }

    /// Create a new ReqwestClient from explicit settings
    pub fn with_config(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    /// Create a new ReqwestClient with a custom reqwest::Client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/xml")
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        Ok(HttpResponse { status, body })
    }
}

/// Build the request base for a feed URL.
///
/// Everything from the first `?` is dropped and a trailing slash appended, so
/// `https://atp.fm/episodes?format=rss` becomes `https://atp.fm/episodes/`.
pub fn request_base(feed_url: &str) -> String {
    let base = feed_url.split('?').next().unwrap_or(feed_url);
    format!("{}/", base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reqwest_client_can_be_created() {
        let _client = ReqwestClient::new().unwrap();
        let _custom = ReqwestClient::with_config(&HttpConfig {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            user_agent: "test".to_string(),
        })
        .unwrap();
    }

    #[test]
    fn reqwest_client_can_be_cloned() {
        let client = ReqwestClient::new().unwrap();
        let _cloned = client.clone();
    }

    #[test]
    fn default_config_uses_thirty_second_timeouts() {
        let config = HttpConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.read_timeout, Duration::from_secs(30));
        assert!(config.user_agent.starts_with("podsync/"));
    }

    #[test]
    fn request_base_strips_query() {
        assert_eq!(
            request_base("https://atp.fm/episodes?format=rss"),
            "https://atp.fm/episodes/"
        );
    }

    #[test]
    fn request_base_cuts_at_first_question_mark() {
        assert_eq!(
            request_base("https://example.com/feed?a=1?b=2"),
            "https://example.com/feed/"
        );
    }

    #[test]
    fn request_base_without_query_appends_slash() {
        assert_eq!(
            request_base("https://example.com/feed.xml"),
            "https://example.com/feed.xml/"
        );
    }

    #[test]
    fn success_range_is_2xx_only() {
        let mk = |status| HttpResponse {
            status,
            body: Bytes::new(),
        };
        assert!(mk(200).is_success());
        assert!(mk(204).is_success());
        assert!(!mk(301).is_success());
        assert!(!mk(404).is_success());
        assert!(!mk(500).is_success());
    }
}
