// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bytes::Bytes;
use url::Url;

use crate::error::FeedError;
use crate::http::{HttpClient, request_base};

use super::parse::{FeedDocument, parse_feed};

/// Resolve the URL that is actually requested for a feed.
///
/// The feed URL is resolved against its query-stripped request base, so a
/// URL that cannot serve as a base is rejected before any network traffic.
fn feed_request_url(feed_url: &str) -> Result<Url, FeedError> {
    let base = Url::parse(&request_base(feed_url))?;
    Ok(base.join(feed_url)?)
}

/// Fetch raw feed bytes from a URL (without parsing)
///
/// Any status outside 2xx is reported as [`FeedError::HttpStatus`].
async fn fetch_feed_bytes<C: HttpClient + ?Sized>(
    client: &C,
    feed_url: &str,
) -> Result<Bytes, FeedError> {
    let url = feed_request_url(feed_url)?;

    let response = client
        .get(url.as_str())
        .await
        .map_err(|e| FeedError::FetchFailed {
            url: feed_url.to_string(),
            source: e,
        })?;

    if !response.is_success() {
        return Err(FeedError::HttpStatus {
            url: feed_url.to_string(),
            status: response.status,
        });
    }

    Ok(response.body)
}

/// Fetch and parse a podcast feed from a URL
pub async fn fetch_feed<C: HttpClient + ?Sized>(
    client: &C,
    feed_url: &str,
) -> Result<FeedDocument, FeedError> {
    let bytes = fetch_feed_bytes(client, feed_url).await?;
    parse_feed(&bytes)
}

/// Determine if a string looks like an HTTP(S) feed URL
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}
