// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::feed::{EpisodeRecord, FeedDocument};

/// A podcast the user follows, as kept by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Surrogate key, `None` until the store has assigned one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub feed_url: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub last_updated: DateTime<Utc>,
}

/// A stored episode, unique by `identifier` within its subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEpisode {
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub media_url: String,
    pub media_type: String,
    pub published_at: DateTime<Utc>,
    pub duration_text: String,
}

impl PersistedEpisode {
    /// Create an unattached episode from a parsed feed item
    pub fn from_record(record: &EpisodeRecord) -> Self {
        Self {
            identifier: record.identifier.clone(),
            subscription_id: None,
            title: record.title.clone(),
            description: record.description.clone(),
            media_url: record.media_url.clone(),
            media_type: record.media_type.clone(),
            published_at: record.published_at,
            duration_text: record.duration_text.clone(),
        }
    }

    /// Attach the episode to a stored subscription
    pub fn for_subscription(mut self, subscription_id: i64) -> Self {
        self.subscription_id = Some(subscription_id);
        self
    }
}

/// A subscription together with its episodes
#[derive(Debug, Clone, PartialEq)]
pub struct Podcast {
    pub subscription: Subscription,
    pub episodes: Vec<PersistedEpisode>,
}

impl Podcast {
    /// Map a freshly parsed feed into a podcast that has not been stored yet
    pub fn from_document(feed_url: &str, document: &FeedDocument) -> Self {
        Self {
            subscription: Subscription {
                id: None,
                feed_url: feed_url.to_string(),
                title: document.title.clone(),
                description: document.description.clone(),
                image_url: document.image_url.clone(),
                last_updated: document.last_updated,
            },
            episodes: document
                .episodes
                .iter()
                .map(PersistedEpisode::from_record)
                .collect(),
        }
    }

    pub fn is_stored(&self) -> bool {
        self.subscription.id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_document() -> FeedDocument {
        FeedDocument {
            title: "Test Podcast".to_string(),
            description: "A test podcast".to_string(),
            link: Some("https://example.com".to_string()),
            image_url: Some("https://example.com/image.jpg".to_string()),
            last_updated: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            episodes: vec![EpisodeRecord {
                identifier: "ep1-guid".to_string(),
                title: "Episode 1".to_string(),
                description: "First".to_string(),
                link: None,
                media_url: "https://example.com/ep1.mp3".to_string(),
                media_type: "audio/mpeg".to_string(),
                duration_text: "30:00".to_string(),
                published_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            }],
        }
    }

    #[test]
    fn from_document_converts_all_fields() {
        let podcast = Podcast::from_document("https://example.com/feed.xml", &make_document());

        assert!(!podcast.is_stored());
        assert_eq!(podcast.subscription.feed_url, "https://example.com/feed.xml");
        assert_eq!(podcast.subscription.title, "Test Podcast");
        assert_eq!(podcast.subscription.description, "A test podcast");
        assert_eq!(
            podcast.subscription.image_url.as_deref(),
            Some("https://example.com/image.jpg")
        );

        let episode = &podcast.episodes[0];
        assert_eq!(episode.identifier, "ep1-guid");
        assert_eq!(episode.subscription_id, None);
        assert_eq!(episode.media_url, "https://example.com/ep1.mp3");
        assert_eq!(episode.media_type, "audio/mpeg");
        assert_eq!(episode.duration_text, "30:00");
    }

    #[test]
    fn for_subscription_attaches_id() {
        let podcast = Podcast::from_document("https://example.com/feed.xml", &make_document());
        let episode = podcast.episodes[0].clone().for_subscription(7);
        assert_eq!(episode.subscription_id, Some(7));
    }
}
