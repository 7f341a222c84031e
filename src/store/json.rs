// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::StoreError;

use super::{PersistedEpisode, Store, Subscription};

const LIBRARY_FILENAME: &str = "library.json";

/// Serialized form of the whole library
#[derive(Debug, Serialize, Deserialize)]
struct Library {
    next_id: i64,
    subscriptions: Vec<Subscription>,
    /// Episodes keyed by subscription id
    episodes: BTreeMap<i64, Vec<PersistedEpisode>>,
}

impl Default for Library {
    fn default() -> Self {
        Self {
            next_id: 1,
            subscriptions: Vec::new(),
            episodes: BTreeMap::new(),
        }
    }
}

/// A [`Store`] that keeps the library in a single JSON file.
///
/// Every operation reads the file, applies its change and writes the result
/// to a `.partial` sibling that is then renamed over the original, so a crash
/// never leaves a half-written library behind. Operations are serialized
/// through an internal lock.
pub struct JsonStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonStore {
    /// Open (or create) a library in `dir`
    pub async fn open(dir: &Path) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StoreError::CreateDirectoryFailed {
                path: dir.to_path_buf(),
                source: e,
            })?;

        Ok(Self {
            path: dir.join(LIBRARY_FILENAME),
            lock: Mutex::new(()),
        })
    }

    /// Path of the library file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Library, StoreError> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Library::default()),
            Err(e) => {
                return Err(StoreError::ReadFailed {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };

        serde_json::from_slice(&content).map_err(|e| StoreError::JsonParseFailed {
            path: self.path.clone(),
            source: e,
        })
    }

    async fn write(&self, library: &Library) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(library)?;
        let partial = self.path.with_extension("json.partial");

        tokio::fs::write(&partial, json)
            .await
            .map_err(|e| StoreError::WriteFailed {
                path: partial.clone(),
                source: e,
            })?;

        tokio::fs::rename(&partial, &self.path)
            .await
            .map_err(|e| StoreError::WriteFailed {
                path: self.path.clone(),
                source: e,
            })
    }
}

#[async_trait]
impl Store for JsonStore {
    async fn load_subscription_by_url(
        &self,
        feed_url: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        let _guard = self.lock.lock().await;
        let library = self.read().await?;

        Ok(library
            .subscriptions
            .into_iter()
            .find(|s| s.feed_url == feed_url))
    }

    async fn load_episodes(
        &self,
        subscription_id: i64,
    ) -> Result<Vec<PersistedEpisode>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut library = self.read().await?;

        let mut episodes = library
            .episodes
            .remove(&subscription_id)
            .unwrap_or_default();
        episodes.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Ok(episodes)
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> Result<i64, StoreError> {
        let _guard = self.lock.lock().await;
        let mut library = self.read().await?;

        let existing = library
            .subscriptions
            .iter_mut()
            .find(|s| s.feed_url == subscription.feed_url);

        let id = match existing {
            Some(stored) => {
                let id = stored.id.unwrap_or(library.next_id);
                *stored = Subscription {
                    id: Some(id),
                    ..subscription.clone()
                };
                id
            }
            None => {
                let id = library.next_id;
                library.subscriptions.push(Subscription {
                    id: Some(id),
                    ..subscription.clone()
                });
                id
            }
        };
        library.next_id = library.next_id.max(id + 1);

        self.write(&library).await?;
        Ok(id)
    }

    async fn insert_episodes(&self, episodes: &[PersistedEpisode]) -> Result<(), StoreError> {
        if episodes.is_empty() {
            return Ok(());
        }

        let _guard = self.lock.lock().await;
        let mut library = self.read().await?;

        for episode in episodes {
            let subscription_id = episode
                .subscription_id
                .filter(|id| library.subscriptions.iter().any(|s| s.id == Some(*id)))
                .ok_or_else(|| StoreError::OrphanEpisode {
                    identifier: episode.identifier.clone(),
                })?;

            let stored = library.episodes.entry(subscription_id).or_default();
            match stored
                .iter_mut()
                .find(|e| e.identifier == episode.identifier)
            {
                Some(existing) => *existing = episode.clone(),
                None => stored.push(episode.clone()),
            }
        }

        self.write(&library).await
    }

    async fn delete_subscription(&self, subscription: &Subscription) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut library = self.read().await?;

        let removed: Vec<i64> = library
            .subscriptions
            .iter()
            .filter(|s| match subscription.id {
                Some(id) => s.id == Some(id),
                None => s.feed_url == subscription.feed_url,
            })
            .filter_map(|s| s.id)
            .collect();

        library
            .subscriptions
            .retain(|s| !s.id.is_some_and(|id| removed.contains(&id)));
        for id in &removed {
            library.episodes.remove(id);
        }

        self.write(&library).await
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut subscriptions = self.read().await?.subscriptions;

        subscriptions.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(subscriptions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn make_subscription(feed_url: &str, title: &str) -> Subscription {
        Subscription {
            id: None,
            feed_url: feed_url.to_string(),
            title: title.to_string(),
            description: "A test podcast".to_string(),
            image_url: None,
            last_updated: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn make_episode(subscription_id: i64, identifier: &str, day: u32) -> PersistedEpisode {
        PersistedEpisode {
            identifier: identifier.to_string(),
            subscription_id: Some(subscription_id),
            title: format!("Episode {identifier}"),
            description: String::new(),
            media_url: format!("https://example.com/{identifier}.mp3"),
            media_type: "audio/mpeg".to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
            duration_text: String::new(),
        }
    }

    #[tokio::test]
    async fn open_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let library_dir = dir.path().join("nested").join("library");

        let store = JsonStore::open(&library_dir).await.unwrap();

        assert!(library_dir.exists());
        assert!(store.list_subscriptions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn insert_subscription_assigns_ids() {
        let dir = tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();

        let a = store
            .insert_subscription(&make_subscription("https://a.example/feed", "A"))
            .await
            .unwrap();
        let b = store
            .insert_subscription(&make_subscription("https://b.example/feed", "B"))
            .await
            .unwrap();

        assert_ne!(a, b);
        let loaded = store
            .load_subscription_by_url("https://b.example/feed")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.id, Some(b));
        assert_eq!(loaded.title, "B");
    }

    #[tokio::test]
    async fn insert_subscription_replaces_by_feed_url() {
        let dir = tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();

        let first = store
            .insert_subscription(&make_subscription("https://a.example/feed", "Old"))
            .await
            .unwrap();
        let second = store
            .insert_subscription(&make_subscription("https://a.example/feed", "New"))
            .await
            .unwrap();

        assert_eq!(first, second);
        let all = store.list_subscriptions().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "New");
    }

    #[tokio::test]
    async fn episodes_are_upserted_and_returned_newest_first() {
        let dir = tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();
        let id = store
            .insert_subscription(&make_subscription("https://a.example/feed", "A"))
            .await
            .unwrap();

        store.insert_episode(&make_episode(id, "old", 1)).await.unwrap();
        store.insert_episode(&make_episode(id, "new", 5)).await.unwrap();
        let mut replacement = make_episode(id, "old", 1);
        replacement.title = "Renamed".to_string();
        store.insert_episode(&replacement).await.unwrap();

        let episodes = store.load_episodes(id).await.unwrap();
        let ids: Vec<_> = episodes.iter().map(|e| e.identifier.as_str()).collect();
        assert_eq!(ids, ["new", "old"]);
        assert_eq!(episodes[1].title, "Renamed");
    }

    #[tokio::test]
    async fn insert_episode_requires_stored_subscription() {
        let dir = tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();

        let mut unattached = make_episode(1, "x", 1);
        unattached.subscription_id = None;

        assert!(matches!(
            store.insert_episode(&unattached).await,
            Err(StoreError::OrphanEpisode { .. })
        ));
        assert!(matches!(
            store.insert_episode(&make_episode(42, "x", 1)).await,
            Err(StoreError::OrphanEpisode { .. })
        ));
    }

    #[tokio::test]
    async fn insert_episodes_stores_a_batch() {
        let dir = tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();
        let id = store
            .insert_subscription(&make_subscription("https://a.example/feed", "A"))
            .await
            .unwrap();

        let batch: Vec<_> = (1..=20)
            .map(|day| make_episode(id, &format!("e{day}"), day))
            .collect();
        store.insert_episodes(&batch).await.unwrap();

        let episodes = store.load_episodes(id).await.unwrap();
        assert_eq!(episodes.len(), 20);
        assert_eq!(episodes[0].identifier, "e20");
    }

    #[tokio::test]
    async fn insert_episodes_with_orphan_stores_nothing() {
        let dir = tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();
        let id = store
            .insert_subscription(&make_subscription("https://a.example/feed", "A"))
            .await
            .unwrap();

        let batch = [make_episode(id, "kept?", 1), make_episode(id + 1, "orphan", 2)];

        assert!(matches!(
            store.insert_episodes(&batch).await,
            Err(StoreError::OrphanEpisode { identifier }) if identifier == "orphan"
        ));
        assert!(store.load_episodes(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_subscription_cascades_to_episodes() {
        let dir = tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();
        let id = store
            .insert_subscription(&make_subscription("https://a.example/feed", "A"))
            .await
            .unwrap();
        store.insert_episode(&make_episode(id, "e1", 1)).await.unwrap();

        let stored = store
            .load_subscription_by_url("https://a.example/feed")
            .await
            .unwrap()
            .unwrap();
        store.delete_subscription(&stored).await.unwrap();

        assert!(store.list_subscriptions().await.unwrap().is_empty());
        assert!(store.load_episodes(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_subscriptions_sorted_by_title() {
        let dir = tempdir().unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();
        for (url, title) in [("https://z/feed", "Zeta"), ("https://a/feed", "Alpha")] {
            store
                .insert_subscription(&make_subscription(url, title))
                .await
                .unwrap();
        }

        let titles: Vec<_> = store
            .list_subscriptions()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, ["Alpha", "Zeta"]);
    }

    #[tokio::test]
    async fn library_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = JsonStore::open(dir.path()).await.unwrap();
            let id = store
                .insert_subscription(&make_subscription("https://a.example/feed", "A"))
                .await
                .unwrap();
            store.insert_episode(&make_episode(id, "e1", 1)).await.unwrap();
        }

        let store = JsonStore::open(dir.path()).await.unwrap();
        let stored = store
            .load_subscription_by_url("https://a.example/feed")
            .await
            .unwrap()
            .unwrap();
        let episodes = store.load_episodes(stored.id.unwrap()).await.unwrap();

        assert_eq!(episodes.len(), 1);
        assert!(!dir.path().join("library.json.partial").exists());
    }

    #[tokio::test]
    async fn corrupt_library_is_reported() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(LIBRARY_FILENAME), b"{ not json").unwrap();
        let store = JsonStore::open(dir.path()).await.unwrap();

        assert!(matches!(
            store.list_subscriptions().await,
            Err(StoreError::JsonParseFailed { .. })
        ));
    }
}
