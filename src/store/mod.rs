// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod json;
mod model;

use async_trait::async_trait;

use crate::error::StoreError;

pub use json::JsonStore;
pub use model::{PersistedEpisode, Podcast, Subscription};

/// Persistence for subscriptions and their episodes
#[async_trait]
pub trait Store: Send + Sync {
    /// Find the subscription with this feed URL
    async fn load_subscription_by_url(
        &self,
        feed_url: &str,
    ) -> Result<Option<Subscription>, StoreError>;

    /// Episodes of one subscription, newest first
    async fn load_episodes(&self, subscription_id: i64)
    -> Result<Vec<PersistedEpisode>, StoreError>;

    /// Insert or replace a subscription keyed by its feed URL; returns its id
    async fn insert_subscription(&self, subscription: &Subscription) -> Result<i64, StoreError>;

    /// Insert or replace an episode keyed by its identifier within its subscription
    async fn insert_episode(&self, episode: &PersistedEpisode) -> Result<(), StoreError> {
        self.insert_episodes(std::slice::from_ref(episode)).await
    }

    /// Insert or replace several episodes as one write. Nothing is stored if
    /// any of them belongs to no stored subscription.
    async fn insert_episodes(&self, episodes: &[PersistedEpisode]) -> Result<(), StoreError>;

    /// Delete a subscription and all of its episodes
    async fn delete_subscription(&self, subscription: &Subscription) -> Result<(), StoreError>;

    /// All subscriptions, ordered by title
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, StoreError>;
}
