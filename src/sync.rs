// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;

use crate::error::SyncError;
use crate::feed::{EpisodeRecord, FeedDocument, fetch_feed};
use crate::http::HttpClient;
use crate::progress::{NoopReporter, ProgressEvent, SharedProgressReporter};
use crate::store::{PersistedEpisode, Podcast, Store, Subscription};

/// New episodes found for one subscription during a refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSummary {
    pub feed_url: String,
    pub title: String,
    pub new_episode_count: usize,
}

/// Cooperative cancellation for [`SyncEngine::refresh_all`].
///
/// Checked before each subscription; a feed that is already being fetched
/// is finished first.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of comparing a remote feed against the stored episodes
#[derive(Debug, Clone)]
pub struct ReconcilePlan<'a> {
    /// Remote episodes whose identifier is not stored yet, in feed order
    pub new_episodes: Vec<&'a EpisodeRecord>,
    /// Remote episodes that are already stored or repeat an earlier identifier
    pub skipped: usize,
    /// Total number of episodes in the remote feed
    pub total_episodes: usize,
}

/// Determine which remote episodes are new.
///
/// An episode is new when its identifier matches neither a stored episode nor
/// an earlier episode of the same feed. Feed order is preserved.
pub fn plan_new_episodes<'a>(
    remote: &'a [EpisodeRecord],
    local: &[PersistedEpisode],
) -> ReconcilePlan<'a> {
    let mut seen: HashSet<&str> = local.iter().map(|e| e.identifier.as_str()).collect();
    let mut new_episodes = Vec::new();

    for episode in remote {
        if seen.insert(episode.identifier.as_str()) {
            new_episodes.push(episode);
        }
    }

    ReconcilePlan {
        skipped: remote.len() - new_episodes.len(),
        total_episodes: remote.len(),
        new_episodes,
    }
}

/// Keeps stored subscriptions in step with their remote feeds
pub struct SyncEngine<C, S> {
    client: C,
    store: S,
    reporter: SharedProgressReporter,
    /// Serializes the read-existing / insert-new section per subscription
    write_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl<C: HttpClient, S: Store> SyncEngine<C, S> {
    pub fn new(client: C, store: S) -> Self {
        Self {
            client,
            store,
            reporter: NoopReporter::shared(),
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Report refresh progress to `reporter`
    pub fn with_reporter(mut self, reporter: SharedProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fetch and parse a feed, or `None` if it is unreachable, answers with an
    /// error status, or is not well-formed XML
    pub async fn fetch_and_build(&self, feed_url: &str) -> Option<FeedDocument> {
        match fetch_feed(&self.client, feed_url).await {
            Ok(document) => Some(document),
            Err(e) => {
                tracing::warn!(url = %feed_url, error = %e, "Could not load feed");
                None
            }
        }
    }

    /// Look up a podcast, preferring the stored copy over the network.
    ///
    /// A stored subscription is returned with its stored episodes and no
    /// request is made. Otherwise the feed is fetched and mapped to a podcast
    /// that has not been stored.
    pub async fn try_resolve(&self, feed_url: &str) -> Result<Podcast, SyncError> {
        if let Some(subscription) = self.store.load_subscription_by_url(feed_url).await?
            && let Some(id) = subscription.id
        {
            let episodes = self.store.load_episodes(id).await?;
            return Ok(Podcast {
                subscription,
                episodes,
            });
        }

        let document = fetch_feed(&self.client, feed_url).await?;
        Ok(Podcast::from_document(feed_url, &document))
    }

    /// Like [`Self::try_resolve`], logging failures instead of returning them
    pub async fn resolve_or_fetch(&self, feed_url: &str) -> Option<Podcast> {
        match self.try_resolve(feed_url).await {
            Ok(podcast) => Some(podcast),
            Err(e) => {
                tracing::warn!(url = %feed_url, error = %e, "Could not resolve podcast");
                None
            }
        }
    }

    /// Refresh every stored subscription, one after another.
    ///
    /// Only subscriptions that gained episodes appear in the result. A feed
    /// that cannot be fetched, parsed or stored is skipped without affecting
    /// the others.
    pub async fn refresh_all(&self, cancel: &CancellationFlag) -> Vec<RefreshSummary> {
        let subscriptions = match self.store.list_subscriptions().await {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                tracing::error!(error = %e, "Could not list subscriptions");
                return Vec::new();
            }
        };

        let total = subscriptions.len();
        self.reporter
            .report(ProgressEvent::RefreshStarting { total });

        let mut summaries = Vec::new();
        let mut new_episodes = 0;

        for (index, subscription) in subscriptions.iter().enumerate() {
            if cancel.is_cancelled() {
                let remaining = total - index;
                tracing::info!(remaining, "Refresh cancelled");
                self.reporter
                    .report(ProgressEvent::RefreshCancelled { remaining });
                break;
            }

            match self.refresh_one(subscription).await {
                Ok(Some(summary)) => {
                    new_episodes += summary.new_episode_count;
                    summaries.push(summary);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(url = %subscription.feed_url, error = %e, "Skipping feed");
                    self.reporter.report(ProgressEvent::FeedSkipped {
                        url: subscription.feed_url.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        self.reporter.report(ProgressEvent::RefreshCompleted {
            updated_feeds: summaries.len(),
            new_episodes,
        });

        summaries
    }

    async fn refresh_one(
        &self,
        subscription: &Subscription,
    ) -> Result<Option<RefreshSummary>, SyncError> {
        let Some(id) = subscription.id else {
            return Ok(None);
        };

        self.reporter.report(ProgressEvent::FetchingFeed {
            url: subscription.feed_url.clone(),
        });
        let document = fetch_feed(&self.client, &subscription.feed_url).await?;

        let lock = self.write_lock(id).await;
        let _guard = lock.lock().await;

        let local = self.store.load_episodes(id).await?;
        let plan = plan_new_episodes(&document.episodes, &local);

        tracing::debug!(
            url = %subscription.feed_url,
            total = plan.total_episodes,
            new = plan.new_episodes.len(),
            "Feed reconciled"
        );
        self.reporter.report(ProgressEvent::FeedReconciled {
            podcast_title: subscription.title.clone(),
            total_episodes: plan.total_episodes,
            new_episodes: plan.new_episodes.len(),
        });

        if plan.new_episodes.is_empty() {
            return Ok(None);
        }

        let episodes: Vec<_> = plan
            .new_episodes
            .iter()
            .map(|record| PersistedEpisode::from_record(record).for_subscription(id))
            .collect();
        self.store.insert_episodes(&episodes).await?;

        Ok(Some(RefreshSummary {
            feed_url: subscription.feed_url.clone(),
            title: subscription.title.clone(),
            new_episode_count: plan.new_episodes.len(),
        }))
    }

    /// Store a podcast and every episode it currently carries; returns the
    /// subscription id
    pub async fn subscribe(&self, podcast: &Podcast) -> Result<i64, SyncError> {
        let id = self.store.insert_subscription(&podcast.subscription).await?;

        let lock = self.write_lock(id).await;
        let _guard = lock.lock().await;

        let episodes: Vec<_> = podcast
            .episodes
            .iter()
            .map(|episode| episode.clone().for_subscription(id))
            .collect();
        self.store.insert_episodes(&episodes).await?;

        tracing::info!(
            url = %podcast.subscription.feed_url,
            id,
            episodes = podcast.episodes.len(),
            "Subscribed"
        );
        Ok(id)
    }

    /// Remove a podcast; its episodes go with it
    pub async fn unsubscribe(&self, podcast: &Podcast) -> Result<(), SyncError> {
        self.store.delete_subscription(&podcast.subscription).await?;

        if let Some(id) = podcast.subscription.id {
            self.write_locks.lock().await.remove(&id);
        }

        tracing::info!(url = %podcast.subscription.feed_url, "Unsubscribed");
        Ok(())
    }

    /// All stored subscriptions, ordered by title
    pub async fn list_subscriptions(&self) -> Result<Vec<Subscription>, SyncError> {
        Ok(self.store.list_subscriptions().await?)
    }

    async fn write_lock(&self, subscription_id: i64) -> Arc<Mutex<()>> {
        self.write_locks
            .lock()
            .await
            .entry(subscription_id)
            .or_default()
            .clone()
    }
}
