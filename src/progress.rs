// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

/// Events emitted while refreshing subscriptions
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A refresh pass over `total` subscriptions is starting
    RefreshStarting { total: usize },

    /// Feed is being fetched from URL
    FetchingFeed { url: String },

    /// Feed was fetched and compared against the stored episodes
    FeedReconciled {
        podcast_title: String,
        total_episodes: usize,
        new_episodes: usize,
    },

    /// Feed could not be fetched or parsed and was left untouched
    FeedSkipped { url: String, error: String },

    /// The pass stopped early because cancellation was requested
    RefreshCancelled { remaining: usize },

    /// Refresh pass completed
    RefreshCompleted {
        updated_feeds: usize,
        new_episodes: usize,
    },
}

/// Trait for reporting progress events during a refresh.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_reporter_handles_all_events() {
        let reporter = NoopReporter;

        reporter.report(ProgressEvent::RefreshStarting { total: 3 });
        reporter.report(ProgressEvent::FetchingFeed {
            url: "https://example.com/feed.xml".to_string(),
        });
        reporter.report(ProgressEvent::FeedReconciled {
            podcast_title: "Test Podcast".to_string(),
            total_episodes: 10,
            new_episodes: 2,
        });
        reporter.report(ProgressEvent::FeedSkipped {
            url: "https://example.com/gone.xml".to_string(),
            error: "HTTP error 404".to_string(),
        });
        reporter.report(ProgressEvent::RefreshCancelled { remaining: 1 });
        reporter.report(ProgressEvent::RefreshCompleted {
            updated_feeds: 1,
            new_episodes: 2,
        });
    }
}
