// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod error;
pub mod feed;
pub mod http;
pub mod progress;
pub mod store;
pub mod sync;
pub mod text;

// Re-export main types for convenience
pub use error::{FeedError, StoreError, SyncError};
pub use feed::{EpisodeRecord, FeedDocument, fetch_feed, is_url, parse_feed};
pub use http::{HttpClient, HttpConfig, HttpResponse, ReqwestClient, request_base};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use store::{JsonStore, PersistedEpisode, Podcast, Store, Subscription};
pub use sync::{CancellationFlag, RefreshSummary, SyncEngine, plan_new_episodes};
