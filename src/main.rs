// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use podsync::text::{html_to_plain, truncate};
use podsync::{
    CancellationFlag, JsonStore, NoopReporter, Podcast, ProgressEvent, ProgressReporter,
    ReqwestClient, SharedProgressReporter, Store, SyncEngine, is_url,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static BELL: Emoji<'_, '_> = Emoji("🔔 ", "[*] ");

/// Subscribe to podcasts and keep their episode lists up to date
#[derive(Parser, Debug)]
#[command(name = "podsync")]
#[command(about = "Subscribe to podcasts and keep their episode lists up to date")]
#[command(version)]
struct Args {
    /// Directory holding the podcast library
    #[arg(long, global = true, default_value = "podsync-library")]
    library: PathBuf,

    /// Quiet mode - suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a feed and store it with all of its current episodes
    Subscribe { feed_url: String },

    /// Remove a podcast and its episodes from the library
    Unsubscribe { feed_url: String },

    /// List stored podcasts
    List,

    /// Show a podcast and its latest episodes (stored copy first, else fetched)
    Show {
        feed_url: String,

        /// Number of episodes to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Check every stored podcast for new episodes
    Refresh,
}

/// Progress reporter using an indicatif spinner
struct SpinnerReporter {
    bar: ProgressBar,
}

impl SpinnerReporter {
    fn new() -> Result<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {wide_msg}")?);
        bar.enable_steady_tick(std::time::Duration::from_millis(100));
        Ok(Self { bar })
    }
}

impl ProgressReporter for SpinnerReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::RefreshStarting { total } => {
                self.bar.set_message(format!(
                    "Refreshing {} podcasts",
                    total.to_string().cyan()
                ));
            }

            ProgressEvent::FetchingFeed { url } => {
                self.bar
                    .set_message(format!("{SEARCH}Fetching feed: {}", url.cyan()));
            }

            ProgressEvent::FeedReconciled {
                podcast_title,
                total_episodes,
                new_episodes,
            } => {
                self.bar.println(format!(
                    "{HEADPHONES}{} • {} episodes, {} new",
                    podcast_title.bold().green(),
                    total_episodes.to_string().cyan(),
                    new_episodes.to_string().yellow()
                ));
            }

            ProgressEvent::FeedSkipped { url, error } => {
                self.bar.println(format!(
                    "{FAILURE}{} - {}",
                    url.red(),
                    error.dimmed()
                ));
            }

            ProgressEvent::RefreshCancelled { remaining } => {
                self.bar.println(format!(
                    "{FAILURE}Cancelled, {} podcasts not checked",
                    remaining.to_string().yellow()
                ));
            }

            ProgressEvent::RefreshCompleted {
                updated_feeds,
                new_episodes,
            } => {
                self.bar.finish_and_clear();
                println!(
                    "\n{SUCCESS}{} {} new episodes in {} podcasts",
                    "Refresh complete:".bold().green(),
                    new_episodes.to_string().green().bold(),
                    updated_feeds.to_string().cyan()
                );
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    if !args.quiet {
        println!(
            "\n{}{} {}\n",
            MICROPHONE,
            "podsync".bold().magenta(),
            "- Podcast Subscriptions".dimmed()
        );
    }

    let client = ReqwestClient::new().context("Failed to create HTTP client")?;
    let store = JsonStore::open(&args.library)
        .await
        .with_context(|| format!("Failed to open library {}", args.library.display()))?;

    let show_progress = !args.quiet && matches!(args.command, Command::Refresh);
    let reporter: SharedProgressReporter = if show_progress {
        Arc::new(SpinnerReporter::new()?)
    } else {
        NoopReporter::shared()
    };
    let engine = SyncEngine::new(client, store).with_reporter(reporter);

    match args.command {
        Command::Subscribe { feed_url } => subscribe(&engine, &feed_url).await,
        Command::Unsubscribe { feed_url } => unsubscribe(&engine, &feed_url).await,
        Command::List => list(&engine).await,
        Command::Show { feed_url, limit } => show(&engine, &feed_url, limit).await,
        Command::Refresh => refresh(&engine).await,
    }
}

type Engine = SyncEngine<ReqwestClient, JsonStore>;

async fn subscribe(engine: &Engine, feed_url: &str) -> Result<()> {
    if !is_url(feed_url) {
        bail!("'{}' is not an http(s) URL", feed_url);
    }

    let podcast = engine
        .try_resolve(feed_url)
        .await
        .with_context(|| format!("Failed to load feed {}", feed_url))?;

    if podcast.is_stored() {
        println!(
            "Already subscribed to {}",
            podcast.subscription.title.bold()
        );
        return Ok(());
    }

    engine.subscribe(&podcast).await.context("Failed to save podcast")?;
    println!(
        "{SUCCESS}Subscribed to {} ({} episodes)",
        podcast.subscription.title.bold().green(),
        podcast.episodes.len().to_string().cyan()
    );
    Ok(())
}

async fn unsubscribe(engine: &Engine, feed_url: &str) -> Result<()> {
    let Some(subscription) = engine
        .store()
        .load_subscription_by_url(feed_url)
        .await
        .context("Failed to read library")?
    else {
        bail!("Not subscribed to {}", feed_url);
    };

    let podcast = Podcast {
        subscription,
        episodes: Vec::new(),
    };
    engine
        .unsubscribe(&podcast)
        .await
        .context("Failed to remove podcast")?;
    println!("Unsubscribed from {}", podcast.subscription.title.bold());
    Ok(())
}

async fn list(engine: &Engine) -> Result<()> {
    let subscriptions = engine
        .list_subscriptions()
        .await
        .context("Failed to read library")?;

    if subscriptions.is_empty() {
        println!("No subscriptions yet.");
        return Ok(());
    }

    for subscription in subscriptions {
        println!(
            "{HEADPHONES}{}\n    {} (updated {})",
            subscription.title.bold(),
            subscription.feed_url.cyan(),
            subscription.last_updated.format("%Y-%m-%d")
        );
    }
    Ok(())
}

async fn show(engine: &Engine, feed_url: &str, limit: usize) -> Result<()> {
    let Some(podcast) = engine.resolve_or_fetch(feed_url).await else {
        bail!("Error loading feed {}", feed_url);
    };

    let subscription = &podcast.subscription;
    println!("{}", subscription.title.bold().green());
    if !podcast.is_stored() {
        println!("{}", "(not subscribed)".dimmed());
    }
    let description = html_to_plain(&subscription.description);
    if !description.is_empty() {
        println!("\n{}", description);
    }
    println!();

    for episode in podcast.episodes.iter().take(limit) {
        println!(
            "{} {} {}",
            episode.published_at.format("%Y-%m-%d").to_string().cyan(),
            truncate(&episode.title, 60).bold(),
            episode.duration_text.dimmed()
        );
        let summary = html_to_plain(&episode.description);
        if !summary.is_empty() {
            println!("    {}", truncate(summary.lines().next().unwrap_or_default(), 100));
        }
    }
    Ok(())
}

async fn refresh(engine: &Engine) -> Result<()> {
    let cancel = CancellationFlag::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, finishing current feed");
            on_ctrl_c.cancel();
        }
    });

    let summaries = engine.refresh_all(&cancel).await;

    for summary in &summaries {
        println!(
            "{BELL}{}: {} new episodes",
            summary.title.bold(),
            summary.new_episode_count.to_string().yellow()
        );
    }
    Ok(())
}
