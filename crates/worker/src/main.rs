use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use skintrack_core::config::Settings;
use skintrack_core::{StateObserver, SubscriptionStore, Tracker};
use skintrack_feed::FeedConfig;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod error;
mod jobs;
mod routes;
mod sink;
mod state;
mod status;

use crate::jobs::dispatch::Dispatcher;
use crate::sink::HttpSink;
use crate::state::AppState;
use crate::status::StatusReporter;

#[derive(Debug, Parser)]
#[command(name = "skintrack")]
#[command(about = "Skinport listing tracker and notifier", version)]
struct Args {
    /// Subscription store file (overrides SKINTRACK_STORE_PATH).
    #[arg(long)]
    store: Option<PathBuf>,
    #[arg(long)]
    feed_url: Option<String>,
    #[arg(long)]
    bind: Option<String>,
}

impl Args {
    fn apply(self, settings: &mut Settings) {
        if let Some(store) = self.store {
            settings.store_path = store;
        }
        if let Some(feed_url) = self.feed_url {
            settings.feed_url = feed_url;
        }
        if let Some(bind) = self.bind {
            settings.api_bind = bind;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let args = Args::parse();
    let mut settings = Settings::from_env()?;
    args.apply(&mut settings);

    let store = Arc::new(SubscriptionStore::open(&settings.store_path)?);
    info!(
        path = %settings.store_path.display(),
        channels = store.list_channels().len(),
        tracked = store.total_tracked(),
        "subscription store loaded"
    );

    let status = Arc::new(StatusReporter::new(store.clone()));
    status.on_state_changed();

    let tracker = Tracker::new(store.clone(), status.clone());
    let sink = Arc::new(HttpSink::new(
        settings.chat_api_base.clone(),
        settings.chat_token.clone(),
    )?);
    let dispatcher = Dispatcher::new(
        store.clone(),
        sink,
        status.clone(),
        settings.market_host.clone(),
    );

    let (tx, rx) = mpsc::channel(settings.feed_queue);
    let mut feed = tokio::spawn(skintrack_feed::run_feed(
        FeedConfig::new(settings.feed_url.clone()),
        tx,
    ));
    let mut engine = tokio::spawn(async move { dispatcher.run(rx).await });

    let app = routes::router(AppState { tracker, status });
    let addr: SocketAddr = settings.api_bind.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "skintrack starting");

    let mut feed_done = false;
    let mut engine_done = false;
    let outcome: Result<()> = tokio::select! {
        res = axum::serve(listener, app).into_future() => res.map_err(Into::into),
        res = &mut feed => {
            feed_done = true;
            res.map_err(Into::into).and_then(|run| run)
        }
        res = &mut engine => {
            engine_done = true;
            warn!("dispatcher stopped");
            res.map_err(Into::into)
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            Ok(())
        }
    };

    drain_pipeline(
        (!feed_done).then_some(feed),
        (!engine_done).then_some(engine),
    )
    .await;

    store.close()?;
    info!("subscription store flushed");

    outcome
}

/// Stops the feed, which closes the queue, then waits for the dispatcher to
/// finish the sales already queued. Tasks that already ended are `None`.
async fn drain_pipeline(feed: Option<JoinHandle<Result<()>>>, engine: Option<JoinHandle<()>>) {
    if let Some(feed) = feed {
        feed.abort();
        let _ = feed.await;
    }
    if let Some(engine) = engine {
        match engine.await {
            Ok(()) => info!("dispatcher drained"),
            Err(err) => error!(error = %err, "dispatcher failed during shutdown"),
        }
    }
}
