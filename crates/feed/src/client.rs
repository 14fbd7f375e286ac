use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use futures_util::{SinkExt, StreamExt};
use skintrack_core::feed::{FeedEvent, FeedFrame, FeedJoin};
use skintrack_core::types::SaleEvent;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

const RECONNECT_FLOOR: Duration = Duration::from_secs(1);
const RECONNECT_CEILING: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub url: String,
    pub join: FeedJoin,
}

impl FeedConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            join: FeedJoin::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

fn reconnect_backoff() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(RECONNECT_FLOOR)
        .with_max_interval(RECONNECT_CEILING)
        .with_max_elapsed_time(None)
        .build()
}

/// Runs until the receiving side of `sales` is dropped.
pub async fn run_feed(config: FeedConfig, sales: mpsc::Sender<SaleEvent>) -> anyhow::Result<()> {
    let mut backoff = reconnect_backoff();

    loop {
        match connect_and_run(&config, &sales).await {
            Ok(Flow::Stop) => {
                info!("sale queue closed, feed stopping");
                return Ok(());
            }
            Ok(Flow::Continue) => {
                info!("feed disconnected cleanly");
                backoff.reset();
            }
            Err(err) => {
                error!(error = %err, "feed error");
            }
        }

        if sales.is_closed() {
            return Ok(());
        }

        let delay = backoff.next_backoff().unwrap_or(RECONNECT_CEILING);
        info!(?delay, "reconnecting");
        tokio::time::sleep(delay).await;
    }
}

async fn connect_and_run(
    config: &FeedConfig,
    sales: &mpsc::Sender<SaleEvent>,
) -> anyhow::Result<Flow> {
    let (ws_stream, _) = tokio_tungstenite::connect_async(&config.url).await?;
    let (mut write, mut read) = ws_stream.split();
    info!(url = %config.url, "connected to sale feed");

    let join = FeedFrame::join(&config.join)?;
    write
        .send(Message::Text(serde_json::to_string(&join)?))
        .await?;

    while let Some(message) = read.next().await {
        let flow = match message? {
            Message::Text(text) => handle_feed_text(&text, sales).await,
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => handle_feed_text(&text, sales).await,
                Err(_) => {
                    warn!("non-utf8 binary frame");
                    Flow::Continue
                }
            },
            Message::Ping(payload) => {
                let _ = write.send(Message::Pong(payload)).await;
                Flow::Continue
            }
            Message::Close(_) => break,
            _ => Flow::Continue,
        };
        if flow == Flow::Stop {
            return Ok(Flow::Stop);
        }
    }

    Ok(Flow::Continue)
}

async fn handle_feed_text(text: &str, sales: &mpsc::Sender<SaleEvent>) -> Flow {
    let event = match serde_json::from_str::<FeedFrame>(text).and_then(FeedFrame::into_event) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "invalid feed message");
            return Flow::Continue;
        }
    };

    let batch = match event {
        FeedEvent::Sales(batch) if batch.is_listed() => batch,
        FeedEvent::Sales(batch) => {
            debug!(event_type = %batch.event_type, "ignoring sale feed batch");
            return Flow::Continue;
        }
        FeedEvent::Other(name) => {
            debug!(event = %name, "ignoring feed event");
            return Flow::Continue;
        }
    };

    for decoded in batch.into_sales() {
        let sale = match decoded {
            Ok(sale) => sale,
            Err(err) => {
                warn!(error = %err, "discarding sale");
                continue;
            }
        };
        if sales.send(sale).await.is_err() {
            return Flow::Stop;
        }
    }

    Flow::Continue
}
