use std::sync::Arc;

use futures_util::future::join_all;
use skintrack_core::types::{SaleEvent, SubscriberChannel};
use skintrack_core::{StateObserver, SubscriptionStore};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::sink::NotificationSink;

pub const CURRENCY_SYMBOL: &str = "€";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel_id: String,
    pub sale_id: i64,
    pub content: String,
}

impl Notification {
    pub fn for_sale(channel: &SubscriberChannel, sale: &SaleEvent, market_host: &str) -> Self {
        let content = format!(
            "{} Your tracked item is now tradable!\n\n**{}**\nPrice: {}{}\n[View on Skinport]({})",
            channel.mention(),
            sale.market_name,
            CURRENCY_SYMBOL,
            sale.display_price(),
            sale.item_url(market_host),
        );
        Self {
            channel_id: channel.channel_id.clone(),
            sale_id: sale.sale_id,
            content,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Delivered,
    Failed,
}

/// Matches sale events against the store and notifies every subscriber
/// tracking the sale. A listing is retired only after its notification was
/// accepted by the sink.
pub struct Dispatcher {
    store: Arc<SubscriptionStore>,
    sink: Arc<dyn NotificationSink>,
    observer: Arc<dyn StateObserver>,
    market_host: String,
}

impl Dispatcher {
    pub fn new(
        store: Arc<SubscriptionStore>,
        sink: Arc<dyn NotificationSink>,
        observer: Arc<dyn StateObserver>,
        market_host: impl Into<String>,
    ) -> Self {
        Self {
            store,
            sink,
            observer,
            market_host: market_host.into(),
        }
    }

    /// Consumes sale events one at a time until the feed side hangs up.
    pub async fn run(&self, mut sales: mpsc::Receiver<SaleEvent>) {
        while let Some(sale) = sales.recv().await {
            let outcome = self.handle_sale(&sale).await;
            if outcome.failed > 0 {
                warn!(
                    sale_id = sale.sale_id,
                    delivered = outcome.delivered,
                    failed = outcome.failed,
                    "some notifications were not delivered"
                );
            }
        }
        info!("sale feed closed, dispatcher stopping");
    }

    pub async fn handle_sale(&self, sale: &SaleEvent) -> DispatchOutcome {
        let tracked = self.store.all_tracked_sale_ids();
        if tracked.is_empty() || !tracked.contains(&sale.sale_id) {
            return DispatchOutcome::default();
        }

        info!(sale_id = sale.sale_id, market_name = %sale.market_name, "tracked item listed");

        let channels = self.store.channels_tracking(sale.sale_id);
        if channels.is_empty() {
            debug!(sale_id = sale.sale_id, "listing untracked before dispatch");
            return DispatchOutcome::default();
        }

        let attempts = join_all(
            channels
                .iter()
                .map(|channel| self.notify_channel(channel, sale)),
        )
        .await;

        attempts
            .into_iter()
            .fold(DispatchOutcome::default(), |mut outcome, attempt| {
                match attempt {
                    Attempt::Delivered => outcome.delivered += 1,
                    Attempt::Failed => outcome.failed += 1,
                }
                outcome
            })
    }

    async fn notify_channel(&self, channel: &SubscriberChannel, sale: &SaleEvent) -> Attempt {
        let channel_id = channel.channel_id.as_str();

        let target = match self.sink.resolve(channel_id).await {
            Ok(target) => target,
            Err(err) => {
                warn!(
                    %channel_id,
                    sale_id = sale.sale_id,
                    error = %err,
                    "failed to resolve channel"
                );
                return Attempt::Failed;
            }
        };

        let notification = Notification::for_sale(channel, sale, &self.market_host);
        if let Err(err) = self.sink.send(&target, &notification).await {
            warn!(%channel_id, sale_id = sale.sale_id, error = %err, "failed to notify channel");
            return Attempt::Failed;
        }

        // The message is out; a failed removal only risks a repeat notification.
        match self.store.remove_tracked_listing(channel_id, sale.sale_id) {
            Ok(true) => {}
            Ok(false) => debug!(%channel_id, sale_id = sale.sale_id, "listing already untracked"),
            Err(err) => {
                error!(
                    %channel_id,
                    sale_id = sale.sale_id,
                    error = %err,
                    "failed to retire listing"
                )
            }
        }
        self.observer.on_state_changed();
        info!(%channel_id, sale_id = sale.sale_id, "subscriber notified");

        Attempt::Delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{ChannelTarget, SinkError};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockSink {
        gone: HashSet<String>,
        rejecting: HashSet<String>,
        resolves: Mutex<Vec<String>>,
        sent: Mutex<Vec<Notification>>,
    }

    impl MockSink {
        fn gone(mut self, channel_id: &str) -> Self {
            self.gone.insert(channel_id.to_string());
            self
        }

        fn rejecting(mut self, channel_id: &str) -> Self {
            self.rejecting.insert(channel_id.to_string());
            self
        }

        fn resolve_count(&self) -> usize {
            self.resolves.lock().unwrap().len()
        }

        fn sent(&self) -> Vec<Notification> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationSink for MockSink {
        async fn resolve(&self, channel_id: &str) -> Result<ChannelTarget, SinkError> {
            self.resolves.lock().unwrap().push(channel_id.to_string());
            if self.gone.contains(channel_id) {
                return Err(SinkError::ChannelGone(channel_id.to_string()));
            }
            Ok(ChannelTarget {
                channel_id: channel_id.to_string(),
            })
        }

        async fn send(
            &self,
            target: &ChannelTarget,
            notification: &Notification,
        ) -> Result<(), SinkError> {
            self.sent.lock().unwrap().push(notification.clone());
            if self.rejecting.contains(&target.channel_id) {
                return Err(SinkError::Rejected(500));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingObserver(AtomicUsize);

    impl StateObserver for CountingObserver {
        fn on_state_changed(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn dragon_lore() -> SaleEvent {
        SaleEvent {
            sale_id: 12345,
            market_name: "AWP | Dragon Lore".to_string(),
            sale_price: 50000,
            url: "awp-dragon-lore".to_string(),
        }
    }

    fn setup(
        sink: MockSink,
    ) -> (
        Dispatcher,
        Arc<SubscriptionStore>,
        Arc<MockSink>,
        Arc<CountingObserver>,
    ) {
        let store = Arc::new(SubscriptionStore::in_memory());
        let sink = Arc::new(sink);
        let observer = Arc::new(CountingObserver::default());
        let dispatcher = Dispatcher::new(
            store.clone(),
            sink.clone(),
            observer.clone(),
            "skinport.com",
        );
        (dispatcher, store, sink, observer)
    }

    #[tokio::test]
    async fn test_matched_sale_notifies_and_retires_listing() {
        let (dispatcher, store, sink, observer) = setup(MockSink::default());
        store.register_channel("g1", "ch1", "u1").unwrap();
        assert!(store
            .add_tracked_listing("ch1", 12345, "AWP Dragon Lore")
            .unwrap());

        let outcome = dispatcher.handle_sale(&dragon_lore()).await;

        assert_eq!(outcome, DispatchOutcome { delivered: 1, failed: 0 });
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        let content = &sent[0].content;
        assert!(content.starts_with("<@u1>"));
        assert!(content.contains("AWP | Dragon Lore"));
        assert!(content.contains("€500.00"));
        assert!(content.contains("https://skinport.com/item/awp-dragon-lore/12345)"));
        assert!(store.list_tracked_listings("ch1").is_empty());
        assert_eq!(observer.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_untracked_sale_touches_nothing() {
        let (dispatcher, store, sink, observer) = setup(MockSink::default());
        store.register_channel("g1", "ch1", "u1").unwrap();
        store.add_tracked_listing("ch1", 1, "one").unwrap();
        let before = store.list_channels();

        let outcome = dispatcher.handle_sale(&dragon_lore()).await;

        assert_eq!(outcome, DispatchOutcome::default());
        assert_eq!(sink.resolve_count(), 0);
        assert!(sink.sent().is_empty());
        assert_eq!(store.list_channels(), before);
        assert_eq!(observer.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_store_is_noop() {
        let (dispatcher, _store, sink, _) = setup(MockSink::default());
        let outcome = dispatcher.handle_sale(&dragon_lore()).await;
        assert_eq!(outcome, DispatchOutcome::default());
        assert_eq!(sink.resolve_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_delivery_keeps_listing_for_that_channel_only() {
        let (dispatcher, store, sink, _) = setup(MockSink::default().rejecting("ch2"));
        store.register_channel("g1", "ch1", "u1").unwrap();
        store.register_channel("g1", "ch2", "u2").unwrap();
        store.add_tracked_listing("ch1", 12345, "a").unwrap();
        store.add_tracked_listing("ch2", 12345, "b").unwrap();

        let outcome = dispatcher.handle_sale(&dragon_lore()).await;

        assert_eq!(outcome, DispatchOutcome { delivered: 1, failed: 1 });
        assert_eq!(sink.sent().len(), 2);
        assert_eq!(sink.resolve_count(), 2);
        assert!(!store.get_channel("ch1").unwrap().tracks(12345));
        assert!(store.get_channel("ch2").unwrap().tracks(12345));
    }

    #[tokio::test]
    async fn test_unresolvable_channel_does_not_block_siblings() {
        let (dispatcher, store, sink, _) = setup(MockSink::default().gone("ch1"));
        store.register_channel("g1", "ch1", "u1").unwrap();
        store.register_channel("g1", "ch2", "u2").unwrap();
        store.add_tracked_listing("ch1", 12345, "a").unwrap();
        store.add_tracked_listing("ch2", 12345, "b").unwrap();

        let outcome = dispatcher.handle_sale(&dragon_lore()).await;

        assert_eq!(outcome, DispatchOutcome { delivered: 1, failed: 1 });
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel_id, "ch2");
        assert!(store.get_channel("ch1").unwrap().tracks(12345));
        assert!(!store.get_channel("ch2").unwrap().tracks(12345));
    }

    #[tokio::test]
    async fn test_duplicate_emission_is_safe_noop() {
        let (dispatcher, store, sink, _) = setup(MockSink::default());
        store.register_channel("g1", "ch1", "u1").unwrap();
        store.add_tracked_listing("ch1", 12345, "a").unwrap();

        dispatcher.handle_sale(&dragon_lore()).await;
        let second = dispatcher.handle_sale(&dragon_lore()).await;

        assert_eq!(second, DispatchOutcome::default());
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_retried_on_next_event() {
        let (dispatcher, store, _, _) = setup(MockSink::default().rejecting("ch1"));
        store.register_channel("g1", "ch1", "u1").unwrap();
        store.add_tracked_listing("ch1", 12345, "a").unwrap();

        dispatcher.handle_sale(&dragon_lore()).await;
        let second = dispatcher.handle_sale(&dragon_lore()).await;

        assert_eq!(second, DispatchOutcome { delivered: 0, failed: 1 });
        assert!(store.get_channel("ch1").unwrap().tracks(12345));
    }

    #[tokio::test]
    async fn test_run_drains_queue_until_closed() {
        let (dispatcher, store, sink, _) = setup(MockSink::default());
        store.register_channel("g1", "ch1", "u1").unwrap();
        store.add_tracked_listing("ch1", 12345, "a").unwrap();
        store.add_tracked_listing("ch1", 7, "b").unwrap();

        let (tx, rx) = mpsc::channel(4);
        let mut other = dragon_lore();
        other.sale_id = 7;
        tx.send(dragon_lore()).await.unwrap();
        tx.send(other).await.unwrap();
        drop(tx);

        dispatcher.run(rx).await;

        assert_eq!(sink.sent().len(), 2);
        assert!(store.list_tracked_listings("ch1").is_empty());
    }

    #[test]
    fn test_notification_format() {
        let channel = SubscriberChannel::new("g1", "ch1", "u1");
        let notification = Notification::for_sale(&channel, &dragon_lore(), "skinport.com");
        assert_eq!(
            notification.content,
            "<@u1> Your tracked item is now tradable!\n\n**AWP | Dragon Lore**\nPrice: €500.00\n\
             [View on Skinport](https://skinport.com/item/awp-dragon-lore/12345)"
        );
        assert_eq!(notification.channel_id, "ch1");
        assert_eq!(notification.sale_id, 12345);
    }
}
