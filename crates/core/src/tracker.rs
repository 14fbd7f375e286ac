use std::sync::Arc;

use tracing::info;

use crate::error::StoreError;
use crate::store::SubscriptionStore;
use crate::types::{default_item_name, SubscriberChannel, TrackedListing};

/// Notified after any change that alters the number of tracked listings.
pub trait StateObserver: Send + Sync {
    fn on_state_changed(&self);
}

pub struct NoopObserver;

impl StateObserver for NoopObserver {
    fn on_state_changed(&self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRegistration {
    Created,
    Existing,
    Replaced { previous: String },
}

impl ChannelRegistration {
    pub fn is_new(&self) -> bool {
        !matches!(self, ChannelRegistration::Existing)
    }
}

/// Mutation API for the command front end and the channel lifecycle manager.
#[derive(Clone)]
pub struct Tracker {
    store: Arc<SubscriptionStore>,
    observer: Arc<dyn StateObserver>,
}

impl Tracker {
    pub fn new(store: Arc<SubscriptionStore>, observer: Arc<dyn StateObserver>) -> Self {
        Self { store, observer }
    }

    pub fn store(&self) -> &Arc<SubscriptionStore> {
        &self.store
    }

    pub fn track(
        &self,
        channel_id: &str,
        sale_id: i64,
        item_name: Option<&str>,
    ) -> Result<bool, StoreError> {
        let item_name = item_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| default_item_name(sale_id));
        let added = self.store.add_tracked_listing(channel_id, sale_id, &item_name)?;
        if added {
            info!(%channel_id, sale_id, %item_name, "listing tracked");
            self.observer.on_state_changed();
        }
        Ok(added)
    }

    pub fn untrack(&self, channel_id: &str, sale_id: i64) -> Result<bool, StoreError> {
        let removed = self.store.remove_tracked_listing(channel_id, sale_id)?;
        if removed {
            info!(%channel_id, sale_id, "listing untracked");
            self.observer.on_state_changed();
        }
        Ok(removed)
    }

    pub fn list(&self, channel_id: &str) -> Vec<TrackedListing> {
        self.store.list_tracked_listings(channel_id)
    }

    pub fn channel(&self, channel_id: &str) -> Option<SubscriberChannel> {
        self.store.get_channel(channel_id)
    }

    /// Registers the user's delivery channel. A user has at most one channel
    /// per community; registering a new one drops the stale record and the
    /// listings attached to it.
    pub fn open_channel(
        &self,
        community_id: &str,
        channel_id: &str,
        user_id: &str,
    ) -> Result<ChannelRegistration, StoreError> {
        let mut replaced = None;
        match self.store.channel_for_user(community_id, user_id) {
            Some(existing) if existing.channel_id == channel_id => {
                return Ok(ChannelRegistration::Existing);
            }
            Some(stale) => {
                self.store.deregister_channel(&stale.channel_id)?;
                info!(
                    stale = %stale.channel_id,
                    %channel_id,
                    %user_id,
                    "replacing stale channel"
                );
                replaced = Some(stale.channel_id);
            }
            None => {}
        }

        let created = self.store.register_channel(community_id, channel_id, user_id)?;
        if replaced.is_some() {
            self.observer.on_state_changed();
        }

        Ok(match (created, replaced) {
            (true, Some(previous)) => ChannelRegistration::Replaced { previous },
            (true, None) => ChannelRegistration::Created,
            (false, _) => ChannelRegistration::Existing,
        })
    }

    /// Drops a channel that became unusable along with everything it tracked.
    pub fn close_channel(&self, channel_id: &str) -> Result<bool, StoreError> {
        let removed = self.store.deregister_channel(channel_id)?;
        if removed {
            info!(%channel_id, "channel closed");
            self.observer.on_state_changed();
        }
        Ok(removed)
    }
}
