use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use skintrack_core::{StateObserver, SubscriptionStore};
use tracing::info;

/// Keeps the advertised "watching N listing(s)" presence in step with the store.
pub struct StatusReporter {
    store: Arc<SubscriptionStore>,
    tracked: AtomicUsize,
}

impl StatusReporter {
    pub fn new(store: Arc<SubscriptionStore>) -> Self {
        let tracked = AtomicUsize::new(store.total_tracked());
        Self { store, tracked }
    }

    pub fn tracked(&self) -> usize {
        self.tracked.load(Ordering::Relaxed)
    }

    pub fn channels(&self) -> usize {
        self.store.list_channels().len()
    }

    pub fn presence_text(&self) -> String {
        presence_text(self.tracked())
    }
}

pub fn presence_text(tracked: usize) -> String {
    format!("{} listing(s)", tracked)
}

impl StateObserver for StatusReporter {
    fn on_state_changed(&self) {
        let tracked = self.store.total_tracked();
        self.tracked.store(tracked, Ordering::Relaxed);
        info!(tracked, presence = %presence_text(tracked), "presence updated");
    }
}
