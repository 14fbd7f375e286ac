pub mod config;
pub mod error;
pub mod feed;
pub mod store;
pub mod tracker;
pub mod types;

pub use error::StoreError;
pub use store::SubscriptionStore;
pub use tracker::{ChannelRegistration, NoopObserver, StateObserver, Tracker};
pub use types::{SaleEvent, SubscriberChannel, TrackedListing};
