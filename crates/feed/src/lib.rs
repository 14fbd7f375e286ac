//! Reconnecting client for the marketplace sale feed.
//!
//! Decoded sales are pushed onto a bounded channel consumed by the dispatcher.

mod client;

pub use client::{run_feed, FeedConfig};
