use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// A subscriber's private delivery channel and the listings it watches.
///
/// Serialized with the field names of the durable `threads.json` layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberChannel {
    #[serde(rename = "guildId")]
    pub community_id: String,
    #[serde(rename = "threadId")]
    pub channel_id: String,
    pub user_id: String,
    #[serde(default)]
    pub tracked_listings: Vec<TrackedListing>,
}

impl SubscriberChannel {
    pub fn new(community_id: &str, channel_id: &str, user_id: &str) -> Self {
        Self {
            community_id: community_id.to_string(),
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
            tracked_listings: Vec::new(),
        }
    }

    pub fn tracks(&self, sale_id: i64) -> bool {
        self.tracked_listings.iter().any(|l| l.sale_id == sale_id)
    }

    /// Addressing token placed at the start of a notification.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedListing {
    pub sale_id: i64,
    pub item_name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl TrackedListing {
    /// Timestamps are truncated to milliseconds so a reload reproduces them exactly.
    pub fn new(sale_id: i64, item_name: &str) -> Self {
        Self {
            sale_id,
            item_name: item_name.to_string(),
            created_at: Utc::now().trunc_subsecs(3),
        }
    }
}

pub fn default_item_name(sale_id: i64) -> String {
    format!("Listing #{}", sale_id)
}

/// A decoded "item listed" event from the marketplace sale feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleEvent {
    pub sale_id: i64,
    pub market_name: String,
    /// Minor currency units (cents).
    pub sale_price: i64,
    pub url: String,
}

impl SaleEvent {
    pub fn item_url(&self, market_host: &str) -> String {
        format!("https://{}/item/{}/{}", market_host, self.url, self.sale_id)
    }

    pub fn display_price(&self) -> String {
        format_minor_units(self.sale_price)
    }
}

pub fn format_minor_units(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}
