//! Wire frames exchanged with the marketplace sale feed.
//!
//! Every frame is `{"event": <name>, "data": <payload>}`. The client sends a
//! single `saleFeedJoin` after connecting and then receives `saleFeed`
//! batches; only batches with `eventType == "listed"` carry new listings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::SaleEvent;

pub const SALE_FEED_JOIN: &str = "saleFeedJoin";
pub const SALE_FEED: &str = "saleFeed";
pub const LISTED: &str = "listed";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedFrame {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedJoin {
    pub currency: String,
    pub locale: String,
    pub appid: u32,
}

impl Default for FeedJoin {
    fn default() -> Self {
        Self {
            currency: "EUR".to_string(),
            locale: "en".to_string(),
            appid: 730,
        }
    }
}

/// Sales are kept as raw values and decoded one at a time, so a single
/// malformed entry is dropped without taking its siblings with it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleFeedBatch {
    pub event_type: String,
    #[serde(default)]
    pub sales: Vec<serde_json::Value>,
}

impl SaleFeedBatch {
    pub fn is_listed(&self) -> bool {
        self.event_type == LISTED
    }

    pub fn into_sales(self) -> impl Iterator<Item = Result<SaleEvent, SaleDecodeError>> {
        self.sales.into_iter().map(|value| {
            serde_json::from_value::<RawSale>(value)?
                .into_event()
                .ok_or(SaleDecodeError::MissingSaleId)
        })
    }
}

#[derive(Debug, Error)]
pub enum SaleDecodeError {
    #[error("sale has no saleId")]
    MissingSaleId,
    #[error("malformed sale: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A sale as it appears on the wire. Anything beyond `saleId` may be absent
/// or null.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSale {
    pub sale_id: Option<i64>,
    #[serde(default)]
    pub market_name: Option<String>,
    #[serde(default)]
    pub sale_price: Option<i64>,
    #[serde(default)]
    pub url: Option<String>,
}

impl RawSale {
    /// `None` when the sale carries no `saleId`.
    pub fn into_event(self) -> Option<SaleEvent> {
        Some(SaleEvent {
            sale_id: self.sale_id?,
            market_name: self.market_name.unwrap_or_default(),
            sale_price: self.sale_price.unwrap_or_default(),
            url: self.url.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone)]
pub enum FeedEvent {
    Sales(SaleFeedBatch),
    Other(String),
}

impl FeedFrame {
    pub fn join(join: &FeedJoin) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event: SALE_FEED_JOIN.to_string(),
            data: serde_json::to_value(join)?,
        })
    }

    pub fn into_event(self) -> Result<FeedEvent, serde_json::Error> {
        if self.event == SALE_FEED {
            Ok(FeedEvent::Sales(serde_json::from_value(self.data)?))
        } else {
            Ok(FeedEvent::Other(self.event))
        }
    }
}
