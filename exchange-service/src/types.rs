//! Wire types for the REST and WebSocket interfaces.

use orderbook::{OrderId, Side, Summary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::instrument::Instrument;

/// WebSocket message commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Open,
    Close,
    NewInstrument,
    Buy,
    Sell,
    Error,
    Summary,
}

/// Order fields carried by BUY and SELL.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub code: String,
    /// Queue to place into, defaults to the side's own market
    #[serde(default)]
    pub market: Option<String>,
    pub price: f64,
    pub amount: f64,
}

impl OrderRequest {
    pub fn market_or_default(&self, side: Side) -> &str {
        self.market.as_deref().unwrap_or(side.market())
    }
}

/// Envelope for everything on the WebSocket, both directions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub command: Command,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<Instrument>,
    /// Book summaries keyed by instrument code
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub summaries: BTreeMap<String, Summary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Message {
    fn bare(command: Command) -> Self {
        Self {
            command,
            order: None,
            instrument: None,
            summaries: BTreeMap::new(),
            error: None,
        }
    }

    pub fn summary(summaries: BTreeMap<String, Summary>) -> Self {
        Self {
            summaries,
            ..Self::bare(Command::Summary)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::bare(Command::Error)
        }
    }

    pub fn order(side: Side, order: OrderRequest) -> Self {
        let command = match side {
            Side::Bid => Command::Buy,
            Side::Ask => Command::Sell,
        };
        Self {
            order: Some(order),
            ..Self::bare(command)
        }
    }
}

/// REST body for buy/sell.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitOrderRequest {
    #[serde(default)]
    pub market: Option<String>,
    pub price: f64,
    pub amount: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitOrderResponse {
    pub order_id: OrderId,
    pub code: String,
    pub market: String,
    pub side: Side,
}

/// REST body for issuing an instrument.
#[derive(Debug, Serialize, Deserialize)]
pub struct IssueRequest {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub total_supply: f64,
    pub circulating_supply: f64,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub max_brokers: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IssueResponse {
    pub code: String,
    pub brokers: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InstrumentsResponse {
    pub instruments: Vec<Instrument>,
}
