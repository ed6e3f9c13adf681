use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for an [`Exchange`](crate::Exchange) and the brokers it hands books to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Bounded capacity of each book's deal channel
    pub deal_capacity: usize,
    /// Deals kept on each book's tape
    pub tape_len: usize,
    /// How often the collection loop drains deal channels
    pub collect_interval_ms: u64,
    /// Longest a broker sleeps without a submission before re-checking its book
    pub broker_backoff_ms: u64,
    /// Cadence for pushing summaries to subscribers
    pub broadcast_interval_secs: u64,
}

impl ExchangeConfig {
    pub fn collect_interval(&self) -> Duration {
        Duration::from_millis(self.collect_interval_ms.max(1))
    }

    pub fn broker_backoff(&self) -> Duration {
        Duration::from_millis(self.broker_backoff_ms.max(1))
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_secs(self.broadcast_interval_secs.max(1))
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            deal_capacity: orderbook::DEAL_SINK_CAPACITY,
            tape_len: orderbook::TAPE_LEN,
            collect_interval_ms: 10,
            broker_backoff_ms: 50,
            broadcast_interval_secs: 5,
        }
    }
}
