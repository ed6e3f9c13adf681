use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Default market name for the sell side of a book.
pub const ASK: &str = "ASK";
/// Default market name for the buy side of a book.
pub const BID: &str = "BID";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    /// Orders two prices by priority on this side: `Less` means `a` is served first.
    /// - Asks: lowest price first
    /// - Bids: highest price first
    /// - NaN prices: last on both sides
    pub fn rank(self, a: f64, b: f64) -> Ordering {
        match (a.is_nan(), b.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => match self {
                Side::Ask => a.total_cmp(&b),
                Side::Bid => b.total_cmp(&a),
            },
        }
    }

    /// Market name a freshly issued book registers this side under.
    pub fn market(self) -> &'static str {
        match self {
            Side::Ask => ASK,
            Side::Bid => BID,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.market())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A resting limit order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub side: Side,
    /// Instrument code
    pub code: String,
    pub market: String,
    pub price: f64,
    /// Remaining quantity, reduced on partial fills
    pub amount: f64,
    /// Notional at submission (price * original amount)
    pub total: f64,
    /// Unix millis
    pub timestamp: u64,
}

impl Order {
    pub fn new(
        side: Side,
        code: impl Into<String>,
        market: impl Into<String>,
        price: f64,
        amount: f64,
    ) -> Self {
        Self {
            id: OrderId::new(),
            side,
            code: code.into(),
            market: market.into(),
            price,
            amount,
            total: price * amount,
            timestamp: now_millis(),
        }
    }
}

/// An executed trade. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub price: f64,
    pub amount: f64,
    pub total: f64,
    pub timestamp: u64,
}

impl Deal {
    pub fn new(price: f64, amount: f64) -> Self {
        Self {
            price,
            amount,
            total: price * amount,
            timestamp: now_millis(),
        }
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
