use orderbook::{QueueError, Side};
use thiserror::Error;

/// Rejections returned by exchange operations. None of them are fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("unknown market {market} on {code}")]
    UnknownMarket { code: String, market: String },

    #[error("market {market} does not take {side} orders")]
    SideMismatch { market: String, side: Side },

    #[error("invalid order: price {price}, amount {amount}")]
    InvalidOrder { price: f64, amount: f64 },

    #[error(transparent)]
    OrderNotFound(#[from] QueueError),

    #[error("no broker available for {0}, retry later")]
    NoBrokerAvailable(String),

    #[error("instrument already issued: {0}")]
    InstrumentExists(String),

    #[error("malformed reference path: {0}")]
    InvalidReference(String),
}

pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;
