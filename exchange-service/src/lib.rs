//! Exchange service: brokers, the exchange orchestrator and the wire types the
//! transport speaks.

pub mod broker;
pub mod config;
pub mod error;
pub mod exchange;
pub mod instrument;
pub mod types;

pub use broker::{Binding, Broker, BrokerId};
pub use config::ExchangeConfig;
pub use error::{ExchangeError, ExchangeResult};
pub use exchange::Exchange;
pub use instrument::{Instrument, Reference};
pub use types::{Command, Message, OrderRequest};
