//! Exchange core: instrument registry, order books and the broker pool.
//!
//! # Architecture
//! - `DashMap` registries for instruments, books and brokers, safe to touch
//!   from request handlers while the collection loop runs
//! - Each book's queues are individually locked and shared with the brokers
//!   assigned to them
//! - A collection loop drains every book's deal channel onto its tape

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use orderbook::{Order, OrderBook, OrderId, OrderQueue, Side, Summary};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::broker::{Binding, Broker, BrokerId};
use crate::config::ExchangeConfig;
use crate::error::{ExchangeError, ExchangeResult};
use crate::instrument::Instrument;
use crate::types::Message;

/// Continuous double-auction exchange.
///
/// # Concurrency Model
/// - Submissions lock only the target queue, then wake the book's brokers
/// - Brokers cross ask/bid pairs on their own tasks
/// - `run` moves finished deals onto each book's tape until `stop`
pub struct Exchange {
    config: ExchangeConfig,
    pool: DashMap<BrokerId, Arc<Broker>>,
    instruments: DashMap<String, Instrument>,
    books: DashMap<String, Arc<OrderBook>>,
    shutdown: watch::Sender<bool>,
}

impl Exchange {
    pub fn new() -> Self {
        Self::with_config(ExchangeConfig::default())
    }

    pub fn with_config(config: ExchangeConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            pool: DashMap::new(),
            instruments: DashMap::new(),
            books: DashMap::new(),
            shutdown,
        }
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Creates a broker using the configured backoff and adds it to the pool.
    pub fn spawn_broker(&self) -> BrokerId {
        self.register(Broker::with_backoff(self.config.broker_backoff()))
    }

    pub fn register(&self, broker: Broker) -> BrokerId {
        let id = broker.id();
        self.pool.insert(id, Arc::new(broker));
        debug!(broker = %id, "broker registered");
        id
    }

    /// Removes a broker from the pool, stopping it first.
    pub fn deregister(&self, id: BrokerId) -> bool {
        match self.pool.remove(&id) {
            Some((_, broker)) => {
                broker.stop();
                debug!(broker = %id, "broker deregistered");
                true
            }
            None => false,
        }
    }

    pub fn broker(&self, id: BrokerId) -> Option<Arc<Broker>> {
        self.pool.get(&id).map(|b| b.value().clone())
    }

    pub fn brokers(&self) -> usize {
        self.pool.len()
    }

    pub fn idle_brokers(&self) -> usize {
        self.pool.iter().filter(|b| b.is_idle()).count()
    }

    /// Lists an instrument and hands its book to up to `max_brokers` idle
    /// brokers (all idle brokers when `None`).
    ///
    /// # Returns
    /// * `Ok(n)` - number of brokers now matching the new book
    /// * `Err(InstrumentExists)` - the code already has a book
    /// * `Err(NoBrokerAvailable)` - nothing idle; no book is created
    pub fn issue(&self, instrument: Instrument, max_brokers: Option<usize>) -> ExchangeResult<usize> {
        if !instrument.reference.is_well_formed() {
            return Err(ExchangeError::InvalidReference(
                instrument.reference.to_string(),
            ));
        }

        let code = instrument.code.clone();
        // Holding the vacant slot keeps a concurrent issue of the same code out.
        let slot = match self.books.entry(code.clone()) {
            Entry::Occupied(_) => return Err(ExchangeError::InstrumentExists(code)),
            Entry::Vacant(slot) => slot,
        };

        let book = Arc::new(OrderBook::with_capacity(
            self.config.deal_capacity,
            self.config.tape_len,
        ));
        for side in [Side::Ask, Side::Bid] {
            book.set_queue(side.market(), Arc::new(OrderQueue::new(side)));
        }
        let Some(binding) = Binding::for_book(&book) else {
            return Err(ExchangeError::NoBrokerAvailable(code));
        };

        let limit = max_brokers.unwrap_or(usize::MAX);
        let mut assigned = 0;
        for broker in self.pool.iter() {
            if assigned >= limit {
                break;
            }
            if broker.assign(binding.clone()) {
                assigned += 1;
            }
        }

        if assigned == 0 {
            warn!(code = %code, "no idle broker for new instrument");
            return Err(ExchangeError::NoBrokerAvailable(code));
        }

        // Both registries change while the book slot is held.
        self.instruments.insert(code.clone(), instrument);
        slot.insert(book);
        info!(code = %code, brokers = assigned, "instrument issued");
        Ok(assigned)
    }

    /// Tears an instrument down and returns its brokers to the idle pool.
    ///
    /// # Arguments
    /// * `code` - Instrument code
    ///
    /// # Returns
    /// * `Ok(instrument)` - the removed listing
    /// * `Err(UnknownInstrument)` - nothing is listed under `code`
    pub fn delist(&self, code: &str) -> ExchangeResult<Instrument> {
        let (book, instrument) = match self.books.entry(code.to_string()) {
            Entry::Vacant(_) => return Err(ExchangeError::UnknownInstrument(code.to_string())),
            Entry::Occupied(slot) => {
                let instrument = self.instruments.remove(code).map(|(_, i)| i);
                let (_, book) = slot.remove_entry();
                (book, instrument)
            }
        };

        let mut released = 0;
        if let Some(ask) = book.queue(Side::Ask.market()) {
            for broker in self.pool.iter() {
                if broker.is_watching(&ask) {
                    broker.stop();
                    released += 1;
                }
            }
        }

        let instrument = instrument.ok_or_else(|| ExchangeError::UnknownInstrument(code.to_string()))?;
        info!(code = %code, released, "instrument delisted");
        Ok(instrument)
    }

    pub fn instruments(&self) -> Vec<Instrument> {
        let mut all: Vec<Instrument> = self.instruments.iter().map(|i| i.value().clone()).collect();
        all.sort_by(|a, b| a.code.cmp(&b.code));
        all
    }

    pub fn book(&self, code: &str) -> Option<Arc<OrderBook>> {
        self.books.get(code).map(|b| b.value().clone())
    }

    /// Places a bid on `market` of instrument `code`.
    ///
    /// # Arguments
    /// * `code` - Instrument code
    /// * `market` - Bid-side market of the book (usually `BID`)
    /// * `price` - Limit price, must be finite
    /// * `amount` - Size, must be finite and positive
    ///
    /// # Returns
    /// The id of the resting order; matching happens on the brokers.
    pub fn buy(&self, code: &str, market: &str, price: f64, amount: f64) -> ExchangeResult<OrderId> {
        self.place(Side::Bid, code, market, price, amount)
    }

    /// Places an ask on `market` of instrument `code`.
    ///
    /// # Arguments
    /// * `code` - Instrument code
    /// * `market` - Ask-side market of the book (usually `ASK`)
    /// * `price` - Limit price, must be finite
    /// * `amount` - Size, must be finite and positive
    ///
    /// # Returns
    /// The id of the resting order; matching happens on the brokers.
    pub fn sell(&self, code: &str, market: &str, price: f64, amount: f64) -> ExchangeResult<OrderId> {
        self.place(Side::Ask, code, market, price, amount)
    }

    fn place(
        &self,
        side: Side,
        code: &str,
        market: &str,
        price: f64,
        amount: f64,
    ) -> ExchangeResult<OrderId> {
        check_order(price, amount)?;
        let (book, queue) = self.market(code, market)?;
        if queue.side() != side {
            return Err(ExchangeError::SideMismatch {
                market: market.to_string(),
                side,
            });
        }

        let order = Order::new(side, code, market, price, amount);
        let id = order.id;
        queue.add(order);
        book.notify();
        debug!(code, market, %side, price, amount, order = %id, "order placed");
        Ok(id)
    }

    /// Re-prices or re-sizes a resting order in place.
    ///
    /// # Arguments
    /// * `code` - Instrument code
    /// * `market` - Market the order rests on
    /// * `id` - Order to change; it keeps its id
    /// * `price` - New limit price, must be finite
    /// * `amount` - New size, must be finite and positive
    ///
    /// # Returns
    /// * `Ok(())` - the order moved to its new place in the queue
    /// * `Err(InvalidOrder)` - rejected before touching the queue
    /// * `Err(OrderNotFound)` - the order already traded or never rested here
    pub fn amend(
        &self,
        code: &str,
        market: &str,
        id: OrderId,
        price: f64,
        amount: f64,
    ) -> ExchangeResult<()> {
        check_order(price, amount)?;
        let (book, queue) = self.market(code, market)?;
        queue.modify(id, |o| {
            o.price = price;
            o.amount = amount;
        })?;
        book.notify();
        Ok(())
    }

    fn market(&self, code: &str, market: &str) -> ExchangeResult<(Arc<OrderBook>, Arc<OrderQueue>)> {
        let book = self
            .book(code)
            .ok_or_else(|| ExchangeError::UnknownInstrument(code.to_string()))?;
        let queue = book.queue(market).ok_or_else(|| ExchangeError::UnknownMarket {
            code: code.to_string(),
            market: market.to_string(),
        })?;
        Ok((book, queue))
    }

    /// Summary of every book, keyed by instrument code.
    pub fn summaries(&self) -> BTreeMap<String, Summary> {
        self.books
            .iter()
            .map(|b| (b.key().clone(), b.value().summary()))
            .collect()
    }

    /// SUMMARY message for subscribers.
    pub fn broadcast(&self) -> Message {
        Message::summary(self.summaries())
    }

    /// Drains every pending deal onto its book's tape. Returns how many moved.
    pub fn collect(&self) -> usize {
        let mut moved = 0;
        for book in self.books.iter() {
            while let Some(deal) = book.update() {
                debug!(
                    code = %book.key(),
                    price = deal.price,
                    amount = deal.amount,
                    total = deal.total,
                    timestamp = deal.timestamp,
                    "deal"
                );
                moved += 1;
            }
        }
        moved
    }

    /// Collection loop. Runs until [`Exchange::stop`]; returns at once if the
    /// exchange was already stopped.
    pub async fn run(&self) {
        let mut shutdown = self.shutdown.subscribe();
        let mut ticker = interval(self.config.collect_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("exchange collection loop started");

        while !*shutdown.borrow() {
            tokio::select! {
                _ = shutdown.changed() => {}
                _ = ticker.tick() => {
                    self.collect();
                }
            }
        }

        self.collect();
        info!("exchange collection loop stopped");
    }

    /// Ends the collection loop and stops every broker.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
        for broker in self.pool.iter() {
            broker.stop();
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Prices must be finite and sizes finite and positive.
fn check_order(price: f64, amount: f64) -> ExchangeResult<()> {
    if price.is_finite() && amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(ExchangeError::InvalidOrder { price, amount })
    }
}

impl Default for Exchange {
    fn default() -> Self {
        Self::new()
    }
}
