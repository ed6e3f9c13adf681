use crate::queue::OrderQueue;
use crate::types::{Deal, Order};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Deals kept on the tape per book.
pub const TAPE_LEN: usize = 100;
/// Deals a broker can hand over before it waits for the tape to catch up.
pub const DEAL_SINK_CAPACITY: usize = 1024;

/// Point-in-time view of one book.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Resting orders per market, best first
    pub queues: BTreeMap<String, Vec<Order>>,
    /// Most recent deals, oldest first
    pub history: Vec<Deal>,
}

/// Order book for one instrument.
///
/// Queues are registered by market name so a book is not tied to exactly one
/// ask and one bid queue. Brokers push deals into the sink returned by
/// [`OrderBook::deal_sink`]; [`OrderBook::update`] moves them onto the tape.
pub struct OrderBook {
    queues: RwLock<HashMap<String, Arc<OrderQueue>>>,
    deals_tx: mpsc::Sender<Deal>,
    deals_rx: Mutex<mpsc::Receiver<Deal>>,
    history: Mutex<VecDeque<Deal>>,
    tape_len: usize,
    /// Bumped on every submission, brokers wait on it
    activity: watch::Sender<u64>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::with_capacity(DEAL_SINK_CAPACITY, TAPE_LEN)
    }

    pub fn with_capacity(sink_capacity: usize, tape_len: usize) -> Self {
        let (deals_tx, deals_rx) = mpsc::channel(sink_capacity.max(1));
        let (activity, _) = watch::channel(0);
        Self {
            queues: RwLock::new(HashMap::new()),
            deals_tx,
            deals_rx: Mutex::new(deals_rx),
            history: Mutex::new(VecDeque::with_capacity(tape_len)),
            tape_len,
            activity,
        }
    }

    pub fn set_queue(&self, market: impl Into<String>, queue: Arc<OrderQueue>) {
        self.queues.write().insert(market.into(), queue);
    }

    pub fn queue(&self, market: &str) -> Option<Arc<OrderQueue>> {
        self.queues.read().get(market).cloned()
    }

    pub fn markets(&self) -> Vec<String> {
        self.queues.read().keys().cloned().collect()
    }

    pub fn deal_sink(&self) -> mpsc::Sender<Deal> {
        self.deals_tx.clone()
    }

    pub fn activity(&self) -> watch::Receiver<u64> {
        self.activity.subscribe()
    }

    /// Wakes every broker watching this book.
    pub fn notify(&self) {
        self.activity.send_modify(|n| *n = n.wrapping_add(1));
    }

    /// Moves at most one pending deal onto the tape without waiting.
    pub fn update(&self) -> Option<Deal> {
        let deal = self.deals_rx.lock().try_recv().ok()?;

        let mut history = self.history.lock();
        history.push_back(deal.clone());
        while history.len() > self.tape_len {
            history.pop_front();
        }
        Some(deal)
    }

    pub fn history(&self) -> Vec<Deal> {
        self.history.lock().iter().cloned().collect()
    }

    /// Snapshot for broadcast. Each queue is copied under its own lock,
    /// matching keeps running in between.
    pub fn summary(&self) -> Summary {
        let queues = self
            .queues
            .read()
            .iter()
            .map(|(market, q)| (market.clone(), q.snapshot()))
            .collect();
        Summary {
            queues,
            history: self.history(),
        }
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}
