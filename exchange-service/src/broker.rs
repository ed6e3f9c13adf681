//! Matching workers.
//!
//! A broker is bound to one ask/bid queue pair at a time and runs a tokio task
//! that crosses the pair until it is stopped. Instead of spinning, the task
//! sleeps until the book signals a submission or the backoff elapses.

use orderbook::{cross, Deal, OrderBook, OrderQueue, Side, ASK, BID};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BrokerId(pub Uuid);

impl fmt::Display for BrokerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Everything a broker needs to work one book.
///
/// Only built by [`Binding::for_book`], so the ask queue is always the ask
/// side and every broker locks a pair in the same order.
#[derive(Clone)]
pub struct Binding {
    ask: Arc<OrderQueue>,
    bid: Arc<OrderQueue>,
    deals: mpsc::Sender<Deal>,
    activity: watch::Receiver<u64>,
}

impl Binding {
    /// Binds to the default ASK/BID queues of a book.
    ///
    /// # Returns
    /// `None` if either queue is missing or registered with the wrong side.
    pub fn for_book(book: &OrderBook) -> Option<Self> {
        let ask = book.queue(ASK)?;
        let bid = book.queue(BID)?;
        if ask.side() != Side::Ask || bid.side() != Side::Bid {
            return None;
        }
        Some(Self {
            ask,
            bid,
            deals: book.deal_sink(),
            activity: book.activity(),
        })
    }
}

enum State {
    Idle,
    Running { shutdown: watch::Sender<bool> },
}

struct Inner {
    binding: Option<Binding>,
    state: State,
}

pub struct Broker {
    id: BrokerId,
    backoff: Duration,
    inner: Mutex<Inner>,
}

impl Broker {
    pub fn new() -> Self {
        Self::with_backoff(Duration::from_millis(50))
    }

    pub fn with_backoff(backoff: Duration) -> Self {
        Self {
            id: BrokerId(Uuid::new_v4()),
            backoff,
            inner: Mutex::new(Inner {
                binding: None,
                state: State::Idle,
            }),
        }
    }

    pub fn id(&self) -> BrokerId {
        self.id
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.inner.lock().state, State::Idle)
    }

    /// Sets the queues to work. Ignored while running.
    pub fn watch(&self, binding: Binding) -> bool {
        let mut inner = self.inner.lock();
        if !matches!(inner.state, State::Idle) {
            return false;
        }
        inner.binding = Some(binding);
        true
    }

    /// Spawns the matching loop on the current tokio runtime.
    ///
    /// No-op (returns false) if already running, if nothing is bound, or when
    /// called outside a runtime.
    pub fn start(&self) -> bool {
        let mut inner = self.inner.lock();
        self.start_locked(&mut inner)
    }

    /// Binds and starts in one step, only if the broker is idle.
    ///
    /// # Arguments
    /// * `binding` - Queue pair and deal sink of the book to work
    ///
    /// # Returns
    /// * `true` - the matching loop is running on `binding`
    /// * `false` - already busy or no runtime; the broker is left unchanged
    pub fn assign(&self, binding: Binding) -> bool {
        let mut inner = self.inner.lock();
        if !matches!(inner.state, State::Idle) {
            return false;
        }
        inner.binding = Some(binding);
        if self.start_locked(&mut inner) {
            true
        } else {
            inner.binding = None;
            false
        }
    }

    fn start_locked(&self, inner: &mut Inner) -> bool {
        if !matches!(inner.state, State::Idle) {
            return false;
        }
        let Some(binding) = inner.binding.clone() else {
            return false;
        };
        let Ok(runtime) = Handle::try_current() else {
            warn!(broker = %self.id, "start called outside a tokio runtime");
            return false;
        };

        let (shutdown, stopped) = watch::channel(false);
        runtime.spawn(run(self.id, binding, stopped, self.backoff));
        inner.state = State::Running { shutdown };
        info!(broker = %self.id, "broker started");
        true
    }

    /// Signals the loop to exit and clears the binding. The broker is idle and
    /// reassignable as soon as this returns.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.binding = None;
        if let State::Running { shutdown } = std::mem::replace(&mut inner.state, State::Idle) {
            shutdown.send_replace(true);
            info!(broker = %self.id, "broker stopped");
        }
    }

    /// Whether this broker is currently bound to `ask`.
    pub fn is_watching(&self, ask: &Arc<OrderQueue>) -> bool {
        self.inner
            .lock()
            .binding
            .as_ref()
            .is_some_and(|b| Arc::ptr_eq(&b.ask, ask))
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Matching loop. Exits when stopped, when the broker is dropped, or when the
/// book behind the binding goes away.
async fn run(id: BrokerId, binding: Binding, mut shutdown: watch::Receiver<bool>, backoff: Duration) {
    let Binding {
        ask,
        bid,
        deals,
        mut activity,
    } = binding;

    'work: loop {
        if *shutdown.borrow() {
            break;
        }

        // Reserve sink space before crossing so a stop never strands a deal.
        loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown.changed() => break 'work,
                permit = deals.reserve() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break 'work,
                },
            };
            match cross(&ask, &bid) {
                Some(deal) => {
                    debug!(broker = %id, price = deal.price, amount = deal.amount, "matched");
                    permit.send(deal);
                }
                None => break,
            }
        }

        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            changed = activity.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(backoff) => {}
        }
    }

    debug!(broker = %id, "matching loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use orderbook::Order;
    use std::time::Duration;

    fn listed_book() -> OrderBook {
        let book = OrderBook::new();
        book.set_queue(ASK, Arc::new(OrderQueue::new(Side::Ask)));
        book.set_queue(BID, Arc::new(OrderQueue::new(Side::Bid)));
        book
    }

    async fn drain_until(book: &OrderBook, want: usize) -> Vec<Deal> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while book.history().len() < want && tokio::time::Instant::now() < deadline {
            while book.update().is_some() {}
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        book.history()
    }

    #[test]
    fn binding_refuses_swapped_sides() {
        let book = OrderBook::new();
        book.set_queue(ASK, Arc::new(OrderQueue::new(Side::Bid)));
        book.set_queue(BID, Arc::new(OrderQueue::new(Side::Ask)));
        assert!(Binding::for_book(&book).is_none());

        let half = OrderBook::new();
        half.set_queue(ASK, Arc::new(OrderQueue::new(Side::Ask)));
        assert!(Binding::for_book(&half).is_none());

        let binding = Binding::for_book(&listed_book()).unwrap();
        assert_eq!(binding.ask.side(), Side::Ask);
        assert_eq!(binding.bid.side(), Side::Bid);
    }

    #[tokio::test]
    async fn start_requires_binding() {
        let broker = Broker::new();
        assert!(!broker.start());
        assert!(broker.is_idle());
    }

    #[test]
    fn start_outside_runtime_is_refused() {
        let book = listed_book();
        let broker = Broker::new();
        assert!(broker.watch(Binding::for_book(&book).unwrap()));
        assert!(!broker.start());
        assert!(broker.is_idle());
    }

    #[tokio::test]
    async fn second_start_is_a_no_op() {
        let book = listed_book();
        let broker = Broker::new();
        broker.watch(Binding::for_book(&book).unwrap());

        assert!(broker.start());
        assert!(!broker.start());
        assert!(!broker.is_idle());

        // rebinding while running is refused too
        assert!(!broker.watch(Binding::for_book(&listed_book()).unwrap()));
        broker.stop();
    }

    #[tokio::test]
    async fn stop_clears_binding_and_allows_reassign() {
        let first = listed_book();
        let broker = Broker::new();
        assert!(broker.assign(Binding::for_book(&first).unwrap()));
        assert!(broker.is_watching(&first.queue(ASK).unwrap()));

        broker.stop();
        assert!(broker.is_idle());
        assert!(!broker.is_watching(&first.queue(ASK).unwrap()));
        assert!(!broker.start(), "binding must be cleared by stop");

        let second = listed_book();
        assert!(broker.assign(Binding::for_book(&second).unwrap()));
        second
            .queue(ASK)
            .unwrap()
            .add(Order::new(Side::Ask, "STK", ASK, 10.0, 5.0));
        second
            .queue(BID)
            .unwrap()
            .add(Order::new(Side::Bid, "STK", BID, 12.0, 5.0));
        second.notify();

        let deals = drain_until(&second, 1).await;
        assert_eq!(deals.len(), 1);
        broker.stop();
    }

    #[tokio::test]
    async fn running_broker_matches_submissions() {
        let book = listed_book();
        let broker = Broker::with_backoff(Duration::from_millis(5));
        broker.assign(Binding::for_book(&book).unwrap());

        book.queue(ASK)
            .unwrap()
            .add(Order::new(Side::Ask, "STK", ASK, 10.0, 5.0));
        book.queue(BID)
            .unwrap()
            .add(Order::new(Side::Bid, "STK", BID, 12.0, 8.0));
        book.notify();

        let deals = drain_until(&book, 1).await;
        assert_eq!(deals.len(), 1);
        assert_eq!((deals[0].price, deals[0].amount), (10.0, 5.0));

        let rest = book.queue(BID).unwrap().peek(0).unwrap();
        assert_eq!(rest.amount, 3.0);
        assert!(book.queue(ASK).unwrap().is_empty());
        broker.stop();
    }

    #[tokio::test]
    async fn stopped_broker_stops_matching() {
        let book = listed_book();
        let broker = Broker::with_backoff(Duration::from_millis(5));
        broker.assign(Binding::for_book(&book).unwrap());
        broker.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;

        book.queue(ASK)
            .unwrap()
            .add(Order::new(Side::Ask, "STK", ASK, 10.0, 5.0));
        book.queue(BID)
            .unwrap()
            .add(Order::new(Side::Bid, "STK", BID, 12.0, 5.0));
        book.notify();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(book.update().is_none());
        assert_eq!(book.queue(ASK).unwrap().len(), 1);
    }
}
