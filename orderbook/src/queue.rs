use crate::types::{Order, OrderId, Side};
use parking_lot::{Mutex, MutexGuard};
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),
}

struct Entry {
    /// Arrival stamp, breaks price ties first-come first-served
    seq: u64,
    order: Order,
}

// Binary heap over a Vec plus an id -> slot index.
// The side decides which end is best:
// - Asks: lowest price at slot 0
// - Bids: highest price at slot 0
pub(crate) struct Heap {
    side: Side,
    entries: Vec<Entry>,
    positions: HashMap<OrderId, usize>,
    next_seq: u64,
}

impl Heap {
    fn new(side: Side) -> Self {
        Self {
            side,
            entries: Vec::new(),
            positions: HashMap::new(),
            next_seq: 0,
        }
    }

    fn ranks_before(&self, i: usize, j: usize) -> bool {
        let (a, b) = (&self.entries[i], &self.entries[j]);
        self.side
            .rank(a.order.price, b.order.price)
            .then(a.seq.cmp(&b.seq))
            == Ordering::Less
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.entries.swap(i, j);
        self.positions.insert(self.entries[i].order.id, i);
        self.positions.insert(self.entries[j].order.id, j);
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if !self.ranks_before(i, parent) {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
    }

    /// Returns true if the entry moved.
    fn sift_down(&mut self, mut i: usize) -> bool {
        let start = i;
        let n = self.entries.len();
        loop {
            let left = 2 * i + 1;
            if left >= n {
                break;
            }
            let right = left + 1;
            let best = if right < n && self.ranks_before(right, left) {
                right
            } else {
                left
            };
            if !self.ranks_before(best, i) {
                break;
            }
            self.swap(i, best);
            i = best;
        }
        i > start
    }

    fn fix(&mut self, i: usize) {
        if !self.sift_down(i) {
            self.sift_up(i);
        }
    }

    pub(crate) fn push(&mut self, order: Order) -> bool {
        if self.positions.contains_key(&order.id) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;

        let slot = self.entries.len();
        self.positions.insert(order.id, slot);
        self.entries.push(Entry { seq, order });
        self.sift_up(slot);
        true
    }

    pub(crate) fn top(&self) -> Option<&Order> {
        self.entries.first().map(|e| &e.order)
    }

    pub(crate) fn pop_top(&mut self) -> Option<Order> {
        let last = self.entries.len().checked_sub(1)?;
        self.swap(0, last);
        let entry = self.entries.pop()?;
        self.positions.remove(&entry.order.id);
        if !self.entries.is_empty() {
            self.sift_down(0);
        }
        Some(entry.order)
    }

    /// Takes `amount` off the best order.
    /// Amount is not part of the sort key, so heap order still holds afterwards.
    pub(crate) fn fill_top(&mut self, amount: f64) {
        if let Some(entry) = self.entries.first_mut() {
            entry.order.amount -= amount;
        }
    }

    fn modify(&mut self, id: OrderId, f: impl FnOnce(&mut Order)) -> Result<(), QueueError> {
        let slot = *self
            .positions
            .get(&id)
            .ok_or(QueueError::OrderNotFound(id))?;

        let order = &mut self.entries[slot].order;
        let old_price = order.price;
        f(order);
        // identity is pinned to the slot index
        order.id = id;

        // only a price change can move the order
        if order.price.total_cmp(&old_price) != Ordering::Equal {
            self.fix(slot);
        }
        Ok(())
    }

    #[cfg(test)]
    fn is_valid(&self) -> bool {
        let ordered = (1..self.entries.len()).all(|i| !self.ranks_before(i, (i - 1) / 2));
        let indexed = self.positions.len() == self.entries.len()
            && self
                .entries
                .iter()
                .enumerate()
                .all(|(i, e)| self.positions.get(&e.order.id) == Some(&i));
        ordered && indexed
    }
}

/// Price-ordered queue for one side of one instrument.
///
/// Every operation takes the same lock, so brokers and submitters can share a
/// queue through an `Arc`. Orders at the same price leave in arrival order.
pub struct OrderQueue {
    side: Side,
    heap: Mutex<Heap>,
}

impl OrderQueue {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            heap: Mutex::new(Heap::new(side)),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Inserts an order. Returns false (and changes nothing) if its id is already queued.
    pub fn add(&self, order: Order) -> bool {
        self.heap.lock().push(order)
    }

    /// Copy of the order at heap slot `i`. Slot 0 is always the best price.
    pub fn peek(&self, i: usize) -> Option<Order> {
        self.heap.lock().entries.get(i).map(|e| e.order.clone())
    }

    /// Removes and returns the best order.
    pub fn next(&self) -> Option<Order> {
        self.heap.lock().pop_top()
    }

    /// Overwrites a queued order in place and restores heap order.
    /// The queued id is kept even if `order` carries a different one.
    pub fn update(&self, id: OrderId, order: Order) -> Result<(), QueueError> {
        self.modify(id, |o| *o = order)
    }

    /// Edits a queued order under the queue lock.
    pub fn modify(&self, id: OrderId, f: impl FnOnce(&mut Order)) -> Result<(), QueueError> {
        self.heap.lock().modify(id, f)
    }

    pub fn get(&self, id: OrderId) -> Option<Order> {
        let heap = self.heap.lock();
        let slot = *heap.positions.get(&id)?;
        Some(heap.entries[slot].order.clone())
    }

    pub fn contains(&self, id: OrderId) -> bool {
        self.heap.lock().positions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.heap.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All resting orders, best first.
    pub fn snapshot(&self) -> Vec<Order> {
        let heap = self.heap.lock();
        let mut entries: Vec<(u64, &Order)> =
            heap.entries.iter().map(|e| (e.seq, &e.order)).collect();
        entries.sort_by(|(sa, a), (sb, b)| self.side.rank(a.price, b.price).then(sa.cmp(sb)));
        entries.into_iter().map(|(_, o)| o.clone()).collect()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Heap> {
        self.heap.lock()
    }
}
