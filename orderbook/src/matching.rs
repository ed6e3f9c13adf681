//! One crossing step between an ask queue and a bid queue.

use crate::queue::OrderQueue;
use crate::types::Deal;

/// Matches the best ask against the best bid once.
///
/// Both queues stay locked (ask first, then bid) from the peek until the fill is
/// applied, so several brokers may call this on the same pair concurrently.
///
/// Returns `None` when either side is empty or the best ask is not strictly
/// below the best bid. Otherwise the smaller order leaves its queue, the larger
/// one rests with its amount reduced, and the trade prints at the ask price.
/// Orders already at zero are dropped from the top without a deal.
pub fn cross(ask: &OrderQueue, bid: &OrderQueue) -> Option<Deal> {
    if std::ptr::eq(ask, bid) {
        return None;
    }
    debug_assert!(ask.side() != bid.side());

    let mut asks = ask.lock();
    let mut bids = bid.lock();

    loop {
        let a = asks.top()?;
        let b = bids.top()?;

        if !(a.amount > 0.0) {
            asks.pop_top();
            continue;
        }
        if !(b.amount > 0.0) {
            bids.pop_top();
            continue;
        }
        if !(a.price < b.price) {
            return None;
        }

        let price = a.price;
        let (ask_amount, bid_amount) = (a.amount, b.amount);

        let amount = if ask_amount == bid_amount {
            asks.pop_top();
            bids.pop_top();
            ask_amount
        } else if ask_amount < bid_amount {
            asks.pop_top();
            bids.fill_top(ask_amount);
            ask_amount
        } else {
            bids.pop_top();
            asks.fill_top(bid_amount);
            bid_amount
        };

        return Some(Deal::new(price, amount));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Order, Side, ASK, BID};

    fn queues() -> (OrderQueue, OrderQueue) {
        (OrderQueue::new(Side::Ask), OrderQueue::new(Side::Bid))
    }

    fn sell(q: &OrderQueue, price: f64, amount: f64) {
        q.add(Order::new(Side::Ask, "STK", ASK, price, amount));
    }

    fn buy(q: &OrderQueue, price: f64, amount: f64) {
        q.add(Order::new(Side::Bid, "STK", BID, price, amount));
    }

    #[test]
    fn partial_fill_leaves_bid_resting() {
        let (asks, bids) = queues();
        sell(&asks, 10.0, 5.0);
        buy(&bids, 12.0, 8.0);

        let deal = cross(&asks, &bids).expect("orders cross");
        assert_eq!(deal.price, 10.0);
        assert_eq!(deal.amount, 5.0);
        assert_eq!(deal.total, 50.0);

        assert!(asks.is_empty());
        let rest = bids.peek(0).unwrap();
        assert_eq!(rest.price, 12.0);
        assert_eq!(rest.amount, 3.0);

        assert!(cross(&asks, &bids).is_none());
    }

    #[test]
    fn partial_fill_leaves_ask_resting() {
        let (asks, bids) = queues();
        sell(&asks, 10.0, 8.0);
        buy(&bids, 12.0, 5.0);

        let deal = cross(&asks, &bids).unwrap();
        assert_eq!(deal.price, 10.0);
        assert_eq!(deal.amount, 5.0);

        assert!(bids.is_empty());
        assert_eq!(asks.peek(0).unwrap().amount, 3.0);
    }

    #[test]
    fn full_fill_empties_both_sides() {
        let (asks, bids) = queues();
        sell(&asks, 10.0, 5.0);
        buy(&bids, 12.0, 5.0);

        let deal = cross(&asks, &bids).unwrap();
        assert_eq!((deal.price, deal.amount), (10.0, 5.0));
        assert!(asks.is_empty());
        assert!(bids.is_empty());
    }

    #[test]
    fn no_cross_no_trade() {
        let (asks, bids) = queues();
        sell(&asks, 12.0, 5.0);
        buy(&bids, 10.0, 5.0);

        assert!(cross(&asks, &bids).is_none());
        assert_eq!(asks.len(), 1);
        assert_eq!(bids.len(), 1);
    }

    #[test]
    fn equal_prices_do_not_cross() {
        let (asks, bids) = queues();
        sell(&asks, 10.0, 5.0);
        buy(&bids, 10.0, 5.0);
        assert!(cross(&asks, &bids).is_none());
    }

    #[test]
    fn one_empty_side_never_trades() {
        let (asks, bids) = queues();
        buy(&bids, 10.0, 5.0);
        assert!(cross(&asks, &bids).is_none());
        assert_eq!(bids.len(), 1);
    }

    #[test]
    fn zero_amount_orders_are_dropped_silently() {
        let (asks, bids) = queues();
        sell(&asks, 9.0, 0.0);
        sell(&asks, 10.0, 2.0);
        buy(&bids, 12.0, 2.0);

        let deal = cross(&asks, &bids).unwrap();
        assert_eq!(deal.price, 10.0);
        assert!(asks.is_empty());
    }

    #[test]
    fn amounts_are_conserved_across_a_sweep() {
        let (asks, bids) = queues();
        for (px, amt) in [(10.0, 3.0), (11.0, 4.0), (11.5, 6.0)] {
            sell(&asks, px, amt);
        }
        for (px, amt) in [(12.0, 5.0), (11.2, 7.0)] {
            buy(&bids, px, amt);
        }
        let ask_before: f64 = asks.snapshot().iter().map(|o| o.amount).sum();
        let bid_before: f64 = bids.snapshot().iter().map(|o| o.amount).sum();

        let deals: Vec<Deal> = std::iter::from_fn(|| cross(&asks, &bids)).collect();
        let traded: f64 = deals.iter().map(|d| d.amount).sum();
        let ask_after: f64 = asks.snapshot().iter().map(|o| o.amount).sum();
        let bid_after: f64 = bids.snapshot().iter().map(|o| o.amount).sum();

        assert_eq!(ask_before, ask_after + traded);
        assert_eq!(bid_before, bid_after + traded);
        for d in &deals {
            assert_eq!(d.total, d.price * d.amount);
        }
        // best ask left (11.5) is above best bid left (11.2)
        assert!(cross(&asks, &bids).is_none());
    }
}
