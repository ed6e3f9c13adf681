//! Order queues, crossing and order books for a continuous double auction.
//!
//! Core features:
//! - Heap-ordered queues per side (best price first, then arrival order)
//! - Atomic best-ask/best-bid crossing with partial fills
//! - Trade tape fed by a bounded deal channel
//! - Safe to share between many matching workers behind `Arc`

pub mod types;

pub use types::{now_millis, Deal, Order, OrderId, Side, ASK, BID};
pub mod queue;
pub use queue::{OrderQueue, QueueError};
pub mod matching;
pub use matching::cross;
pub mod book;
pub use book::{OrderBook, Summary, DEAL_SINK_CAPACITY, TAPE_LEN};

#[cfg(test)]
mod ob_tests {
    use super::*;
    use std::sync::Arc;

    fn listed_book() -> (OrderBook, Arc<OrderQueue>, Arc<OrderQueue>) {
        let book = OrderBook::new();
        let asks = Arc::new(OrderQueue::new(Side::Ask));
        let bids = Arc::new(OrderQueue::new(Side::Bid));
        book.set_queue(ASK, asks.clone());
        book.set_queue(BID, bids.clone());
        (book, asks, bids)
    }

    /// Deals produced by crossing land on the tape through the sink.
    #[tokio::test]
    async fn crossing_feeds_the_tape() {
        let (book, asks, bids) = listed_book();
        let sink = book.deal_sink();

        asks.add(Order::new(Side::Ask, "STK", ASK, 10.0, 5.0));
        asks.add(Order::new(Side::Ask, "STK", ASK, 11.0, 5.0));
        bids.add(Order::new(Side::Bid, "STK", BID, 12.0, 8.0));

        while let Some(deal) = cross(&asks, &bids) {
            sink.send(deal).await.unwrap();
        }
        while book.update().is_some() {}

        let summary = book.summary();
        let tape: Vec<(f64, f64)> = summary.history.iter().map(|d| (d.price, d.amount)).collect();
        assert_eq!(tape, vec![(10.0, 5.0), (11.0, 3.0)]);
        assert_eq!(summary.queues[ASK].len(), 1);
        assert_eq!(summary.queues[ASK][0].amount, 2.0);
        assert!(summary.queues[BID].is_empty());
    }

    /// Brokers racing on one queue pair never trade the same quantity twice.
    #[test]
    fn concurrent_crossing_conserves_amounts() {
        let (_book, asks, bids) = listed_book();
        for i in 0..500 {
            asks.add(Order::new(Side::Ask, "STK", ASK, 10.0 + (i % 7) as f64, 3.0));
            bids.add(Order::new(Side::Bid, "STK", BID, 20.0 + (i % 5) as f64, 2.0));
        }

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let (asks, bids) = (asks.clone(), bids.clone());
                std::thread::spawn(move || {
                    std::iter::from_fn(|| cross(&asks, &bids))
                        .map(|d| d.amount)
                        .sum::<f64>()
                })
            })
            .collect();
        let traded: f64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

        // every bid (1000 total) fits inside the asks (1500 total)
        assert_eq!(traded, 1000.0);
        assert!(bids.is_empty());
        let resting: f64 = asks.snapshot().iter().map(|o| o.amount).sum();
        assert_eq!(resting, 500.0);
    }
}
