//! Load tests against a running exchange.
//!
//! Measures submission latency and how quickly a broker pool turns crossing
//! submissions into deals on the tape.

use exchange_service::Exchange;
use orderbook::{cross, Order, OrderQueue, Side, ASK, BID};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

/// Times queue insertion and crossing without any brokers involved.
pub fn run_queue_latency_test() {
    println!(" Queue Latency Test");

    let iterations = 100_000;
    let asks = OrderQueue::new(Side::Ask);
    let bids = OrderQueue::new(Side::Bid);
    let mut rng = StdRng::seed_from_u64(99);

    let orders: Vec<(Order, Order)> = (0..iterations)
        .map(|_| {
            (
                Order::new(Side::Ask, "STK", ASK, rng.gen_range(10.0..20.0), 10.0),
                Order::new(Side::Bid, "STK", BID, rng.gen_range(10.0..20.0), 10.0),
            )
        })
        .collect();

    let start = Instant::now();
    for (ask, bid) in orders {
        asks.add(ask);
        bids.add(bid);
    }
    let add_duration = start.elapsed();

    let start = Instant::now();
    let mut deals = 0u64;
    while cross(&asks, &bids).is_some() {
        deals += 1;
    }
    let cross_duration = start.elapsed();

    println!(
        "  Add: {:.2} ns/order",
        add_duration.as_nanos() as f64 / (2 * iterations) as f64
    );
    println!(
        "  Cross: {:.2} ns/deal over {} deals",
        cross_duration.as_nanos() as f64 / deals.max(1) as f64,
        deals
    );
    println!("  Resting after sweep: asks={}, bids={}\n", asks.len(), bids.len());
}

/// Random bids against fixed asks for `duration`, then waits for the tape.
pub async fn run_throughput_test(exchange: &Exchange, code: &str, duration: Duration) {
    println!(" Sustained Throughput Test ({} seconds)", duration.as_secs());

    let mut rng = StdRng::seed_from_u64(99);
    let mut submitted = 0u64;
    let mut rejected = 0u64;
    let mut worst = Duration::ZERO;

    let start = Instant::now();
    while start.elapsed() < duration {
        let t = Instant::now();
        let placed = exchange
            .buy(code, BID, rng.gen_range(10.0..20.0), rng.gen_range(10.0..20.0))
            .and_then(|_| exchange.sell(code, ASK, 10.0, 10.0));
        worst = worst.max(t.elapsed());

        match placed {
            Ok(_) => submitted += 2,
            Err(e) => {
                rejected += 1;
                println!("  rejected: {}", e);
            }
        }

        // hand the runtime back to brokers now and then
        if submitted % 1_000 == 0 {
            tokio::task::yield_now().await;
        }
    }
    let elapsed = start.elapsed();

    // let brokers and the collector catch up
    tokio::time::sleep(Duration::from_millis(200)).await;

    let summary = exchange
        .summaries()
        .remove(code)
        .unwrap_or_default();
    let resting: usize = summary.queues.values().map(Vec::len).sum();

    println!("  Duration: {:.1} seconds", elapsed.as_secs_f64());
    println!("  Orders submitted: {}", submitted);
    println!("  Orders rejected: {}", rejected);
    println!("  Worst submission pair: {:?}", worst);
    println!(
        "  Order throughput: {:.0} orders/second",
        submitted as f64 / elapsed.as_secs_f64()
    );
    println!("  Deals on tape: {}", summary.history.len());
    println!("  Resting orders: {}\n", resting);
}
