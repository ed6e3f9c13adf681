//! Gavel load lab
//!
//! Spins up an exchange with a broker pool, lists one instrument and drives
//! random order flow through it, then prints the book summary.

use exchange_service::{Exchange, ExchangeConfig, Instrument};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod load_test;

const BROKERS: usize = 5;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    println!("=== Gavel Load Lab ===");

    load_test::run_queue_latency_test();

    let exchange = Arc::new(Exchange::with_config(ExchangeConfig::default()));
    for _ in 0..BROKERS {
        exchange.spawn_broker();
    }
    let collector = tokio::spawn({
        let exchange = exchange.clone();
        async move { exchange.run().await }
    });

    let stock = Instrument::new(
        "Stock",
        "STK",
        "This is an example of using gavel to trade stock",
        100_000.0,
        90_000.0,
        "/stocks/stk",
    );
    match exchange.issue(stock, None) {
        Ok(brokers) => info!(brokers, "STK listed"),
        Err(e) => {
            eprintln!("listing failed: {}", e);
            return;
        }
    }

    load_test::run_throughput_test(&exchange, "STK", Duration::from_secs(5)).await;

    println!("=== Summary ===");
    match serde_json::to_string_pretty(&exchange.broadcast()) {
        Ok(json) => {
            // queues can be long, the tape is what matters here
            for line in json.lines().take(60) {
                println!("{}", line);
            }
        }
        Err(e) => eprintln!("summary not serializable: {}", e),
    }

    exchange.stop();
    let _ = collector.await;
}
