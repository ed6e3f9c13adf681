use clap::{Parser, Subcommand};
use orderbook::{OrderId, Side, Summary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Parser)]
#[command(name = "gavel-cli")]
#[command(about = "Gavel CLI - Command line client for the exchange")]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    server: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Buy {
        #[arg(short, long)]
        code: String,
        #[arg(short, long)]
        market: Option<String>,
        #[arg(short, long)]
        price: f64,
        #[arg(short, long)]
        amount: f64,
    },
    Sell {
        #[arg(short, long)]
        code: String,
        #[arg(short, long)]
        market: Option<String>,
        #[arg(short, long)]
        price: f64,
        #[arg(short, long)]
        amount: f64,
    },
    Summary {
        #[arg(short, long)]
        code: Option<String>,
    },
    Instruments,
    Issue {
        #[arg(short, long)]
        code: String,
        #[arg(short, long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        total_supply: f64,
        #[arg(long)]
        circulating_supply: f64,
        #[arg(short, long, default_value = "")]
        reference: String,
        #[arg(long)]
        max_brokers: Option<usize>,
    },
    Delist {
        #[arg(short, long)]
        code: String,
    },
    Health,
}

#[derive(Serialize)]
struct SubmitOrderRequest {
    market: Option<String>,
    price: f64,
    amount: f64,
}

#[derive(Deserialize)]
struct SubmitOrderResponse {
    order_id: OrderId,
    market: String,
    side: Side,
}

#[derive(Serialize)]
struct IssueRequest {
    name: String,
    code: String,
    description: String,
    total_supply: f64,
    circulating_supply: f64,
    reference: String,
    max_brokers: Option<usize>,
}

#[derive(Deserialize)]
struct IssueResponse {
    code: String,
    brokers: usize,
}

#[derive(Deserialize)]
struct Instrument {
    name: String,
    code: String,
    total_supply: f64,
    circulating_supply: f64,
}

#[derive(Deserialize)]
struct InstrumentsResponse {
    instruments: Vec<Instrument>,
}

#[derive(Deserialize)]
struct SummaryMessage {
    #[serde(default)]
    summaries: BTreeMap<String, Summary>,
}

fn print_summary(code: &str, summary: &Summary) {
    println!("== {}", code);
    for (market, orders) in &summary.queues {
        println!("  {} ({} resting)", market, orders.len());
        for order in orders.iter().take(10) {
            println!("    {} @ {}", order.amount, order.price);
        }
    }
    println!("  Last deals:");
    for deal in summary.history.iter().rev().take(10) {
        println!("    {} @ {} = {}", deal.amount, deal.price, deal.total);
    }
}

async fn submit(
    client: &reqwest::Client,
    server: &str,
    side: Side,
    code: String,
    request: SubmitOrderRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = match side {
        Side::Bid => "buy",
        Side::Ask => "sell",
    };
    let response = client
        .post(format!("{}/instruments/{}/{}", server, code, path))
        .json(&request)
        .send()
        .await?;

    if response.status().is_success() {
        let result: SubmitOrderResponse = response.json().await?;
        println!("Order ID: {}", result.order_id);
        println!("Placed: {} on {}", result.side, result.market);
    } else {
        println!("Error: {}", response.status());
        println!("{}", response.text().await?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Buy { code, market, price, amount } => {
            let request = SubmitOrderRequest { market, price, amount };
            submit(&client, &cli.server, Side::Bid, code, request).await?;
        }

        Commands::Sell { code, market, price, amount } => {
            let request = SubmitOrderRequest { market, price, amount };
            submit(&client, &cli.server, Side::Ask, code, request).await?;
        }

        Commands::Summary { code } => {
            let response = client
                .get(format!("{}/summary", cli.server))
                .send()
                .await?;

            if response.status().is_success() {
                let message: SummaryMessage = response.json().await?;
                match code {
                    Some(code) => match message.summaries.get(&code) {
                        Some(summary) => print_summary(&code, summary),
                        None => println!("No book for {}", code),
                    },
                    None => {
                        for (code, summary) in &message.summaries {
                            print_summary(code, summary);
                        }
                    }
                }
            } else {
                println!("Error: {}", response.status());
            }
        }

        Commands::Instruments => {
            let response = client
                .get(format!("{}/instruments", cli.server))
                .send()
                .await?;

            if response.status().is_success() {
                let listed: InstrumentsResponse = response.json().await?;
                for i in listed.instruments {
                    println!(
                        "{}  {}  supply {}/{}",
                        i.code, i.name, i.circulating_supply, i.total_supply
                    );
                }
            } else {
                println!("Error: {}", response.status());
            }
        }

        Commands::Issue {
            code,
            name,
            description,
            total_supply,
            circulating_supply,
            reference,
            max_brokers,
        } => {
            let request = IssueRequest {
                name,
                code,
                description,
                total_supply,
                circulating_supply,
                reference,
                max_brokers,
            };
            let response = client
                .post(format!("{}/instruments", cli.server))
                .json(&request)
                .send()
                .await?;

            if response.status().is_success() {
                let issued: IssueResponse = response.json().await?;
                println!("Issued {} with {} broker(s)", issued.code, issued.brokers);
            } else {
                println!("Error: {}", response.status());
                println!("{}", response.text().await?);
            }
        }

        Commands::Delist { code } => {
            let response = client
                .delete(format!("{}/instruments/{}", cli.server, code))
                .send()
                .await?;

            if response.status().is_success() {
                let result: serde_json::Value = response.json().await?;
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Error: {}", response.status());
                println!("{}", response.text().await?);
            }
        }

        Commands::Health => {
            let response = client
                .get(format!("{}/health", cli.server))
                .send()
                .await?;

            if response.status().is_success() {
                let health: serde_json::Value = response.json().await?;
                println!("{}", serde_json::to_string_pretty(&health)?);
            } else {
                println!("Error: {}", response.status());
            }
        }
    }

    Ok(())
}
