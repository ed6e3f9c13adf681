use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use clap::Parser;
use orderbook::{now_millis, Side};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use exchange_service::types::{
    InstrumentsResponse, IssueRequest, IssueResponse, SubmitOrderRequest, SubmitOrderResponse,
};
use exchange_service::{Exchange, ExchangeConfig, ExchangeError, Instrument, Message};

mod websocket;

#[derive(Parser, Debug)]
#[command(name = "exchange-service")]
#[command(about = "Continuous double-auction exchange with a WebSocket summary feed")]
struct Args {
    #[arg(long, env = "GAVEL_BIND", default_value = "0.0.0.0:8080")]
    bind: String,
    /// Brokers in the matching pool
    #[arg(long, env = "GAVEL_BROKERS", default_value_t = 5)]
    brokers: usize,
    /// Seconds between summary pushes
    #[arg(long, env = "GAVEL_BROADCAST_SECS", default_value_t = 5)]
    broadcast_secs: u64,
    /// Code of the instrument listed at startup, empty to skip
    #[arg(long, env = "GAVEL_BOOTSTRAP", default_value = "STK")]
    bootstrap: String,
}

#[derive(Clone)]
pub struct AppState {
    exchange: Arc<Exchange>,
    summaries: broadcast::Sender<Message>,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = ExchangeConfig {
        broadcast_interval_secs: args.broadcast_secs,
        ..Default::default()
    };
    let exchange = Arc::new(Exchange::with_config(config));
    for _ in 0..args.brokers {
        exchange.spawn_broker();
    }

    let collector = tokio::spawn({
        let exchange = exchange.clone();
        async move { exchange.run().await }
    });

    if !args.bootstrap.is_empty() {
        let stock = Instrument::new(
            "Stock",
            args.bootstrap.as_str(),
            "Example instrument listed at startup",
            100_000.0,
            90_000.0,
            format!("/stocks/{}", args.bootstrap.to_lowercase()),
        );
        if let Err(e) = exchange.issue(stock, None) {
            warn!(error = %e, "bootstrap listing failed");
        }
    }

    let (summary_tx, _) = broadcast::channel(16);
    tokio::spawn({
        let exchange = exchange.clone();
        let summary_tx = summary_tx.clone();
        let mut ticker = tokio::time::interval(exchange.config().broadcast_interval());
        async move {
            loop {
                ticker.tick().await;
                if exchange.is_stopped() {
                    break;
                }
                // no subscribers is fine
                let _ = summary_tx.send(exchange.broadcast());
            }
        }
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/summary", get(summary))
        .route("/instruments", get(list_instruments).post(issue))
        .route("/instruments/:code", delete(delist))
        .route("/instruments/:code/buy", post(buy))
        .route("/instruments/:code/sell", post(sell))
        .route("/stream", get(stream))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(AppState {
            exchange: exchange.clone(),
            summaries: summary_tx,
        });

    let listener = tokio::net::TcpListener::bind(&args.bind).await?;

    info!(" Exchange service starting on http://{}", args.bind);
    info!(" Available endpoints:");
    info!("  GET  /health - Health check");
    info!("  GET  /summary - Summary of every book");
    info!("  GET  /instruments - Listed instruments");
    info!("  POST /instruments - Issue an instrument");
    info!("  DEL  /instruments/:code - Delist an instrument");
    info!("  POST /instruments/:code/buy - Place a bid");
    info!("  POST /instruments/:code/sell - Place an ask");
    info!("  WS   /stream - Order entry and summary feed");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    exchange.stop();
    let _ = collector.await;
    info!("exchange stopped");
    Ok(())
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "gavel-exchange",
        "version": env!("CARGO_PKG_VERSION"),
        "brokers": state.exchange.brokers(),
        "idle_brokers": state.exchange.idle_brokers(),
        "timestamp": now_millis(),
    }))
}

async fn summary(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.exchange.broadcast())
}

async fn list_instruments(State(state): State<AppState>) -> impl IntoResponse {
    Json(InstrumentsResponse {
        instruments: state.exchange.instruments(),
    })
}

async fn issue(
    State(state): State<AppState>,
    Json(request): Json<IssueRequest>,
) -> Result<impl IntoResponse, AppError> {
    let instrument = Instrument::new(
        request.name,
        request.code.clone(),
        request.description,
        request.total_supply,
        request.circulating_supply,
        request.reference,
    );
    let brokers = state.exchange.issue(instrument, request.max_brokers)?;
    Ok((
        StatusCode::CREATED,
        Json(IssueResponse {
            code: request.code,
            brokers,
        }),
    ))
}

async fn delist(
    Path(code): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let instrument = state.exchange.delist(&code)?;
    Ok(Json(instrument))
}

async fn buy(
    Path(code): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<SubmitOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    submit(&state, Side::Bid, code, request)
}

async fn sell(
    Path(code): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<SubmitOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    submit(&state, Side::Ask, code, request)
}

fn submit(
    state: &AppState,
    side: Side,
    code: String,
    request: SubmitOrderRequest,
) -> Result<(StatusCode, Json<SubmitOrderResponse>), AppError> {
    let market = request
        .market
        .unwrap_or_else(|| side.market().to_string());
    let order_id = match side {
        Side::Bid => state.exchange.buy(&code, &market, request.price, request.amount)?,
        Side::Ask => state.exchange.sell(&code, &market, request.price, request.amount)?,
    };

    Ok((
        StatusCode::CREATED,
        Json(SubmitOrderResponse {
            order_id,
            code,
            market,
            side,
        }),
    ))
}

async fn stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| websocket::handle_stream(socket, state))
}

#[derive(Debug)]
struct AppError(ExchangeError);

impl From<ExchangeError> for AppError {
    fn from(e: ExchangeError) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ExchangeError::UnknownInstrument(_)
            | ExchangeError::UnknownMarket { .. }
            | ExchangeError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            ExchangeError::SideMismatch { .. }
            | ExchangeError::InvalidOrder { .. }
            | ExchangeError::InvalidReference(_) => StatusCode::BAD_REQUEST,
            ExchangeError::InstrumentExists(_) => StatusCode::CONFLICT,
            ExchangeError::NoBrokerAvailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = Json(serde_json::json!({
            "error": self.0.to_string(),
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}
