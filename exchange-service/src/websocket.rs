//! WebSocket hub for order entry and summary fan-out.
//!
//! Clients send BUY/SELL messages and receive a SUMMARY every broadcast tick.
//! Rejected orders come back as ERROR messages on the same socket.

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt, Sink};
use orderbook::Side;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use exchange_service::{Command, Message};

use crate::AppState;

/// Serves one client until it closes or the connection breaks.
pub async fn handle_stream(socket: WebSocket, state: AppState) {
    info!("🔗 New stream connection");

    let (mut sender, mut receiver) = socket.split();
    let mut summary_rx = state.summaries.subscribe();
    let mut ping_interval = interval(Duration::from_secs(30));

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        let reply = match serde_json::from_str::<Message>(&text) {
                            Ok(msg) if msg.command == Command::Close => break,
                            Ok(msg) => handle_command(&state, msg),
                            Err(e) => Some(Message::error(format!("bad message: {e}"))),
                        };
                        if let Some(reply) = reply {
                            if send_json(&mut sender, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Binary(_))) => {} // Ignore binary
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = sender.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Pong(_))) => {}
                    Some(Ok(WsMessage::Close(_))) => {
                        info!(" Stream connection closed");
                        break;
                    }
                    Some(Err(e)) => {
                        error!(" WebSocket error in stream: {}", e);
                        break;
                    }
                    None => break,
                }
            }

            summary = summary_rx.recv() => {
                match summary {
                    Ok(msg) => {
                        if send_json(&mut sender, &msg).await.is_err() {
                            warn!(" Failed to push summary");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "slow subscriber skipped summaries");
                    }
                    Err(RecvError::Closed) => {
                        let _ = send_json(&mut sender, &Message::error("Connection disrupted")).await;
                        break;
                    }
                }
            }

            _ = ping_interval.tick() => {
                if sender.send(WsMessage::Ping(Vec::new())).await.is_err() {
                    break; // Connection broken
                }
            }
        }
    }

    info!("✅ Stream handler ended");
}

/// Applies an inbound command. Returns a reply only for rejections.
fn handle_command(state: &AppState, msg: Message) -> Option<Message> {
    let side = match msg.command {
        Command::Buy => Side::Bid,
        Command::Sell => Side::Ask,
        Command::Open | Command::NewInstrument => return None,
        other => return Some(Message::error(format!("unsupported command {other:?}"))),
    };
    let Some(order) = msg.order else {
        return Some(Message::error("missing order"));
    };

    let market = order.market_or_default(side);
    let placed = match side {
        Side::Bid => state.exchange.buy(&order.code, market, order.price, order.amount),
        Side::Ask => state.exchange.sell(&order.code, market, order.price, order.amount),
    };
    match placed {
        Ok(_) => None,
        Err(e) => {
            warn!(code = %order.code, error = %e, "order rejected");
            Some(Message::error(e.to_string()))
        }
    }
}

async fn send_json<S>(sender: &mut S, msg: &Message) -> Result<(), ()>
where
    S: Sink<WsMessage> + Unpin,
{
    let json = serde_json::to_string(msg).map_err(|_| ())?;
    sender.send(WsMessage::Text(json)).await.map_err(|_| ())
}
