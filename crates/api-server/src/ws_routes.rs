use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::AppState;

/// Synthetic ticks pushed to every socket; never read from the quote cache.
const SYNTHETIC_TICKS: &[(&str, f64, f64)] = &[
    ("AAPL", 150.25, 1.2),
    ("GOOGL", 2800.50, -0.8),
    ("MSFT", 300.75, 0.5),
];

/// Fan-out of `market_update` frames to connected `/ws/market` sockets.
#[derive(Clone)]
pub struct MarketBroadcaster {
    tx: broadcast::Sender<String>,
    connections: Arc<AtomicUsize>,
}

impl Default for MarketBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            tx,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Number of sockets currently attached.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn market_update_payload(timestamp: DateTime<Utc>) -> serde_json::Value {
        let data: serde_json::Map<String, serde_json::Value> = SYNTHETIC_TICKS
            .iter()
            .map(|(symbol, price, change)| {
                (
                    symbol.to_string(),
                    serde_json::json!({ "price": price, "change": change }),
                )
            })
            .collect();

        serde_json::json!({
            "type": "market_update",
            "timestamp": timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            "data": data,
        })
    }

    /// Send a frame to every subscriber. Returns how many received it.
    pub fn publish(&self, message: String) -> usize {
        // Err only means nobody is listening
        self.tx.send(message).unwrap_or(0)
    }

    pub fn spawn_ticker(&self, interval: Duration) -> JoinHandle<()> {
        let broadcaster = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let payload = Self::market_update_payload(Utc::now()).to_string();
                let delivered = broadcaster.publish(payload);
                tracing::debug!("market_update delivered to {} sockets", delivered);
            }
        })
    }
}

#[utoipa::path(
    get,
    path = "/ws/market",
    responses((status = 101, description = "WebSocket upgrade for synthetic market updates")),
    tag = "System"
)]
pub async fn ws_market_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_market_socket(socket, state.broadcaster))
}

async fn handle_market_socket(socket: WebSocket, broadcaster: MarketBroadcaster) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = broadcaster.subscribe();

    let open = broadcaster.connections.fetch_add(1, Ordering::Relaxed) + 1;
    tracing::info!("Market socket connected ({} open)", open);

    let mut send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(frame) => {
                    if sender.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Market socket lagged, skipped {} frames", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Client frames are ignored; only a close (or a dead stream) matters
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    let open = broadcaster.connections.fetch_sub(1, Ordering::Relaxed) - 1;
    tracing::info!("Market socket disconnected ({} open)", open);
}

pub fn ws_routes() -> Router<AppState> {
    Router::new().route("/ws/market", get(ws_market_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_market_update_payload_shape() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let payload = MarketBroadcaster::market_update_payload(at);

        assert_eq!(payload["type"], "market_update");
        assert_eq!(payload["timestamp"], "2024-01-01T00:00:00Z");
        assert_eq!(payload["data"]["AAPL"]["price"], 150.25);
        assert_eq!(payload["data"]["GOOGL"]["change"], -0.8);
        assert_eq!(payload["data"]["MSFT"]["change"], 0.5);
        assert_eq!(payload["data"].as_object().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let broadcaster = MarketBroadcaster::new();
        assert_eq!(broadcaster.publish("dropped".into()), 0);

        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.clone().subscribe();
        assert_eq!(broadcaster.publish("tick".into()), 2);

        assert_eq!(a.recv().await.unwrap(), "tick");
        assert_eq!(b.recv().await.unwrap(), "tick");
        assert_eq!(broadcaster.connections(), 0);
    }

    #[tokio::test]
    async fn test_ticker_publishes_on_interval() {
        let broadcaster = MarketBroadcaster::new();
        let mut rx = broadcaster.subscribe();
        let handle = broadcaster.spawn_ticker(Duration::from_millis(20));

        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "market_update");

        handle.abort();
    }
}
