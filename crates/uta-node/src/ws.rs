//! The visualization WebSocket feed.
//!
//! One socket per client on `/ws`; every applied domain event is forwarded
//! as one JSON text message.  The feed taps the cluster's broadcast
//! channel, so a slow client lags and skips rather than backing up the
//! simulation.
//!
//! Handlers deliberately hold no non-`Send` state across awaits — axum
//! requires `Send` futures for its generated services.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uta_entities::proto::VizEvent;

/// Serve the feed on `bind` until the process exits.
pub async fn serve(bind: String, viz: broadcast::Sender<VizEvent>) -> anyhow::Result<()> {
    let app = Router::new().route("/ws", get(upgrade)).with_state(viz);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(%bind, "visualization feed listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn upgrade(
    State(viz): State<broadcast::Sender<VizEvent>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| client_loop(socket, viz.subscribe()))
}

async fn client_loop(mut socket: WebSocket, mut events: broadcast::Receiver<VizEvent>) {
    debug!("visualization client connected");
    loop {
        match events.recv().await {
            Ok(event) => {
                let Ok(json) = serde_json::to_string(&event) else {
                    continue;
                };
                if socket.send(Message::Text(json)).await.is_err() {
                    debug!("visualization client disconnected");
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "visualization client lagging; frames dropped");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
