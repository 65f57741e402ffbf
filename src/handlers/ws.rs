//! WebSocket push channel.
//!
//! Each connection is one hub subscription. The hub hands the current
//! snapshot first, then every published change; the client may ask for an
//! unconditional resend with `refresh` or `{"type":"request_refresh"}`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use herakles_port_manager::{HealthStats, ObserverId, PublicationHub, Snapshot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::state::SharedState;

/// Server to client message.
#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum PushMessage<'a> {
    PortsUpdate { snapshot: &'a Snapshot },
}

/// Client to server control message.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlMessage {
    RequestRefresh,
}

fn is_refresh_request(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("refresh") {
        return true;
    }
    matches!(
        serde_json::from_str::<ControlMessage>(trimmed),
        Ok(ControlMessage::RequestRefresh)
    )
}

/// Handler for GET /ws.
#[instrument(skip(state, ws))]
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /ws request");
    state.health_stats.record_http_request();
    let hub = state.hub.clone();
    let stats = state.health_stats.clone();
    ws.on_upgrade(move |socket| serve_observer(socket, hub, stats))
}

/// What the observer loop needs from a push connection.
trait ObserverSocket {
    async fn send_text(&mut self, text: String) -> Result<(), axum::Error>;
    /// Next client frame; `None` once the client is gone.
    async fn next_text(&mut self) -> Option<Incoming>;
    async fn close(&mut self);
}

enum Incoming {
    Text(String),
    Other,
}

impl ObserverSocket for WebSocket {
    async fn send_text(&mut self, text: String) -> Result<(), axum::Error> {
        self.send(Message::Text(text.into())).await
    }

    async fn next_text(&mut self) -> Option<Incoming> {
        match self.recv().await {
            Some(Ok(Message::Text(text))) => Some(Incoming::Text(text.as_str().to_owned())),
            Some(Ok(Message::Close(_))) | None => None,
            Some(Ok(_)) => Some(Incoming::Other),
            Some(Err(e)) => {
                debug!("Observer receive error: {}", e);
                None
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.send(Message::Close(None)).await;
    }
}

async fn serve_observer<S: ObserverSocket>(
    mut socket: S,
    hub: Arc<PublicationHub>,
    stats: Arc<HealthStats>,
) {
    let mut subscription = hub.subscribe();
    let id = subscription.id();
    info!("Observer {} connected ({} active)", id, hub.observer_count());

    loop {
        tokio::select! {
            update = subscription.recv() => {
                let Some(snapshot) = update else {
                    debug!("Observer {} queue closed", id);
                    break;
                };
                if let Err(e) = send_snapshot(&mut socket, &snapshot).await {
                    debug!("Observer {} send failed: {}", id, e);
                    break;
                }
            }
            incoming = socket.next_text() => {
                match incoming {
                    Some(Incoming::Text(text)) => handle_control(&hub, &stats, id, &text),
                    Some(Incoming::Other) => {}
                    None => break,
                }
            }
        }
    }

    hub.unsubscribe(id);
    socket.close().await;
    info!("Observer {} disconnected", id);
}

fn handle_control(hub: &PublicationHub, stats: &HealthStats, id: ObserverId, text: &str) {
    if !is_refresh_request(text) {
        warn!("Observer {} sent unknown control message", id);
        return;
    }
    stats.record_refresh_request();
    if !hub.on_refresh_request(id) {
        debug!("Refresh for observer {} not delivered", id);
    }
}

async fn send_snapshot<S: ObserverSocket>(
    socket: &mut S,
    snapshot: &Arc<Snapshot>,
) -> Result<(), axum::Error> {
    let payload = match serde_json::to_string(&PushMessage::PortsUpdate { snapshot }) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize snapshot: {}", e);
            return Ok(());
        }
    };
    socket.send_text(payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::Ordering;
    use tokio::sync::mpsc;

    /// Push connection backed by two channels.
    struct ChannelSocket {
        to_client: mpsc::UnboundedSender<String>,
        from_client: mpsc::UnboundedReceiver<String>,
    }

    impl ObserverSocket for ChannelSocket {
        async fn send_text(&mut self, text: String) -> Result<(), axum::Error> {
            self.to_client
                .send(text)
                .map_err(|_| axum::Error::new("client gone"))
        }

        async fn next_text(&mut self) -> Option<Incoming> {
            self.from_client.recv().await.map(Incoming::Text)
        }

        async fn close(&mut self) {}
    }

    fn pushed_user_count(text: &str) -> u64 {
        let json: serde_json::Value = serde_json::from_str(text).expect("json");
        assert_eq!(json["event"], "ports_update");
        json["snapshot"]["counts"]["user"].as_u64().expect("count")
    }

    #[tokio::test]
    async fn test_observer_gets_current_then_refresh() {
        let hub = Arc::new(PublicationHub::new(4));
        let stats = Arc::new(HealthStats::new());
        hub.publish(Arc::new(Snapshot::build(Vec::new(), false, Utc::now())));

        let (to_client, mut client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();
        let task = tokio::spawn(serve_observer(
            ChannelSocket {
                to_client,
                from_client,
            },
            hub.clone(),
            stats.clone(),
        ));

        let first = client_rx.recv().await.expect("current snapshot first");
        assert_eq!(pushed_user_count(&first), 0);

        client_tx.send("refresh".to_string()).expect("send");
        let resent = client_rx.recv().await.expect("refresh resend");
        assert_eq!(resent, first);
        assert_eq!(stats.refresh_requests.load(Ordering::Relaxed), 1);

        drop(client_tx);
        task.await.expect("observer loop ends");
        assert_eq!(hub.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_observer_loop_ends_when_hub_closes() {
        let hub = Arc::new(PublicationHub::new(4));
        let stats = Arc::new(HealthStats::new());

        let (to_client, mut client_rx) = mpsc::unbounded_channel();
        let (_client_tx, from_client) = mpsc::unbounded_channel();
        let task = tokio::spawn(serve_observer(
            ChannelSocket {
                to_client,
                from_client,
            },
            hub.clone(),
            stats,
        ));

        while hub.observer_count() == 0 {
            tokio::task::yield_now().await;
        }
        hub.close_all();

        task.await.expect("observer loop ends");
        assert!(client_rx.recv().await.is_none());
    }

    #[test]
    fn test_refresh_request_forms() {
        assert!(is_refresh_request("refresh"));
        assert!(is_refresh_request(" REFRESH\n"));
        assert!(is_refresh_request(r#"{"type":"request_refresh"}"#));
        assert!(!is_refresh_request(r#"{"type":"kill"}"#));
        assert!(!is_refresh_request("hello"));
    }

    #[test]
    fn test_push_message_shape() {
        let snapshot = Snapshot::build(Vec::new(), false, Utc::now());
        let json = serde_json::to_value(PushMessage::PortsUpdate {
            snapshot: &snapshot,
        })
        .expect("serializes");
        assert_eq!(json["event"], "ports_update");
        assert_eq!(json["snapshot"]["counts"]["user"], 0);
        assert_eq!(json["snapshot"]["isPrivilegedObserver"], false);
    }
}
