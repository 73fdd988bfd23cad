//! WebSocket connection loop.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! dispatching incoming commands and forwarding filtered events.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use super::messages::{WsCommand, WsMessage, WsMessageType};
use super::subscription::SubscriptionManager;
use crate::domain::{LoyaltyEvent, UserId};
use crate::service::LoyaltyService;

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and dispatches them.
/// - Forwards matching events from the [`broadcast::Receiver`] to the client.
pub async fn run_connection(
    socket: WebSocket,
    mut event_rx: broadcast::Receiver<LoyaltyEvent>,
    loyalty_service: Arc<LoyaltyService>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subs = SubscriptionManager::new();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = handle_text_message(&text, &mut subs, &loyalty_service).await;
                        if let Some(resp_json) = response
                            && ws_tx.send(Message::text(resp_json)).await.is_err() {
                                break;
                            }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(loyalty_event) => {
                        if subs.matches(&loyalty_event) {
                            let msg = WsMessage::new(
                                uuid::Uuid::new_v4().to_string(),
                                WsMessageType::Event,
                                serde_json::to_value(&loyalty_event).unwrap_or_default(),
                            );
                            let json = serde_json::to_string(&msg).unwrap_or_default();
                            if ws_tx.send(Message::text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "ws client lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("ws connection closed");
}

/// Handles a text message from the client, returning an optional JSON response.
async fn handle_text_message(
    text: &str,
    subs: &mut SubscriptionManager,
    loyalty_service: &LoyaltyService,
) -> Option<String> {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        return serde_json::to_string(&WsMessage::error(String::new(), 400, "malformed JSON")).ok();
    };

    let Ok(command) = serde_json::from_value::<WsCommand>(msg.payload.clone()) else {
        return serde_json::to_string(&WsMessage::error(msg.id, 404, "unknown command")).ok();
    };

    let response = match command {
        WsCommand::Subscribe { user_ids, topics } => {
            let (ids, wildcard) = parse_user_ids(&user_ids);
            subs.subscribe(&ids, wildcard, &topics);
            WsMessage::new(
                msg.id,
                WsMessageType::Response,
                serde_json::json!({
                    "subscribed": ids,
                    "topics": topics,
                    "count": subs.count(),
                    "wildcard_topics": subs.wildcard_topics(),
                }),
            )
        }
        WsCommand::Unsubscribe { user_ids, topics } => {
            let (ids, wildcard) = parse_user_ids(&user_ids);
            subs.unsubscribe(&ids, wildcard, &topics);
            WsMessage::new(
                msg.id,
                WsMessageType::Response,
                serde_json::json!({
                    "unsubscribed": ids,
                    "remaining_count": subs.count(),
                    "wildcard_topics": subs.wildcard_topics(),
                }),
            )
        }
        WsCommand::GetPoints { user_id } => {
            let record = match UserId::new(&user_id) {
                Ok(user_id) => loyalty_service.get_user_points(&user_id).await,
                Err(err) => Err(err),
            };
            match record {
                Ok(record) => WsMessage::new(
                    msg.id,
                    WsMessageType::Response,
                    serde_json::to_value(&record).unwrap_or_default(),
                ),
                Err(err) => WsMessage::error(msg.id, err.error_code(), &err.to_string()),
            }
        }
    };
    serde_json::to_string(&response).ok()
}

/// Splits raw subscription targets into valid user ids and the wildcard flag.
fn parse_user_ids(raw: &[String]) -> (Vec<UserId>, bool) {
    let mut ids = Vec::new();
    let mut wildcard = false;
    for value in raw {
        if value == "*" {
            wildcard = true;
        } else if let Ok(id) = UserId::new(value) {
            ids.push(id);
        }
    }
    (ids, wildcard)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::app_state::AppState;
    use crate::config::AcademyConfig;
    use crate::domain::{LevelTable, SystemClock};
    use crate::persistence::MemoryStore;
    use chrono::Utc;

    fn make_service() -> Arc<LoyaltyService> {
        let state = AppState::build(
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
            LevelTable::default(),
            &AcademyConfig::default(),
        );
        state.loyalty_service
    }

    fn command(payload: serde_json::Value) -> String {
        let msg = WsMessage::new("req-1".to_string(), WsMessageType::Command, payload);
        serde_json::to_string(&msg).unwrap_or_default()
    }

    fn parse(reply: Option<String>) -> WsMessage {
        let Some(reply) = reply else {
            panic!("expected a reply");
        };
        let Ok(msg) = serde_json::from_str::<WsMessage>(&reply) else {
            panic!("reply is not a message");
        };
        msg
    }

    #[test]
    fn parse_user_ids_splits_wildcard_and_skips_blanks() {
        let raw = vec!["a".to_string(), "*".to_string(), " ".to_string()];
        let (ids, wildcard) = parse_user_ids(&raw);
        assert!(wildcard);
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn subscribe_command_updates_manager() {
        let service = make_service();
        let mut subs = SubscriptionManager::new();
        let text = command(serde_json::json!({ "command": "subscribe", "user_ids": ["a"] }));
        let reply = parse(handle_text_message(&text, &mut subs, &service).await);
        assert_eq!(reply.msg_type, WsMessageType::Response);
        assert_eq!(reply.id, "req-1");
        assert_eq!(subs.count(), 1);
    }

    #[tokio::test]
    async fn topic_filter_drops_other_categories() {
        let service = make_service();
        let mut subs = SubscriptionManager::new();
        let text = command(serde_json::json!({
            "command": "subscribe",
            "user_ids": ["a"],
            "topics": ["levels"],
        }));
        let reply = parse(handle_text_message(&text, &mut subs, &service).await);
        assert_eq!(reply.payload.get("topics"), Some(&serde_json::json!(["levels"])));

        let Ok(user_id) = UserId::new("a") else {
            panic!("valid id");
        };
        let session = LoyaltyEvent::SessionStarted {
            user_id: user_id.clone(),
            timestamp: Utc::now(),
        };
        let level = LoyaltyEvent::LevelChanged {
            user_id,
            old_level: "bronze".to_string(),
            new_level: "silver".to_string(),
            timestamp: Utc::now(),
        };
        assert!(!subs.matches(&session));
        assert!(subs.matches(&level));
    }

    #[tokio::test]
    async fn get_points_command_reads_balance() {
        let service = make_service();
        let Ok(user) = UserId::new("a") else {
            panic!("valid id");
        };
        let _ = service.add_points(&user, 42, "x").await;
        let mut subs = SubscriptionManager::new();
        let text = command(serde_json::json!({ "command": "get_points", "user_id": "a" }));
        let reply = parse(handle_text_message(&text, &mut subs, &service).await);
        assert_eq!(
            reply.payload.get("available_points"),
            Some(&serde_json::json!(42))
        );
    }

    #[tokio::test]
    async fn malformed_and_unknown_messages_get_errors() {
        let service = make_service();
        let mut subs = SubscriptionManager::new();
        let reply = parse(handle_text_message("{oops", &mut subs, &service).await);
        assert_eq!(reply.msg_type, WsMessageType::Error);

        let text = command(serde_json::json!({ "command": "redeem" }));
        let reply = parse(handle_text_message(&text, &mut subs, &service).await);
        assert_eq!(reply.msg_type, WsMessageType::Error);
    }
}
