use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use market_data::bus::MessageBus;
use market_data::events::{ActionAck, ClientAction, parse_client_action};
use types::ids::ConnectionId;

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (client_id, mut outbound) = state.registry.register_greeted();
    let (mut sender, mut receiver) = socket.split();

    // Ends when the registry drops the client or the socket stops accepting writes.
    let mut forward_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let Some(action) = parse_client_action(text.as_str()) else {
                        tracing::debug!(client_id = %client_id, "Ignoring unrecognised client frame");
                        continue;
                    };
                    let ack = apply_action(&state, client_id, &action).await;
                    if let Ok(frame) = ack.to_frame() {
                        let _ = state.registry.unicast(client_id, frame);
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = &mut forward_task => {
                tracing::debug!(client_id = %client_id, "Outbound channel closed");
                break;
            }
        }
    }

    state.registry.disconnect(client_id);
    forward_task.abort();
}

/// Apply one client action and build its acknowledgement.
pub async fn apply_action(
    state: &AppState,
    client_id: ConnectionId,
    action: &ClientAction,
) -> ActionAck {
    let result = match action {
        ClientAction::Subscribe { channel } => state
            .registry
            .subscribe(client_id, channel)
            .map_err(|e| e.to_string()),
        ClientAction::Unsubscribe { channel } => state
            .registry
            .unsubscribe(client_id, channel)
            .map_err(|e| e.to_string()),
        ClientAction::Publish { channel, message } => state
            .bus
            .publish(channel, message.clone())
            .await
            .map(|delivered| {
                tracing::debug!(client_id = %client_id, channel = %channel, delivered, "Client published");
            })
            .map_err(|e| e.to_string()),
    };

    match result {
        Ok(()) => ActionAck::ok(action),
        Err(error) => {
            tracing::warn!(
                client_id = %client_id,
                action = action.name(),
                channel = action.channel(),
                error = %error,
                "Client action failed"
            );
            ActionAck::failed(action, error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_data::bus::LocalBus;
    use market_data::query::{HistoryService, HistoryServiceConfig};
    use market_data::registry::{ClientRegistry, WsConfig};
    use market_data::timeseries::InMemoryTimeSeries;
    use std::sync::Arc;

    fn state() -> AppState {
        let history = HistoryService::new(
            Arc::new(InMemoryTimeSeries::new()),
            HistoryServiceConfig::default(),
        );
        AppState::new(
            Arc::new(history),
            Arc::new(ClientRegistry::new(WsConfig::default())),
            Arc::new(LocalBus::default()),
        )
    }

    #[tokio::test]
    async fn test_unsubscribe_mutes_only_that_client() {
        let state = state();
        let (muted, mut muted_rx) = state.registry.register();
        let (_other, mut other_rx) = state.registry.register();

        let action = parse_client_action(r#"{"action": "unsubscribe", "channel": "AAPL"}"#).unwrap();
        let ack = apply_action(&state, muted, &action).await;
        assert!(ack.success);

        state.registry.broadcast("AAPL", "tick");
        assert!(muted_rx.try_recv().is_err());
        assert_eq!(other_rx.try_recv().unwrap(), "tick");

        let action = parse_client_action(r#"{"action": "subscribe", "channel": "AAPL"}"#).unwrap();
        assert!(apply_action(&state, muted, &action).await.success);
        state.registry.broadcast("AAPL", "tick");
        assert_eq!(muted_rx.try_recv().unwrap(), "tick");
    }

    #[tokio::test]
    async fn test_legacy_send_message_publishes_to_bus() {
        let state = state();
        let (client, _rx) = state.registry.register();
        let mut stream = state.bus.subscribe("orders_and_prices").await.unwrap();

        let action = parse_client_action(
            r#"{"action": "send message", "channel": "orders_and_prices", "message": "{\"AAPL\":{\"time\":1}}"}"#,
        )
        .unwrap();
        let ack = apply_action(&state, client, &action).await;

        assert!(ack.success);
        assert_eq!(ack.action, "publish");
        assert_eq!(stream.next().await.unwrap(), r#"{"AAPL":{"time":1}}"#);
    }

    #[tokio::test]
    async fn test_action_for_departed_client_fails() {
        let state = state();
        let (client, _rx) = state.registry.register();
        state.registry.disconnect(client);

        let action = ClientAction::Subscribe {
            channel: "AAPL".into(),
        };
        let ack = apply_action(&state, client, &action).await;

        assert!(!ack.success);
        assert!(ack.error.unwrap().contains("not found"));
    }
}
