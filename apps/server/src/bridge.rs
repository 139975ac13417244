use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::{sink::SinkExt, stream::StreamExt};
use shared_proto::{auth::SESSION_COOKIE, events::ClientEvent};
use uuid::Uuid;

use crate::auth::token_from_headers;
use crate::error::{ApiError, ApiResult};
use crate::messages;
use crate::state::AppState;
use crate::users;

/// Resolve the identity behind a channel handshake from its session cookie.
/// The identity must still exist.
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> ApiResult<Uuid> {
    let token = token_from_headers(headers, SESSION_COOKIE).ok_or_else(ApiError::unauthenticated)?;
    let user_id = state.sessions.verify_user(&token)?;
    match users::find_user(&state.db, user_id).await {
        Ok(user) => Ok(user.id),
        Err(ApiError::NotFound(_)) => Err(ApiError::unauthenticated()),
        Err(e) => Err(e),
    }
}

pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    match authenticate(&state, &headers).await {
        Ok(user_id) => ws.on_upgrade(move |socket| run_channel(state, user_id, socket)),
        Err(e) => {
            tracing::warn!(component = "bridge", error = %e, "refused channel handshake");
            e.into_response()
        }
    }
}

async fn run_channel(state: AppState, user_id: Uuid, socket: WebSocket) {
    let mut handle = state.channels.register(user_id);
    let conn_id = handle.conn_id;
    tracing::info!(component = "bridge", %user_id, %conn_id, "channel open");

    let (mut sender, mut receiver) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(msg) = handle.rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut writer => break,
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => handle_client_event(&state, user_id, &text).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(component = "bridge", %user_id, error = %e, "channel read failed");
                    break;
                }
            },
        }
    }

    state.channels.deregister(user_id, conn_id);
    writer.abort();
    tracing::info!(component = "bridge", %user_id, %conn_id, "channel closed");
}

async fn handle_client_event(state: &AppState, user_id: Uuid, text: &str) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(component = "bridge", %user_id, error = %e, "ignoring malformed client event");
            return;
        }
    };

    match event {
        ClientEvent::NewMessage { chat_id, content } => {
            if let Err(e) = messages::send_text(state, user_id, chat_id, &content).await {
                tracing::warn!(component = "bridge", %user_id, %chat_id, error = %e, "client message rejected");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{header, HeaderValue};

    use super::*;
    use crate::state::testing::test_state;
    use crate::users::testing::insert_user;

    fn cookie_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {SESSION_COOKIE}={token}")).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn valid_cookie_resolves_identity() {
        let state = test_state("bridge-ok").await;
        let alice = insert_user(&state.writer, "alice", "Alice").await;
        let token = state.sessions.issue(alice).unwrap();

        let user_id = authenticate(&state, &cookie_headers(&token)).await.expect("auth");
        assert_eq!(user_id, alice);
    }

    #[tokio::test]
    async fn missing_bad_or_orphaned_tokens_are_unauthenticated() {
        let state = test_state("bridge-bad").await;
        let orphan = state.sessions.issue(Uuid::new_v4()).unwrap();

        for headers in [
            HeaderMap::new(),
            cookie_headers("not-a-jwt"),
            cookie_headers(&orphan),
        ] {
            let err = authenticate(&state, &headers).await.unwrap_err();
            assert!(matches!(err, ApiError::Unauthenticated(_)), "{err:?}");
        }
    }

    #[tokio::test]
    async fn client_message_event_is_stored_and_fanned_out() {
        let state = test_state("bridge-event").await;
        let alice = insert_user(&state.writer, "alice", "Alice").await;
        let bob = insert_user(&state.writer, "bob", "Bob").await;
        let carol = insert_user(&state.writer, "carol", "Carol").await;
        let chat = crate::chats::create_group(
            &state,
            alice,
            crate::chats::NewGroupRequest {
                name: "Team".to_string(),
                members: vec![bob, carol],
            },
        )
        .await
        .expect("group");
        let mut bob_channel = state.channels.register(bob);

        let raw = serde_json::to_string(&ClientEvent::NewMessage {
            chat_id: chat.id,
            content: "hello".to_string(),
        })
        .unwrap();
        handle_client_event(&state, alice, &raw).await;
        handle_client_event(&state, alice, "{not json").await;

        assert!(matches!(bob_channel.rx.try_recv(), Ok(Message::Text(_))));
        let page = messages::get_messages(&state.db, bob, chat.id, 1).await.unwrap();
        assert_eq!(page.messages.len(), 1);
        assert_eq!(page.messages[0].content, "hello");
    }
}
