use crate::auth::AuthenticatedUser;
use crate::state::AppState;
use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::stream::StreamExt;
use market_data::Session;

/// Close code sent when the server drops a session
const CLOSE_POLICY: u16 = 1008;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    user: Option<AuthenticatedUser>,
) -> Response {
    let session = Session::new(
        state.hub.clone(),
        user.map(|u| u.user_id),
        state.session,
    );
    ws.on_upgrade(move |socket| handle_socket(socket, session))
}

async fn handle_socket(mut socket: WebSocket, mut session: Session) {
    tracing::info!(user_id = ?session.user_id(), "WebSocket session opened");

    loop {
        tokio::select! {
            incoming = socket.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "WebSocket receive failed");
                        break;
                    }
                };
                let reply = session.handle_message(text.as_str());
                let Ok(reply) = serde_json::to_string(&reply) else {
                    break;
                };
                if socket.send(Message::Text(reply.into())).await.is_err() {
                    break;
                }
            }
            outgoing = session.recv(), if session.is_active() => {
                match outgoing {
                    Some(Ok(message)) => {
                        if socket.send(Message::Text(message.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        let frame = CloseFrame {
                            code: CLOSE_POLICY,
                            reason: e.to_string().into(),
                        };
                        let _ = socket.send(Message::Close(Some(frame))).await;
                        break;
                    }
                    None => {}
                }
            }
        }
    }

    tracing::info!(
        user_id = ?session.user_id(),
        dropped = session.dropped(),
        "WebSocket session closed"
    );
}
