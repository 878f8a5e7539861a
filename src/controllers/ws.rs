use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::services::availability;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(subscribe_showtime))
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    showtime_id: i64,
}

// GET /api/ws?showtime_id= - подписка на топик сеанса.
// Разрыв соединения НЕ снимает блокировки: оплата идёт на hosted-странице
// шлюза, и клиент в этот момент легитимно отключён. Блокировки живут по TTL.
async fn subscribe_showtime(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| watch_showtime(state, query.showtime_id, socket))
}

async fn watch_showtime(state: Arc<AppState>, showtime_id: i64, mut socket: WebSocket) {
    let mut rx = state.hub.subscribe(showtime_id);

    // Первым кадром - снимок истины из БД; события дальше лишь ускоряют
    // перерисовку и не являются источником состояния
    if send_snapshot(&state, showtime_id, &mut socket).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Входящие сообщения клиента не несут команд
                    Some(Ok(_)) => {}
                }
            }
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        let frame = match serde_json::to_string(&event) {
                            Ok(frame) => frame,
                            Err(_) => continue,
                        };
                        if socket.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Отставший подписчик потерял события: перечитываем
                        // состояние из БД целиком
                        debug!(
                            "ws subscriber lagged by {} events on showtime {}",
                            skipped, showtime_id
                        );
                        if send_snapshot(&state, showtime_id, &mut socket).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    debug!("ws subscriber left showtime {}", showtime_id);
}

async fn send_snapshot(
    state: &Arc<AppState>,
    showtime_id: i64,
    socket: &mut WebSocket,
) -> Result<(), ()> {
    let seats = availability::seat_map(&state.db, showtime_id)
        .await
        .map_err(|_| ())?;

    let frame = json!({
        "type": "snapshot",
        "showtime_id": showtime_id,
        "seats": seats,
    });

    socket
        .send(Message::Text(frame.to_string().into()))
        .await
        .map_err(|_| ())
}
