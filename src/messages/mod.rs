mod send;

use std::sync::Arc;

use axum::{
    Json, Router, debug_handler,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use crate::{
    AppError, AppResult, AppState, Data,
    auth::Caller,
    db::{RoomId, Store},
    hub::Hub,
};

pub use send::{SendMessageBody, send_message};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/messages", post(create_message))
        .route("/messages/{room_id}", get(list_messages))
}

#[debug_handler(state = AppState)]
async fn list_messages(
    State(store): State<Store>,
    Path(room_id): Path<RoomId>,
) -> AppResult<impl IntoResponse> {
    Ok(Data {
        data: store.messages_for_room(&room_id).await?,
    })
}

#[debug_handler(state = AppState)]
async fn create_message(
    State(store): State<Store>,
    State(hub): State<Arc<Hub>>,
    Caller(user_id): Caller,
    body: Result<Json<SendMessageBody>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(body) = body.map_err(|rejection| AppError::invalid(rejection.body_text()))?;

    let message = send_message(&store, &hub, user_id, body).await?;
    Ok((StatusCode::CREATED, Data { data: message }))
}
