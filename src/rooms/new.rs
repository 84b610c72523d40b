use axum::{
    Json, debug_handler,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{AppError, AppResult, AppState, Data, auth::Caller, db::Store};

#[derive(Debug, Deserialize)]
pub(crate) struct NewRoomBody {
    name: Option<String>,
}

/// Creates a room owned by the caller, who becomes its first member.
#[debug_handler(state = AppState)]
pub(crate) async fn new_room(
    State(store): State<Store>,
    Caller(user_id): Caller,
    body: Result<Json<NewRoomBody>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(NewRoomBody { name }) = body.map_err(|rejection| AppError::invalid(rejection.body_text()))?;
    let name = name
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::invalid("name is required"))?;

    let room = store.create_room(None, &name, Some(&user_id)).await?;
    Ok((StatusCode::CREATED, Data { data: room }))
}
