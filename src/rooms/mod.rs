mod new;

use axum::{
    Router, debug_handler,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
};

use crate::{
    AppError, AppResult, AppState, Data,
    auth::Caller,
    db::{RoomId, Store},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rooms", get(my_rooms).post(new::new_room))
        .route("/rooms/{room_id}/members", post(join_room))
}

/// Rooms the caller belongs to.
#[debug_handler(state = AppState)]
async fn my_rooms(State(store): State<Store>, Caller(user_id): Caller) -> AppResult<impl IntoResponse> {
    Ok(Data {
        data: store.rooms_for_user(&user_id).await?,
    })
}

/// Persists the caller's membership of a room. Joining twice is a no-op.
#[debug_handler(state = AppState)]
async fn join_room(
    State(store): State<Store>,
    Caller(user_id): Caller,
    Path(room_id): Path<RoomId>,
) -> AppResult<impl IntoResponse> {
    let Some(room) = store.find_room(&room_id).await? else {
        return Err(AppError::not_found(format!("room {room_id} not found")));
    };

    if store.add_member(&room.id, &user_id).await? {
        tracing::info!(room_id = %room.id, user_id = %user_id, "member added");
    }
    Ok(Data { data: room })
}
