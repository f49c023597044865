//! Request Handlers
//!
//! Thin adapters from HTTP to [`BingoService`]; all rules live in the engine.

use super::{errors::ApiError, middleware::RequestId, models::*};
use crate::common::types::{PaletteNumber, UserId};
use crate::games::rooms::RoomView;
use crate::games::types::User;
use crate::services::BingoService;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;
use tracing::info;

/// Shared application state
pub struct AppState {
    pub service: Arc<BingoService>,
    pub version: String,
}

impl AppState {
    pub fn new(service: Arc<BingoService>) -> Self {
        Self {
            service,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: state.version.clone(),
        active_games: state.service.active_games().len(),
        rooms: state.service.list_rooms().len(),
        users: state.service.user_count(),
    })
}

/// GET /rooms
pub async fn list_rooms_handler(State(state): State<Arc<AppState>>) -> Json<RoomsResponse> {
    Json(RoomsResponse {
        rooms: state.service.list_rooms(),
    })
}

/// GET /rooms/:room_id
pub async fn room_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> ApiResult<RoomView> {
    state
        .service
        .get_room(&room_id)
        .map(Json)
        .map_err(|e| ApiError::from_bingo(request_id.0, e))
}

/// POST /rooms/:room_id/join
pub async fn join_room_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Json(body): Json<RoomActionRequest>,
) -> ApiResult<JoinResponse> {
    let outcome = state
        .service
        .join_room(&room_id, body.user_id)
        .map_err(|e| ApiError::from_bingo(request_id.0, e))?;

    Ok(Json(JoinResponse {
        room: outcome.room,
        game: outcome.game.map(GameStateResponse::from),
    }))
}

/// POST /rooms/:room_id/leave
pub async fn leave_room_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Json(body): Json<RoomActionRequest>,
) -> ApiResult<LeaveResponse> {
    let left = state
        .service
        .leave_room(&room_id, body.user_id)
        .map_err(|e| ApiError::from_bingo(request_id.0, e))?;

    Ok(Json(LeaveResponse {
        room_id,
        user_id: body.user_id,
        left,
    }))
}

/// POST /rooms/:room_id/start
pub async fn start_game_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<(StatusCode, Json<GameStateResponse>), ApiError> {
    let game = state
        .service
        .start_game(&room_id)
        .map_err(|e| ApiError::from_bingo(request_id.0.clone(), e))?;

    info!(request_id = %request_id.0, room_id = %room_id, game_id = %game.id, "Game started on request");
    Ok((StatusCode::CREATED, Json(game.into())))
}

/// GET /games
pub async fn active_games_handler(State(state): State<Arc<AppState>>) -> Json<ActiveGamesResponse> {
    Json(ActiveGamesResponse {
        games: state
            .service
            .active_games()
            .into_iter()
            .map(GameStateResponse::from)
            .collect(),
        cache: state.service.cache().stats(),
    })
}

/// GET /games/:game_id
pub async fn game_state_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<String>,
) -> ApiResult<GameStateResponse> {
    state
        .service
        .get_game_state(&game_id)
        .map(|game| Json(game.into()))
        .map_err(|e| ApiError::from_bingo(request_id.0, e))
}

/// POST /games/:game_id/draw
pub async fn draw_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<String>,
) -> ApiResult<DrawResponse> {
    let outcome = state
        .service
        .draw_next(&game_id)
        .map_err(|e| ApiError::from_bingo(request_id.0, e))?;

    Ok(Json(DrawResponse::new(game_id, outcome)))
}

/// POST /games/:game_id/claim
pub async fn claim_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<String>,
    Json(body): Json<ClaimRequest>,
) -> ApiResult<ClaimResponse> {
    let outcome = state
        .service
        .claim_win(&game_id, body.user_id, body.palette_number)
        .map_err(|e| ApiError::from_bingo(request_id.0, e))?;

    Ok(Json(ClaimResponse::new(game_id, outcome)))
}

/// POST /games/:game_id/cancel
pub async fn cancel_game_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<String>,
) -> ApiResult<GameStateResponse> {
    let game = state
        .service
        .cancel_game(&game_id)
        .map_err(|e| ApiError::from_bingo(request_id.0.clone(), e))?;

    info!(request_id = %request_id.0, game_id = %game.id, "Game cancelled on request");
    Ok(Json(game.into()))
}

/// POST /users
pub async fn register_user_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state
        .service
        .register_user(body.user_id, body.username, body.initial_balance)
        .map_err(|e| ApiError::from_bingo(request_id.0, e))?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /users/:user_id
pub async fn user_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> ApiResult<User> {
    state
        .service
        .user(user_id)
        .map(Json)
        .map_err(|e| ApiError::from_bingo(request_id.0, e))
}

/// GET /users/:user_id/transactions?game_id=..
pub async fn history_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<HistoryResponse> {
    let transactions = state
        .service
        .history(user_id, query.game_id.as_deref())
        .map_err(|e| ApiError::from_bingo(request_id.0, e))?;

    Ok(Json(HistoryResponse { user_id, transactions }))
}

/// POST /users/:user_id/deposit
pub async fn deposit_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
    Json(body): Json<AmountRequest>,
) -> ApiResult<User> {
    state
        .service
        .deposit(user_id, body.amount)
        .map(Json)
        .map_err(|e| ApiError::from_bingo(request_id.0, e))
}

/// POST /users/:user_id/withdraw
pub async fn withdraw_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
    Json(body): Json<AmountRequest>,
) -> ApiResult<User> {
    state
        .service
        .withdraw(user_id, body.amount)
        .map(Json)
        .map_err(|e| ApiError::from_bingo(request_id.0, e))
}

/// GET /cards/:palette
pub async fn card_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(palette): Path<PaletteNumber>,
) -> ApiResult<CardResponse> {
    state
        .service
        .card(palette)
        .map(|card| Json(card.into()))
        .map_err(|e| ApiError::from_bingo(request_id.0, e))
}
