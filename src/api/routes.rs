//! Route Definitions

use super::{handlers::*, monitoring::metrics_handler, websocket::websocket_handler};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Rooms
        .route("/rooms", get(list_rooms_handler))
        .route("/rooms/:room_id", get(room_handler))
        .route("/rooms/:room_id/join", post(join_room_handler))
        .route("/rooms/:room_id/leave", post(leave_room_handler))
        .route("/rooms/:room_id/start", post(start_game_handler))
        // Games
        .route("/games", get(active_games_handler))
        .route("/games/:game_id", get(game_state_handler))
        .route("/games/:game_id/draw", post(draw_handler))
        .route("/games/:game_id/claim", post(claim_handler))
        .route("/games/:game_id/cancel", post(cancel_game_handler))
        // Users and balances
        .route("/users", post(register_user_handler))
        .route("/users/:user_id", get(user_handler))
        .route("/users/:user_id/transactions", get(history_handler))
        .route("/users/:user_id/deposit", post(deposit_handler))
        .route("/users/:user_id/withdraw", post(withdraw_handler))
        .route("/cards/:palette", get(card_handler))
        // Event stream
        .route("/ws", get(websocket_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
