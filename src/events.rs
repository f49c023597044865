//! Outbound game events and the broadcast bus that carries them

use crate::common::types::{BallNumber, GameId, RoomId, UserId};
use crate::games::types::{GameOutcome, WinnerInfo};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    GameStarted {
        game_id: GameId,
        room_id: RoomId,
        player_ids: Vec<UserId>,
    },
    NumberDrawn {
        game_id: GameId,
        room_id: RoomId,
        number: BallNumber,
        draw_index: usize,
    },
    GameCompleted {
        game_id: GameId,
        room_id: RoomId,
        outcome: GameOutcome,
        winner: Option<WinnerInfo>,
    },
}

impl GameEvent {
    pub fn game_id(&self) -> &str {
        match self {
            GameEvent::GameStarted { game_id, .. }
            | GameEvent::NumberDrawn { game_id, .. }
            | GameEvent::GameCompleted { game_id, .. } => game_id,
        }
    }

    pub fn room_id(&self) -> &str {
        match self {
            GameEvent::GameStarted { room_id, .. }
            | GameEvent::NumberDrawn { room_id, .. }
            | GameEvent::GameCompleted { room_id, .. } => room_id,
        }
    }
}

/// Fan-out of game events to any number of subscribers.
///
/// Publishing never blocks; slow subscribers observe `Lagged` and skip ahead.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GameEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns the number of subscribers that received the event
    pub fn publish(&self, event: GameEvent) -> usize {
        trace!(game_id = event.game_id(), "Publishing game event");
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drawn(number: BallNumber) -> GameEvent {
        GameEvent::NumberDrawn {
            game_id: "g-1".to_string(),
            room_id: "gold".to_string(),
            number,
            draw_index: 1,
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        assert_eq!(bus.publish(drawn(7)), 2);
        assert_eq!(a.recv().await.unwrap(), drawn(7));
        assert_eq!(b.recv().await.unwrap(), drawn(7));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(drawn(7)), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_value(drawn(42)).unwrap();
        assert_eq!(json["type"], "number_drawn");
        assert_eq!(json["number"], 42);
        assert_eq!(json["room_id"], "gold");

        let completed = GameEvent::GameCompleted {
            game_id: "g-1".to_string(),
            room_id: "gold".to_string(),
            outcome: GameOutcome::PoolExhausted,
            winner: None,
        };
        let json = serde_json::to_value(&completed).unwrap();
        assert_eq!(json["type"], "game_completed");
        assert_eq!(json["outcome"], "pool_exhausted");
        assert!(json["winner"].is_null());
        assert_eq!(completed.game_id(), "g-1");
    }
}
