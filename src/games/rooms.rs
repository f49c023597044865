//! Room registry: stake tiers, their waiting lobbies and formation phase.
//!
//! A room cycles through `Open -> Forming -> InGame -> Open`. Only one
//! formation runs per room at a time. While a game is running the lobby keeps
//! filling up for the next cycle.

use crate::common::traits::{Clock, DocumentStore};
use crate::common::types::{Amount, GameId, RoomId, UserId};
use crate::config::RoomSeed;
use crate::errors::{BingoResult, RoomError};
use crate::game_store;
use crate::games::types::Room;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "game_id", rename_all = "snake_case")]
pub enum RoomPhase {
    Open,
    Forming,
    InGame(GameId),
}

/// Room record together with its current phase
#[derive(Debug, Clone, Serialize)]
pub struct RoomView {
    #[serde(flatten)]
    pub room: Room,
    pub phase: RoomPhase,
}

#[derive(Debug, Clone)]
pub struct JoinReceipt {
    pub room: Room,
    /// Lobby is open and holds at least the minimum number of players
    pub threshold_reached: bool,
}

/// Occupants snapshotted when a formation begins
#[derive(Debug, Clone)]
pub struct FormationTicket {
    pub room_id: RoomId,
    pub stake_amount: Amount,
    pub occupants: Vec<UserId>,
}

struct RoomEntry {
    room: Room,
    phase: RoomPhase,
}

impl RoomEntry {
    fn view(&self) -> RoomView {
        RoomView {
            room: self.room.clone(),
            phase: self.phase.clone(),
        }
    }
}

/// Rooms are locked one at a time; the map guard is never held across a
/// store write.
pub struct RoomRegistry {
    rooms: DashMap<RoomId, Arc<Mutex<RoomEntry>>>,
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl RoomRegistry {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            rooms: DashMap::new(),
            store,
            clock,
        }
    }

    pub fn create_room(&self, seed: &RoomSeed) -> BingoResult<Room> {
        if seed.id.trim().is_empty() {
            return Err(RoomError::InvalidRoom("room id is empty".to_string()).into());
        }
        if seed.stake_amount <= 0 {
            return Err(RoomError::InvalidRoom(format!(
                "room {} has non-positive stake {}",
                seed.id, seed.stake_amount
            ))
            .into());
        }
        if seed.max_players < 2 {
            return Err(RoomError::InvalidRoom(format!(
                "room {} must seat at least two players",
                seed.id
            ))
            .into());
        }
        if seed.stake_amount.checked_mul(seed.max_players as Amount).is_none() {
            return Err(RoomError::InvalidRoom(format!(
                "room {} pot of {} x {} overflows",
                seed.id, seed.stake_amount, seed.max_players
            ))
            .into());
        }

        match self.rooms.entry(seed.id.clone()) {
            Entry::Occupied(_) => Err(RoomError::RoomExists(seed.id.clone()).into()),
            Entry::Vacant(slot) => {
                let now = self.clock.now();
                let room = Room {
                    id: seed.id.clone(),
                    name: seed.name.clone(),
                    stake_amount: seed.stake_amount,
                    max_players: seed.max_players,
                    current_player_ids: Vec::new(),
                    created_at: now,
                    updated_at: now,
                };
                // Room creation only runs at startup; the slot stays reserved
                // until the record is written.
                game_store::store_room(self.store.as_ref(), &room)?;
                slot.insert(Arc::new(Mutex::new(RoomEntry {
                    room: room.clone(),
                    phase: RoomPhase::Open,
                })));
                info!(room_id = %room.id, stake = room.stake_amount, max_players = room.max_players, "Room created");
                Ok(room)
            }
        }
    }

    /// Register a room loaded from the store
    pub fn insert_room(&self, room: Room) {
        self.rooms.insert(
            room.id.clone(),
            Arc::new(Mutex::new(RoomEntry {
                room,
                phase: RoomPhase::Open,
            })),
        );
    }

    fn cell(&self, room_id: &str) -> Result<Arc<Mutex<RoomEntry>>, RoomError> {
        self.rooms
            .get(room_id)
            .map(|cell| Arc::clone(cell.value()))
            .ok_or_else(|| RoomError::RoomNotFound(room_id.to_string()))
    }

    pub fn get(&self, room_id: &str) -> Result<Room, RoomError> {
        let cell = self.cell(room_id)?;
        let room = lock(&cell).room.clone();
        Ok(room)
    }

    pub fn view(&self, room_id: &str) -> Result<RoomView, RoomError> {
        let cell = self.cell(room_id)?;
        let view = lock(&cell).view();
        Ok(view)
    }

    /// All rooms ordered by stake, then id
    pub fn list(&self) -> Vec<RoomView> {
        let cells: Vec<Arc<Mutex<RoomEntry>>> = self.rooms.iter().map(|c| Arc::clone(c.value())).collect();
        let mut views: Vec<RoomView> = cells.iter().map(|cell| lock(cell).view()).collect();
        views.sort_by(|a, b| {
            a.room
                .stake_amount
                .cmp(&b.room.stake_amount)
                .then_with(|| a.room.id.cmp(&b.room.id))
        });
        views
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn active_game(&self, room_id: &str) -> Option<GameId> {
        let cell = self.cell(room_id).ok()?;
        let entry = lock(&cell);
        match &entry.phase {
            RoomPhase::InGame(game_id) => Some(game_id.clone()),
            _ => None,
        }
    }

    /// Open and holding enough players to form a game
    pub fn ready(&self, room_id: &str, min_players: usize) -> bool {
        match self.cell(room_id) {
            Ok(cell) => {
                let entry = lock(&cell);
                entry.phase == RoomPhase::Open && entry.room.occupancy() >= min_players
            }
            Err(_) => false,
        }
    }

    pub fn join_room(&self, room_id: &str, user_id: UserId, min_players: usize) -> BingoResult<JoinReceipt> {
        let cell = self.cell(room_id)?;
        let mut entry = lock(&cell);

        if entry.phase == RoomPhase::Forming {
            return Err(RoomError::FormationInProgress(room_id.to_string()).into());
        }
        if entry.room.has_player(user_id) {
            return Err(RoomError::AlreadyJoined {
                room_id: room_id.to_string(),
                user_id,
            }
            .into());
        }
        if entry.room.is_full() {
            return Err(RoomError::RoomFull {
                room_id: room_id.to_string(),
                max_players: entry.room.max_players,
            }
            .into());
        }

        let mut next = entry.room.clone();
        next.current_player_ids.push(user_id);
        next.updated_at = self.clock.now();
        game_store::store_room(self.store.as_ref(), &next)?;
        entry.room = next;

        let threshold_reached = entry.phase == RoomPhase::Open && entry.room.occupancy() >= min_players;
        debug!(room_id, user_id, occupancy = entry.room.occupancy(), threshold_reached, "Player joined room");
        Ok(JoinReceipt {
            room: entry.room.clone(),
            threshold_reached,
        })
    }

    /// Remove a player from the lobby. Returns false if they were not in it.
    pub fn leave_room(&self, room_id: &str, user_id: UserId) -> BingoResult<bool> {
        let cell = self.cell(room_id)?;
        let mut entry = lock(&cell);

        if !entry.room.has_player(user_id) {
            return Ok(false);
        }
        let mut next = entry.room.clone();
        next.current_player_ids.retain(|id| *id != user_id);
        next.updated_at = self.clock.now();
        game_store::store_room(self.store.as_ref(), &next)?;
        entry.room = next;
        debug!(room_id, user_id, "Player left room");
        Ok(true)
    }

    /// Snapshot the lobby and move the room into `Forming`
    pub fn begin_formation(&self, room_id: &str, min_players: usize) -> BingoResult<FormationTicket> {
        let cell = self.cell(room_id)?;
        let mut entry = lock(&cell);

        match &entry.phase {
            RoomPhase::Forming => return Err(RoomError::FormationInProgress(room_id.to_string()).into()),
            RoomPhase::InGame(game_id) => {
                return Err(RoomError::GameInProgress {
                    room_id: room_id.to_string(),
                    game_id: game_id.clone(),
                }
                .into())
            }
            RoomPhase::Open => {}
        }
        if entry.room.occupancy() < min_players {
            return Err(RoomError::NotEnoughPlayers {
                room_id: room_id.to_string(),
                waiting: entry.room.occupancy(),
                required: min_players,
            }
            .into());
        }

        entry.phase = RoomPhase::Forming;
        Ok(FormationTicket {
            room_id: room_id.to_string(),
            stake_amount: entry.room.stake_amount,
            occupants: entry.room.current_player_ids.clone(),
        })
    }

    /// Drop a player from the lobby after a failed stake collection
    pub fn exclude(&self, room_id: &str, user_id: UserId) -> BingoResult<()> {
        self.leave_room(room_id, user_id).map(|_| ())
    }

    /// Return a forming room to `Open` without starting a game
    pub fn abort_formation(&self, room_id: &str) {
        if let Ok(cell) = self.cell(room_id) {
            let mut entry = lock(&cell);
            if entry.phase == RoomPhase::Forming {
                entry.phase = RoomPhase::Open;
            }
        }
    }

    /// Move the paying players out of the lobby into the started game
    pub fn complete_formation(&self, room_id: &str, game_id: &str, paid: &[UserId]) -> BingoResult<Room> {
        let cell = self.cell(room_id)?;
        let mut entry = lock(&cell);

        entry.phase = RoomPhase::InGame(game_id.to_string());
        let mut next = entry.room.clone();
        next.current_player_ids.retain(|id| !paid.contains(id));
        next.updated_at = self.clock.now();
        game_store::store_room(self.store.as_ref(), &next)?;
        entry.room = next;
        Ok(entry.room.clone())
    }

    /// Mark a room as running a game restored from the store
    pub fn mark_in_game(&self, room_id: &str, game_id: &str) -> Result<(), RoomError> {
        let cell = self.cell(room_id)?;
        let mut entry = lock(&cell);
        entry.phase = RoomPhase::InGame(game_id.to_string());
        Ok(())
    }

    /// Reopen a room once its game is over. Returns false if the room was
    /// not running `game_id`.
    pub fn release(&self, room_id: &str, game_id: &str) -> bool {
        let Ok(cell) = self.cell(room_id) else {
            return false;
        };
        let mut entry = lock(&cell);
        if entry.phase == RoomPhase::InGame(game_id.to_string()) {
            entry.phase = RoomPhase::Open;
            true
        } else {
            false
        }
    }
}

fn lock(cell: &Mutex<RoomEntry>) -> MutexGuard<'_, RoomEntry> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::traits::SystemClock;
    use crate::errors::{BingoError, ErrorKind};
    use crate::storage::MemoryStore;
    use std::thread;

    fn seed(id: &str, stake: Amount, max_players: usize) -> RoomSeed {
        RoomSeed {
            id: id.to_string(),
            name: id.to_uppercase(),
            stake_amount: stake,
            max_players,
        }
    }

    fn registry() -> RoomRegistry {
        let registry = RoomRegistry::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock));
        registry.create_room(&seed("gold", 100, 4)).unwrap();
        registry
    }

    #[test]
    fn test_create_room_validation() {
        let registry = registry();
        assert!(matches!(
            registry.create_room(&seed("gold", 100, 4)),
            Err(BingoError::Room(RoomError::RoomExists(_)))
        ));
        assert!(registry.create_room(&seed("free", 0, 4)).is_err());
        assert!(registry.create_room(&seed("solo", 10, 1)).is_err());
    }

    #[test]
    fn test_concurrent_joins_respect_capacity() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(RoomRegistry::new(store.clone(), Arc::new(SystemClock)));
        registry.create_room(&seed("gold", 100, 4)).unwrap();
        registry.create_room(&seed("silver", 50, 20)).unwrap();

        let handles: Vec<_> = (1..=16)
            .map(|user_id| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let room = if user_id % 2 == 0 { "gold" } else { "silver" };
                    (room, registry.join_room(room, user_id, 2).is_ok())
                })
            })
            .collect();
        let results: Vec<(&str, bool)> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let gold_joined = results.iter().filter(|(room, ok)| *room == "gold" && *ok).count();
        assert_eq!(gold_joined, 4);
        assert_eq!(registry.get("gold").unwrap().occupancy(), 4);
        assert_eq!(registry.get("silver").unwrap().occupancy(), 8);

        let stored = game_store::load_rooms(store.as_ref()).unwrap();
        let gold = stored.iter().find(|r| r.id == "gold").unwrap();
        assert_eq!(gold.current_player_ids.len(), 4);
    }

    #[test]
    fn test_pot_overflowing_stake_is_rejected() {
        let registry = registry();
        assert!(matches!(
            registry.create_room(&seed("whale", i64::MAX / 2, 4)),
            Err(BingoError::Room(RoomError::InvalidRoom(_)))
        ));
        assert!(registry.get("whale").is_err());
    }

    #[test]
    fn test_join_reports_threshold() {
        let registry = registry();
        let first = registry.join_room("gold", 1, 2).unwrap();
        assert!(!first.threshold_reached);
        let second = registry.join_room("gold", 2, 2).unwrap();
        assert!(second.threshold_reached);
        assert_eq!(second.room.current_player_ids, vec![1, 2]);
    }

    #[test]
    fn test_join_errors() {
        let registry = registry();
        for user in 1..=4 {
            registry.join_room("gold", user, 2).unwrap();
        }

        let err = registry.join_room("gold", 1, 2).unwrap_err();
        assert!(matches!(err, BingoError::Room(RoomError::AlreadyJoined { .. })));

        let err = registry.join_room("gold", 5, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);

        let err = registry.join_room("nowhere", 1, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_leave_is_noop_for_absent_player() {
        let registry = registry();
        registry.join_room("gold", 1, 2).unwrap();
        assert!(registry.leave_room("gold", 1).unwrap());
        assert!(!registry.leave_room("gold", 1).unwrap());
        assert_eq!(registry.get("gold").unwrap().occupancy(), 0);
    }

    #[test]
    fn test_formation_cycle() {
        let registry = registry();
        registry.join_room("gold", 1, 2).unwrap();
        registry.join_room("gold", 2, 2).unwrap();
        registry.join_room("gold", 3, 2).unwrap();

        let ticket = registry.begin_formation("gold", 2).unwrap();
        assert_eq!(ticket.occupants, vec![1, 2, 3]);
        assert_eq!(ticket.stake_amount, 100);

        // Lobby is frozen while forming
        let err = registry.join_room("gold", 4, 2).unwrap_err();
        assert!(matches!(err, BingoError::Room(RoomError::FormationInProgress(_))));
        assert!(registry.begin_formation("gold", 2).is_err());

        registry.exclude("gold", 3).unwrap();
        let room = registry.complete_formation("gold", "g-1", &[1, 2]).unwrap();
        assert!(room.current_player_ids.is_empty());
        assert_eq!(registry.active_game("gold"), Some("g-1".to_string()));

        // Lobby fills up again while the game runs
        registry.join_room("gold", 4, 2).unwrap();
        registry.join_room("gold", 5, 2).unwrap();
        assert!(!registry.ready("gold", 2));
        assert!(matches!(
            registry.begin_formation("gold", 2),
            Err(BingoError::Room(RoomError::GameInProgress { .. }))
        ));

        assert!(!registry.release("gold", "other"));
        assert!(registry.release("gold", "g-1"));
        assert!(registry.ready("gold", 2));
        assert_eq!(registry.view("gold").unwrap().phase, RoomPhase::Open);
    }

    #[test]
    fn test_formation_requires_minimum() {
        let registry = registry();
        registry.join_room("gold", 1, 2).unwrap();
        let err = registry.begin_formation("gold", 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(registry.view("gold").unwrap().phase, RoomPhase::Open);
    }

    #[test]
    fn test_abort_reopens_lobby() {
        let registry = registry();
        registry.join_room("gold", 1, 2).unwrap();
        registry.join_room("gold", 2, 2).unwrap();
        registry.begin_formation("gold", 2).unwrap();
        registry.abort_formation("gold");
        assert!(registry.join_room("gold", 3, 2).is_ok());
    }

    #[test]
    fn test_rooms_are_listed_by_stake() {
        let registry = registry();
        registry.create_room(&seed("bronze", 10, 20)).unwrap();
        let ids: Vec<_> = registry.list().into_iter().map(|v| v.room.id).collect();
        assert_eq!(ids, vec!["bronze".to_string(), "gold".to_string()]);
    }

    #[test]
    fn test_view_serializes_phase() {
        let registry = registry();
        registry.mark_in_game("gold", "g-9").unwrap();
        let json = serde_json::to_value(registry.view("gold").unwrap()).unwrap();
        assert_eq!(json["id"], "gold");
        assert_eq!(json["phase"]["phase"], "in_game");
        assert_eq!(json["phase"]["game_id"], "g-9");
    }
}
