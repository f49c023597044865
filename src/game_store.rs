//! Typed persistence for rooms, games and users.
//!
//! Documents are JSON encoded and keyed by the entity's natural id.

use crate::{
    common::traits::{Collection, DocumentStore},
    common::types::UserId,
    errors::{BingoError, BingoResult, StorageError},
    games::types::{Game, Room, User},
};
use serde::{de::DeserializeOwned, Serialize};

fn encode<T: Serialize>(what: &str, id: &str, value: &T) -> BingoResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| {
        BingoError::Storage(StorageError::WriteFailed(format!(
            "Failed to encode {} {}: {}",
            what, id, e
        )))
    })
}

fn decode<T: DeserializeOwned>(what: &str, id: &str, bytes: &[u8]) -> BingoResult<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        BingoError::Storage(StorageError::CorruptedData(format!(
            "Failed to decode {} {}: {}",
            what, id, e
        )))
    })
}

fn load<T: DeserializeOwned>(store: &dyn DocumentStore, collection: Collection, what: &str, id: &str) -> BingoResult<Option<T>> {
    let Some(bytes) = store.get(collection, id)? else {
        return Ok(None);
    };
    decode(what, id, &bytes).map(Some)
}

/// Decode every document of a collection, keeping undecodable ones apart
fn load_all<T: DeserializeOwned>(store: &dyn DocumentStore, collection: Collection, what: &str) -> BingoResult<(Vec<T>, Vec<(String, BingoError)>)> {
    let mut decoded = Vec::new();
    let mut corrupt = Vec::new();
    for (id, bytes) in store.scan(collection)? {
        match decode(what, &id, &bytes) {
            Ok(value) => decoded.push(value),
            Err(e) => corrupt.push((id, e)),
        }
    }
    Ok((decoded, corrupt))
}

pub fn store_game(store: &dyn DocumentStore, game: &Game) -> BingoResult<()> {
    let bytes = encode("game", &game.id, game)?;
    store.put(Collection::Games, &game.id, &bytes)?;
    tracing::debug!(
        game_id = %game.id,
        status = %game.status,
        drawn = game.drawn_numbers.len(),
        "Stored game record"
    );
    Ok(())
}

pub fn load_game(store: &dyn DocumentStore, game_id: &str) -> BingoResult<Option<Game>> {
    load(store, Collection::Games, "game", game_id)
}

pub fn delete_game(store: &dyn DocumentStore, game_id: &str) -> BingoResult<()> {
    store.delete(Collection::Games, game_id)
}

/// All game records plus the ids of records that failed to decode
pub fn load_games(store: &dyn DocumentStore) -> BingoResult<(Vec<Game>, Vec<(String, BingoError)>)> {
    load_all(store, Collection::Games, "game")
}

pub fn store_room(store: &dyn DocumentStore, room: &Room) -> BingoResult<()> {
    let bytes = encode("room", &room.id, room)?;
    store.put(Collection::Rooms, &room.id, &bytes)
}

pub fn load_rooms(store: &dyn DocumentStore) -> BingoResult<Vec<Room>> {
    let (rooms, corrupt) = load_all(store, Collection::Rooms, "room")?;
    if let Some((_, e)) = corrupt.into_iter().next() {
        return Err(e);
    }
    Ok(rooms)
}

pub fn store_user(store: &dyn DocumentStore, user: &User) -> BingoResult<()> {
    let id = user.id.to_string();
    let bytes = encode("user", &id, user)?;
    store.put(Collection::Users, &id, &bytes)
}

pub fn load_user(store: &dyn DocumentStore, user_id: UserId) -> BingoResult<Option<User>> {
    load(store, Collection::Users, "user", &user_id.to_string())
}

pub fn load_users(store: &dyn DocumentStore) -> BingoResult<Vec<User>> {
    let (users, corrupt) = load_all(store, Collection::Users, "user")?;
    if let Some((_, e)) = corrupt.into_iter().next() {
        return Err(e);
    }
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::GameStatus;
    use crate::storage::MemoryStore;
    use chrono::Utc;

    fn sample_game(id: &str) -> Game {
        let now = Utc::now();
        Game {
            id: id.to_string(),
            room_id: "gold".to_string(),
            stake_amount: 100,
            pool_size: 75,
            available_numbers: (1..=75).collect(),
            drawn_numbers: vec![],
            status: GameStatus::Waiting,
            outcome: None,
            players: vec![],
            winner: None,
            start_time: None,
            end_time: None,
            settled: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_game_records() {
        let store = MemoryStore::new();
        let game = sample_game("g-1");
        store_game(&store, &game).unwrap();

        assert_eq!(load_game(&store, "g-1").unwrap(), Some(game));
        assert_eq!(load_game(&store, "missing").unwrap(), None);

        delete_game(&store, "g-1").unwrap();
        assert_eq!(load_game(&store, "g-1").unwrap(), None);
    }

    #[test]
    fn test_corrupt_game_is_reported_not_fatal() {
        let store = MemoryStore::new();
        store_game(&store, &sample_game("good")).unwrap();
        store.put(Collection::Games, "bad", b"{not json").unwrap();

        let (games, corrupt) = load_games(&store).unwrap();
        assert_eq!(games.len(), 1);
        assert_eq!(corrupt.len(), 1);
        assert_eq!(corrupt[0].0, "bad");
        assert!(matches!(
            corrupt[0].1,
            BingoError::Storage(StorageError::CorruptedData(_))
        ));

        assert!(load_game(&store, "bad").is_err());
    }

    #[test]
    fn test_corrupt_user_fails_load() {
        let store = MemoryStore::new();
        store.put(Collection::Users, "9", b"[]").unwrap();
        assert!(load_users(&store).is_err());
    }
}
