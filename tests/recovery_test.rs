//! Games, balances and rooms survive a restart on the RocksDB store

use bingo_engine::common::config::ConfigBuilder;
use bingo_engine::config::{BingoConfig, RoomSeed};
use bingo_engine::games::types::GameStatus;
use bingo_engine::games::CardCatalog;
use bingo_engine::{BingoService, ServiceBuilder};
use tempfile::TempDir;

fn config_for(dir: &TempDir) -> BingoConfig {
    ConfigBuilder::new()
        .data_directory(dir.path().to_string_lossy())
        .draw_seed(3)
        .scheduler(false, 1_000)
        .rooms(vec![RoomSeed {
            id: "gold".to_string(),
            name: "Gold".to_string(),
            stake_amount: 100,
            max_players: 4,
        }])
        .build()
}

fn open(dir: &TempDir) -> BingoService {
    ServiceBuilder::new().with_config(config_for(dir)).build().unwrap()
}

#[test]
fn test_ongoing_game_resumes_after_restart() {
    let dir = TempDir::new().unwrap();

    let (game_id, drawn_before) = {
        let service = open(&dir);
        service.register_user(1, None, 500).unwrap();
        service.register_user(2, None, 500).unwrap();
        service.join_room("gold", 1).unwrap();
        let game = service.join_room("gold", 2).unwrap().game.unwrap();
        for _ in 0..5 {
            service.draw_next(&game.id).unwrap();
        }
        let drawn = service.get_game_state(&game.id).unwrap().drawn_numbers;
        assert_eq!(service.drain().unwrap(), 1);
        (game.id, drawn)
    };

    let service = open(&dir);
    assert_eq!(service.user(1).unwrap().balance, 400);
    assert_eq!(service.user_count(), 2);

    let report = service.recover().unwrap();
    assert_eq!(report.restored, vec![game_id.clone()]);
    assert!(report.corrupt.is_empty());
    assert_eq!(service.active_game_for_room("gold"), Some(game_id.clone()));

    let restored = service.get_game_state(&game_id).unwrap();
    assert_eq!(restored.status, GameStatus::Ongoing);
    assert_eq!(restored.drawn_numbers, drawn_before);
    assert_eq!(restored.available_numbers.len(), 70);

    let next = service.draw_next(&game_id).unwrap();
    assert_eq!(next.draw_index, 6);
    assert!(!drawn_before.contains(&next.number));

    // A second joiner must wait for the lobby; the room is busy
    service.register_user(3, None, 500).unwrap();
    service.join_room("gold", 3).unwrap();
    assert_eq!(service.active_game_for_room("gold"), Some(game_id));
}

#[test]
fn test_completed_game_is_not_paid_twice_after_restart() {
    let dir = TempDir::new().unwrap();

    let (game_id, palette) = {
        let service = open(&dir);
        service.register_user(1, None, 500).unwrap();
        service.register_user(2, None, 500).unwrap();
        service.join_room("gold", 1).unwrap();
        let game = service.join_room("gold", 2).unwrap().game.unwrap();
        let palette = game.player(1).unwrap().card_palette_numbers[0];
        let card = service.card(palette).unwrap();
        while !CardCatalog::validate_claim(&card, &service.get_game_state(&game.id).unwrap().drawn_numbers) {
            service.draw_next(&game.id).unwrap();
        }
        service.claim_win(&game.id, 1, palette).unwrap();
        assert_eq!(service.user(1).unwrap().balance, 600);
        (game.id, palette)
    };

    let service = open(&dir);
    let report = service.recover().unwrap();
    assert!(report.restored.is_empty());
    assert!(report.resettled.is_empty());
    assert_eq!(service.user(1).unwrap().balance, 600);

    let repeat = service.claim_win(&game_id, 1, palette).unwrap();
    assert!(!repeat.newly_completed);
    assert_eq!(repeat.winner.payout, 200);
    assert_eq!(service.user(1).unwrap().balance, 600);

    // Recovery is idempotent
    service.recover().unwrap();
    assert_eq!(service.user(1).unwrap().balance, 600);
    assert_eq!(service.user(2).unwrap().balance, 400);
}

#[test]
fn test_rooms_persist_lobby_membership() {
    let dir = TempDir::new().unwrap();
    {
        let service = open(&dir);
        service.register_user(7, None, 500).unwrap();
        service.join_room("gold", 7).unwrap();
    }

    let service = open(&dir);
    let room = service.get_room("gold").unwrap();
    assert_eq!(room.room.current_player_ids, vec![7]);
    assert_eq!(service.user(7).unwrap().joined_room_ids, vec!["gold".to_string()]);
}
