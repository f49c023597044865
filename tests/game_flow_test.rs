//! End-to-end game flows through the service facade

use bingo_engine::common::config::ConfigBuilder;
use bingo_engine::config::{ExhaustedPoolPolicy, RoomSeed};
use bingo_engine::events::GameEvent;
use bingo_engine::games::types::{GameOutcome, GameStatus, LedgerReason};
use bingo_engine::games::CardCatalog;
use bingo_engine::{BingoService, ErrorKind, ServiceBuilder};
use std::sync::Arc;
use std::thread;

fn service_with(policy: ExhaustedPoolPolicy) -> BingoService {
    let config = ConfigBuilder::new()
        .memory_storage()
        .draw_seed(11)
        .scheduler(false, 1_000)
        .exhausted_pool_policy(policy)
        .rooms(vec![RoomSeed {
            id: "table-100".to_string(),
            name: "Hundred".to_string(),
            stake_amount: 100,
            max_players: 4,
        }])
        .build();
    ServiceBuilder::new().with_config(config).build().unwrap()
}

fn service() -> BingoService {
    service_with(ExhaustedPoolPolicy::Forfeit)
}

/// Register A and B with 500 each and let the second join start the game
fn start_two_player_game(service: &BingoService) -> String {
    service.register_user(1, Some("alice".into()), 500).unwrap();
    service.register_user(2, Some("bob".into()), 500).unwrap();
    assert!(service.join_room("table-100", 1).unwrap().game.is_none());
    service.join_room("table-100", 2).unwrap().game.unwrap().id
}

#[test]
fn test_claim_scenario_pays_winner_only() {
    let service = service();
    let game_id = start_two_player_game(&service);

    let game = service.get_game_state(&game_id).unwrap();
    assert_eq!(game.status, GameStatus::Ongoing);
    assert_eq!(game.players.len(), 2);
    assert!(game.players.iter().all(|p| p.card_palette_numbers.len() == 1));
    assert_eq!(game.available_numbers.len(), 75);
    assert_eq!(service.user(1).unwrap().balance, 400);
    assert_eq!(service.user(2).unwrap().balance, 400);

    let palette = game.player(1).unwrap().card_palette_numbers[0];
    let card = service.card(palette).unwrap();
    loop {
        let drawn = service.get_game_state(&game_id).unwrap().drawn_numbers;
        if CardCatalog::validate_claim(&card, &drawn) {
            break;
        }
        service.draw_next(&game_id).unwrap();
    }

    let outcome = service.claim_win(&game_id, 1, palette).unwrap();
    assert!(outcome.newly_completed);
    assert!(!outcome.lines.is_empty());
    assert_eq!(outcome.winner.user_id, 1);
    assert_eq!(outcome.winner.payout, 200);

    let done = service.get_game_state(&game_id).unwrap();
    assert_eq!(done.status, GameStatus::Completed);
    assert_eq!(done.outcome, Some(GameOutcome::Won));
    assert!(done.end_time.is_some());
    assert_eq!(service.user(1).unwrap().balance, 600);
    assert_eq!(service.user(2).unwrap().balance, 400);

    // Repeats return the recorded winner without another credit
    let repeat = service.claim_win(&game_id, 1, palette).unwrap();
    assert_eq!(repeat.winner, outcome.winner);
    assert!(!repeat.newly_completed);
    assert_eq!(service.user(1).unwrap().balance, 600);

    let wins = service
        .user(1)
        .unwrap()
        .transactions
        .iter()
        .filter(|t| t.reason == LedgerReason::Payout)
        .count();
    assert_eq!(wins, 1);
}

#[test]
fn test_exhausted_pool_without_claim() {
    let service = service();
    let game_id = start_two_player_game(&service);

    for index in 1..=75 {
        let outcome = service.draw_next(&game_id).unwrap();
        assert_eq!(outcome.draw_index, index);
    }
    let err = service.draw_next(&game_id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);

    let game = service.get_game_state(&game_id).unwrap();
    assert_eq!(game.status, GameStatus::Completed);
    assert!(game.winner.is_none());
    assert_eq!(game.drawn_numbers.len(), 75);
    let mut sorted = game.drawn_numbers.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted, (1..=75).collect::<Vec<u8>>());

    assert_eq!(service.user(1).unwrap().balance, 400);
    assert_eq!(service.user(2).unwrap().balance, 400);
    assert_eq!(
        service.claim_win(&game_id, 1, game.player(1).unwrap().card_palette_numbers[0])
            .unwrap_err()
            .kind(),
        ErrorKind::PreconditionFailed
    );
}

#[test]
fn test_exhausted_pool_refund_policy() {
    let service = service_with(ExhaustedPoolPolicy::Refund);
    let game_id = start_two_player_game(&service);
    for _ in 0..75 {
        service.draw_next(&game_id).unwrap();
    }
    assert!(service.draw_next(&game_id).is_err());
    assert_eq!(service.user(1).unwrap().balance, 500);
    assert_eq!(service.user(2).unwrap().balance, 500);
}

#[test]
fn test_cancel_refunds_and_blocks_play() {
    let service = service();
    let game_id = start_two_player_game(&service);
    service.draw_next(&game_id).unwrap();

    let cancelled = service.cancel_game(&game_id).unwrap();
    assert_eq!(cancelled.outcome, Some(GameOutcome::Cancelled));
    assert_eq!(service.user(1).unwrap().balance, 500);
    assert_eq!(service.user(2).unwrap().balance, 500);

    assert_eq!(service.draw_next(&game_id).unwrap_err().kind(), ErrorKind::PreconditionFailed);
    let palette = cancelled.player(2).unwrap().card_palette_numbers[0];
    assert_eq!(
        service.claim_win(&game_id, 2, palette).unwrap_err().kind(),
        ErrorKind::PreconditionFailed
    );
    assert_eq!(service.active_game_for_room("table-100"), None);
}

#[test]
fn test_concurrent_claims_single_winner() {
    let service = Arc::new(service());
    for user in 1..=4 {
        service.register_user(user, None, 500).unwrap();
    }
    for user in 1..=3 {
        service.join_room("table-100", user).unwrap();
    }
    // The lobby auto-started after the second join; the third waits
    let game_id = service.active_game_for_room("table-100").unwrap();
    let game = service.get_game_state(&game_id).unwrap();
    for _ in 0..75 {
        service.draw_next(&game_id).unwrap();
    }

    let handles: Vec<_> = game
        .players
        .iter()
        .map(|player| {
            let service = Arc::clone(&service);
            let game_id = game_id.clone();
            let user = player.user_id;
            let palette = player.card_palette_numbers[0];
            thread::spawn(move || service.claim_win(&game_id, user, palette))
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners: Vec<_> = results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .filter(|o| o.newly_completed)
        .collect();
    assert_eq!(winners.len(), 1);

    let total: i64 = (1..=2).map(|u| service.user(u).unwrap().balance).sum();
    assert_eq!(total, 1_000);
}

#[test]
fn test_failed_join_leaves_balance_untouched() {
    let service = service();
    service.register_user(1, None, 99).unwrap();
    assert_eq!(
        service.join_room("table-100", 1).unwrap_err().kind(),
        ErrorKind::InsufficientFunds
    );
    assert_eq!(service.user(1).unwrap().balance, 99);
    assert!(service.user(1).unwrap().transactions.len() <= 1);
}

#[tokio::test]
async fn test_events_follow_the_game() {
    let service = service();
    let mut events = service.subscribe();
    let game_id = start_two_player_game(&service);
    service.draw_next(&game_id).unwrap();
    service.cancel_game(&game_id).unwrap();

    match events.recv().await.unwrap() {
        GameEvent::GameStarted { game_id: id, player_ids, .. } => {
            assert_eq!(id, game_id);
            assert_eq!(player_ids, vec![1, 2]);
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(matches!(
        events.recv().await.unwrap(),
        GameEvent::NumberDrawn { draw_index: 1, .. }
    ));
    match events.recv().await.unwrap() {
        GameEvent::GameCompleted { outcome, winner, .. } => {
            assert_eq!(outcome, GameOutcome::Cancelled);
            assert!(winner.is_none());
        }
        other => panic!("unexpected event {:?}", other),
    }
}
