//! Database inspection binary
//!
//! Prints the rooms, games and users held in a RocksDB data directory.

use bingo_engine::game_store;
use bingo_engine::storage::RocksStore;
use bingo_engine::BingoResult;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "inspect_db")]
#[command(about = "Dump the bingo document store", long_about = None)]
struct Args {
    /// Database directory
    #[arg(default_value = "./DB/bingo_data")]
    db_path: String,

    /// Print full JSON records instead of summaries
    #[arg(long)]
    json: bool,
}

fn main() -> BingoResult<()> {
    let args = Args::parse();
    let store = RocksStore::open_default(&args.db_path)?;

    let rooms = game_store::load_rooms(&store)?;
    println!("Rooms ({})", rooms.len());
    for room in &rooms {
        println!(
            "  {:<12} stake {:>6}  {}/{} waiting",
            room.id,
            room.stake_amount,
            room.current_player_ids.len(),
            room.max_players
        );
    }

    let (games, corrupt) = game_store::load_games(&store)?;
    println!("Games ({})", games.len());
    for game in &games {
        if args.json {
            println!("{}", serde_json::to_string_pretty(game).unwrap_or_default());
            continue;
        }
        let winner = game
            .winner
            .as_ref()
            .map(|w| format!("user {} card {} (+{})", w.user_id, w.card_palette_number, w.payout))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} room {:<10} {:<9} players {} drawn {:>2} settled {} winner {}",
            game.id,
            game.room_id,
            game.status,
            game.players.len(),
            game.drawn_numbers.len(),
            game.settled,
            winner
        );
    }
    for (id, e) in &corrupt {
        println!("  {} CORRUPT: {}", id, e);
    }

    let users = game_store::load_users(&store)?;
    println!("Users ({})", users.len());
    for user in &users {
        if args.json {
            println!("{}", serde_json::to_string_pretty(user).unwrap_or_default());
            continue;
        }
        println!(
            "  {:>8} balance {:>8}  {} transactions  rooms {:?}",
            user.id,
            user.balance,
            user.transactions.len(),
            user.joined_room_ids
        );
    }

    Ok(())
}
