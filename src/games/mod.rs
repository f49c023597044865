pub mod card_catalog;
pub mod directory;
pub mod ledger;
pub mod rooms;
pub mod session;
pub mod types;

pub use card_catalog::{CardCatalog, WinningLine};
pub use directory::{RecoveryReport, SessionDirectory};
pub use ledger::Ledger;
pub use rooms::{RoomPhase, RoomRegistry, RoomView};
pub use session::{ClaimOutcome, DrawOutcome, GameSession, Settlement};
pub use types::*;
