//! Ledger: balance-changing operations on user accounts.
//!
//! Each user sits behind its own mutex, so mutations of one account are
//! serialized while different accounts proceed in parallel. A mutation is
//! written to the store before it becomes visible in memory; if the write
//! fails the account is left exactly as it was.
//!
//! Entries tied to a game get a deterministic id (`<game>:<reason>:<user>`).
//! Applying the same game entry twice is a no-op that returns the recorded
//! transaction, which makes settlement safe to replay after a crash.

use crate::common::traits::{Clock, DocumentStore};
use crate::common::types::{new_transaction_id, Amount, RoomId, UserId};
use crate::errors::{BingoResult, LedgerError};
use crate::game_store;
use crate::games::types::{LedgerReason, Transaction, User};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

pub struct Ledger {
    users: DashMap<UserId, Arc<Mutex<User>>>,
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl Ledger {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            users: DashMap::new(),
            store,
            clock,
        }
    }

    /// Load every persisted account into memory
    pub fn load(&self) -> BingoResult<usize> {
        let users = game_store::load_users(self.store.as_ref())?;
        let count = users.len();
        for user in users {
            self.users.insert(user.id, Arc::new(Mutex::new(user)));
        }
        info!(users = count, "Ledger loaded");
        Ok(count)
    }

    pub fn register_user(
        &self,
        user_id: UserId,
        username: Option<String>,
        initial_balance: Amount,
    ) -> BingoResult<User> {
        if initial_balance < 0 {
            return Err(LedgerError::InvalidAmount(initial_balance).into());
        }

        match self.users.entry(user_id) {
            Entry::Occupied(_) => Err(LedgerError::UserExists(user_id).into()),
            Entry::Vacant(slot) => {
                let now = self.clock.now();
                let mut user = User {
                    id: user_id,
                    username,
                    balance: 0,
                    transactions: Vec::new(),
                    joined_room_ids: Vec::new(),
                    registration_date: now,
                    last_active_at: now,
                    created_at: now,
                    updated_at: now,
                };
                if initial_balance > 0 {
                    user.balance = initial_balance;
                    user.transactions.push(Transaction {
                        id: new_transaction_id(),
                        kind: LedgerReason::Deposit.transaction_type(),
                        reason: LedgerReason::Deposit,
                        amount: initial_balance,
                        game_id: None,
                        timestamp: now,
                    });
                }
                game_store::store_user(self.store.as_ref(), &user)?;
                slot.insert(Arc::new(Mutex::new(user.clone())));
                info!(user_id, balance = initial_balance, "User registered");
                Ok(user)
            }
        }
    }

    fn account(&self, user_id: UserId) -> Result<Arc<Mutex<User>>, LedgerError> {
        self.users
            .get(&user_id)
            .map(|cell| Arc::clone(cell.value()))
            .ok_or(LedgerError::UserNotFound(user_id))
    }

    pub fn user(&self, user_id: UserId) -> Result<User, LedgerError> {
        let account = self.account(user_id)?;
        let user = account.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(user.clone())
    }

    pub fn balance(&self, user_id: UserId) -> Result<Amount, LedgerError> {
        let account = self.account(user_id)?;
        let user = account.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(user.balance)
    }

    /// Transactions, oldest first, optionally narrowed to one game
    pub fn history(&self, user_id: UserId, game_id: Option<&str>) -> Result<Vec<Transaction>, LedgerError> {
        let account = self.account(user_id)?;
        let user = account.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(user
            .transactions
            .iter()
            .filter(|t| game_id.map_or(true, |id| t.game_id.as_deref() == Some(id)))
            .cloned()
            .collect())
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.users.contains_key(&user_id)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn deposit(&self, user_id: UserId, amount: Amount) -> BingoResult<Transaction> {
        self.credit(user_id, amount, None, LedgerReason::Deposit)
    }

    pub fn withdraw(&self, user_id: UserId, amount: Amount) -> BingoResult<Transaction> {
        self.debit(user_id, amount, LedgerReason::Withdrawal, None)
    }

    /// Take `amount` from the user. Fails with `InsufficientFunds` without
    /// touching the account when the balance does not cover it.
    pub fn debit(
        &self,
        user_id: UserId,
        amount: Amount,
        reason: LedgerReason,
        game_id: Option<&str>,
    ) -> BingoResult<Transaction> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount).into());
        }
        self.apply(user_id, -amount, reason, game_id)
    }

    /// Add `amount` to the user. No upper bound is enforced.
    pub fn credit(
        &self,
        user_id: UserId,
        amount: Amount,
        game_id: Option<&str>,
        reason: LedgerReason,
    ) -> BingoResult<Transaction> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount).into());
        }
        self.apply(user_id, amount, reason, game_id)
    }

    fn apply(
        &self,
        user_id: UserId,
        delta: Amount,
        reason: LedgerReason,
        game_id: Option<&str>,
    ) -> BingoResult<Transaction> {
        let account = self.account(user_id)?;
        let mut user = account.lock().unwrap_or_else(PoisonError::into_inner);

        let entry_id = match game_id {
            Some(game_id) => game_entry_id(game_id, reason, user_id),
            None => new_transaction_id(),
        };
        if game_id.is_some() {
            if let Some(existing) = user.transactions.iter().find(|t| t.id == entry_id) {
                debug!(user_id, entry_id = %entry_id, "Ledger entry already applied");
                return Ok(existing.clone());
            }
        }

        let balance = user
            .balance
            .checked_add(delta)
            .ok_or(LedgerError::AmountOverflow {
                user_id,
                balance: user.balance,
                amount: delta,
            })?;
        if balance < 0 {
            return Err(LedgerError::InsufficientFunds {
                user_id,
                balance: user.balance,
                required: -delta,
            }
            .into());
        }

        let now = self.clock.now();
        let transaction = Transaction {
            id: entry_id,
            kind: reason.transaction_type(),
            reason,
            amount: delta,
            game_id: game_id.map(str::to_string),
            timestamp: now,
        };

        let mut next = user.clone();
        next.balance = balance;
        next.transactions.push(transaction.clone());
        next.updated_at = now;
        next.last_active_at = now;
        game_store::store_user(self.store.as_ref(), &next)?;
        *user = next;

        debug!(
            user_id,
            amount = delta,
            reason = reason.as_str(),
            balance = user.balance,
            "Ledger entry applied"
        );
        Ok(transaction)
    }

    /// Stakes collected for a game that have not been refunded yet
    pub fn outstanding_stakes(&self, game_id: &str) -> Vec<(UserId, Amount)> {
        let accounts: Vec<Arc<Mutex<User>>> = self.users.iter().map(|r| Arc::clone(r.value())).collect();
        let mut stakes = Vec::new();
        for account in accounts {
            let user = account.lock().unwrap_or_else(PoisonError::into_inner);
            let stake = user.transactions.iter().find(|t| {
                t.reason == LedgerReason::StakeCollected && t.game_id.as_deref() == Some(game_id)
            });
            if let Some(stake) = stake {
                let refunded = user.has_transaction(&game_entry_id(game_id, LedgerReason::StakeRefunded, user.id));
                if !refunded {
                    stakes.push((user.id, -stake.amount));
                }
            }
        }
        stakes.sort_unstable();
        stakes
    }

    /// Record lobby membership on the account
    pub fn record_room_membership(&self, user_id: UserId, room_id: &RoomId, joined: bool) -> BingoResult<()> {
        let account = self.account(user_id)?;
        let mut user = account.lock().unwrap_or_else(PoisonError::into_inner);

        let mut next = user.clone();
        if joined {
            if !next.joined_room_ids.contains(room_id) {
                next.joined_room_ids.push(room_id.clone());
            }
        } else {
            next.joined_room_ids.retain(|r| r != room_id);
        }
        if next.joined_room_ids == user.joined_room_ids {
            return Ok(());
        }
        let now = self.clock.now();
        next.updated_at = now;
        next.last_active_at = now;
        game_store::store_user(self.store.as_ref(), &next)?;
        *user = next;
        Ok(())
    }
}

pub fn game_entry_id(game_id: &str, reason: LedgerReason, user_id: UserId) -> String {
    format!("{}:{}:{}", game_id, reason.as_str(), user_id)
}
