//! Append-only point ledger and the balances derived from it.
//!
//! Everything in here is pure: balances and levels are recomputed from the
//! transaction list on every query, never cached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{LevelTable, PointTransaction, UserId};
use crate::error::LoyaltyError;

/// All point transactions of all users, in append order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    transactions: Vec<PointTransaction>,
}

impl Ledger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing transaction list.
    #[must_use]
    pub fn from_transactions(transactions: Vec<PointTransaction>) -> Self {
        Self { transactions }
    }

    /// Appends a transaction and returns the user's new balance.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::BalanceOverflow`] if the user's balance or
    /// lifetime totals would leave the `i64` range. The ledger is left
    /// unchanged.
    pub fn append(&mut self, transaction: PointTransaction) -> Result<i64, LoyaltyError> {
        let totals = Totals::of(self.history_of(&transaction.user_id))
            .and_then(|totals| totals.add(&transaction))
            .ok_or_else(|| LoyaltyError::BalanceOverflow(transaction.user_id.clone()))?;
        self.transactions.push(transaction);
        Ok(totals.balance)
    }

    /// Returns every transaction in append order.
    #[must_use]
    pub fn transactions(&self) -> &[PointTransaction] {
        &self.transactions
    }

    /// Returns the number of transactions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Returns `true` if no transaction was ever recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Iterates the transactions of one user in append order.
    pub fn history_of<'a>(
        &'a self,
        user_id: &'a UserId,
    ) -> impl DoubleEndedIterator<Item = &'a PointTransaction> + 'a {
        self.transactions
            .iter()
            .filter(move |tx| &tx.user_id == user_id)
    }

    /// Exact signed sum of one user's transactions.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::BalanceOverflow`] if the stored history sums
    /// outside the `i64` range.
    pub fn balance_of(&self, user_id: &UserId) -> Result<i64, LoyaltyError> {
        self.history_of(user_id)
            .try_fold(0_i64, |acc, tx| acc.checked_add(tx.amount))
            .ok_or_else(|| LoyaltyError::BalanceOverflow(user_id.clone()))
    }

    /// Distinct users present in the ledger, sorted.
    #[must_use]
    pub fn user_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self
            .transactions
            .iter()
            .map(|tx| tx.user_id.clone())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Summarizes one user's history against a level table.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::BalanceOverflow`] if the history sums
    /// outside the `i64` range.
    pub fn record_for(
        &self,
        user_id: &UserId,
        levels: &LevelTable,
    ) -> Result<UserLoyaltyRecord, LoyaltyError> {
        UserLoyaltyRecord::summarize(user_id.clone(), self.history_of(user_id), levels)
    }
}

/// Running sums over one user's history.
#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    balance: i64,
    earned: i64,
    spent: i64,
}

impl Totals {
    fn of<'a>(mut history: impl Iterator<Item = &'a PointTransaction>) -> Option<Self> {
        history.try_fold(Self::default(), |acc, tx| acc.add(tx))
    }

    fn add(self, tx: &PointTransaction) -> Option<Self> {
        let balance = self.balance.checked_add(tx.amount)?;
        let (earned, spent) = if tx.amount >= 0 {
            (self.earned.checked_add(tx.amount)?, self.spent)
        } else {
            (self.earned, self.spent.checked_add(tx.amount.checked_neg()?)?)
        };
        Some(Self {
            balance,
            earned,
            spent,
        })
    }
}

/// A user's derived loyalty state.
///
/// Created lazily: a user without history gets a zero-balance record at
/// the lowest level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct UserLoyaltyRecord {
    /// The user.
    pub user_id: UserId,
    /// Signed sum of every transaction amount.
    pub available_points: i64,
    /// Sum of credits.
    pub total_earned: i64,
    /// Sum of debits, as a positive number.
    pub total_spent: i64,
    /// Number of transactions in the user's history.
    pub transaction_count: usize,
    /// Key of the level derived from `available_points`.
    pub current_level: String,
    /// Timestamp of the latest transaction.
    pub last_activity: Option<DateTime<Utc>>,
}

impl UserLoyaltyRecord {
    /// Folds a transaction history into a record.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::BalanceOverflow`] if any sum leaves the
    /// `i64` range.
    pub fn summarize<'a>(
        user_id: UserId,
        history: impl Iterator<Item = &'a PointTransaction>,
        levels: &LevelTable,
    ) -> Result<Self, LoyaltyError> {
        let mut totals = Totals::default();
        let mut transaction_count = 0_usize;
        let mut last_activity: Option<DateTime<Utc>> = None;

        for tx in history {
            totals = totals
                .add(tx)
                .ok_or_else(|| LoyaltyError::BalanceOverflow(user_id.clone()))?;
            transaction_count = transaction_count.saturating_add(1);
            last_activity = Some(last_activity.map_or(tx.timestamp, |t| t.max(tx.timestamp)));
        }

        Ok(Self {
            current_level: levels.level_for(totals.balance).key.clone(),
            user_id,
            available_points: totals.balance,
            total_earned: totals.earned,
            total_spent: totals.spent,
            transaction_count,
            last_activity,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn uid(raw: &str) -> UserId {
        let Ok(id) = UserId::new(raw) else {
            panic!("valid id");
        };
        id
    }

    fn push(ledger: &mut Ledger, tx: PointTransaction) -> i64 {
        let Ok(balance) = ledger.append(tx) else {
            panic!("append failed");
        };
        balance
    }

    #[test]
    fn balance_is_signed_sum_per_user() {
        let now = Utc::now();
        let mut ledger = Ledger::new();
        assert_eq!(push(&mut ledger, PointTransaction::credit(uid("a"), 250, "course", now)), 250);
        push(&mut ledger, PointTransaction::credit(uid("b"), 10, "course", now));
        assert_eq!(push(&mut ledger, PointTransaction::debit(uid("a"), 70, "redeem", now)), 180);

        assert_eq!(ledger.balance_of(&uid("a")).ok(), Some(180));
        assert_eq!(ledger.balance_of(&uid("b")).ok(), Some(10));
        assert_eq!(ledger.balance_of(&uid("nobody")).ok(), Some(0));
    }

    #[test]
    fn user_ids_are_distinct_and_sorted() {
        let now = Utc::now();
        let mut ledger = Ledger::new();
        for raw in ["zoe", "adam", "zoe", "adam", "mia"] {
            push(&mut ledger, PointTransaction::credit(uid(raw), 1, "x", now));
        }
        let ids: Vec<String> = ledger
            .user_ids()
            .into_iter()
            .map(|id| id.to_string())
            .collect();
        assert_eq!(ids, vec!["adam", "mia", "zoe"]);
    }

    #[test]
    fn record_tracks_earned_spent_and_level() {
        let now = Utc::now();
        let mut ledger = Ledger::new();
        push(&mut ledger, PointTransaction::credit(uid("a"), 400, "x", now));
        push(&mut ledger, PointTransaction::debit(uid("a"), 150, "y", now));

        let Ok(record) = ledger.record_for(&uid("a"), &LevelTable::default()) else {
            panic!("record failed");
        };
        assert_eq!(record.available_points, 250);
        assert_eq!(record.total_earned, 400);
        assert_eq!(record.total_spent, 150);
        assert_eq!(record.transaction_count, 2);
        assert_eq!(record.current_level, "bronze");
        assert_eq!(record.last_activity, Some(now));
    }

    #[test]
    fn unknown_user_gets_zero_record() {
        let Ok(record) = Ledger::new().record_for(&uid("ghost"), &LevelTable::default()) else {
            panic!("record failed");
        };
        assert_eq!(record.available_points, 0);
        assert_eq!(record.transaction_count, 0);
        assert_eq!(record.current_level, "bronze");
        assert!(record.last_activity.is_none());
    }

    #[test]
    fn credit_past_i64_range_is_rejected_and_not_recorded() {
        let now = Utc::now();
        let mut ledger = Ledger::new();
        push(&mut ledger, PointTransaction::credit(uid("a"), i64::MAX - 1, "x", now));

        let result = ledger.append(PointTransaction::credit(uid("a"), 2, "y", now));
        assert!(matches!(result, Err(LoyaltyError::BalanceOverflow(_))));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.balance_of(&uid("a")).ok(), Some(i64::MAX - 1));
    }

    #[test]
    fn lifetime_earned_overflow_is_rejected_even_when_balance_fits() {
        let now = Utc::now();
        let mut ledger = Ledger::new();
        push(&mut ledger, PointTransaction::credit(uid("a"), i64::MAX, "x", now));
        push(&mut ledger, PointTransaction::debit(uid("a"), i64::MAX, "y", now));

        let result = ledger.append(PointTransaction::credit(uid("a"), 1, "z", now));
        assert!(matches!(result, Err(LoyaltyError::BalanceOverflow(_))));
    }

    #[test]
    fn overflowing_stored_history_is_reported_not_clamped() {
        let now = Utc::now();
        let ledger = Ledger::from_transactions(vec![
            PointTransaction::credit(uid("a"), i64::MAX, "x", now),
            PointTransaction::credit(uid("a"), i64::MAX, "x", now),
        ]);
        assert!(matches!(
            ledger.balance_of(&uid("a")),
            Err(LoyaltyError::BalanceOverflow(_))
        ));
        assert!(ledger.record_for(&uid("a"), &LevelTable::default()).is_err());
    }

    #[test]
    fn stored_form_is_a_plain_list() {
        let mut ledger = Ledger::new();
        push(&mut ledger, PointTransaction::credit(uid("a"), 5, "x", Utc::now()));
        let json = serde_json::to_value(&ledger).unwrap_or_default();
        assert!(json.is_array());
        let back: Ledger = serde_json::from_value(json).unwrap_or_default();
        assert_eq!(back, ledger);
    }
}
