//! Loyalty service: point ledger mutations, balance and level queries.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use utoipa::ToSchema;

use crate::domain::{
    Clock, EventBus, LevelDefinition, LevelProgress, LevelTable, LoyaltyEvent, PointTransaction,
    UserId, UserLoyaltyRecord,
};
use crate::error::LoyaltyError;
use crate::persistence::LedgerRepository;

/// Whether debits may drive a balance below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NegativeBalancePolicy {
    /// Debits are unconditional.
    #[default]
    Allow,
    /// Debits that would end below zero fail with
    /// [`LoyaltyError::InsufficientPoints`].
    Reject,
}

/// Point award constants and the balance floor policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointsPolicy {
    /// Award for completing a standard course.
    pub course_completion_points: i64,
    /// Award for completing a premium course.
    pub premium_course_points: i64,
    /// Balance floor policy.
    pub negative_balance: NegativeBalancePolicy,
}

impl Default for PointsPolicy {
    fn default() -> Self {
        Self {
            course_completion_points: 100,
            premium_course_points: 200,
            negative_balance: NegativeBalancePolicy::Allow,
        }
    }
}

/// Result of a successful credit or debit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PointsUpdate {
    /// Always `true`; failures are reported as [`LoyaltyError`].
    pub success: bool,
    /// The appended transaction.
    pub transaction: PointTransaction,
    /// Balance after the transaction.
    pub new_balance: i64,
    /// Level key after the transaction.
    pub level: String,
    /// Whether the transaction moved the user to another level.
    pub level_changed: bool,
}

/// Single source of truth for point balances and levels.
///
/// Every mutation follows the pattern: validate → lock → load ledger →
/// append → save → emit events. The ledger is re-read from the store on
/// every call, so other writers to the same store are picked up (the last
/// write wins).
#[derive(Debug)]
pub struct LoyaltyService {
    ledger: LedgerRepository,
    levels: LevelTable,
    policy: PointsPolicy,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    write_lock: Mutex<()>,
}

impl LoyaltyService {
    /// Creates a new `LoyaltyService`.
    #[must_use]
    pub fn new(
        ledger: LedgerRepository,
        levels: LevelTable,
        policy: PointsPolicy,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            ledger,
            levels,
            policy,
            clock,
            event_bus,
            write_lock: Mutex::new(()),
        }
    }

    /// Returns a reference to the inner [`EventBus`].
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Returns the active level table.
    #[must_use]
    pub fn level_table(&self) -> &LevelTable {
        &self.levels
    }

    /// Returns the active award policy.
    #[must_use]
    pub fn policy(&self) -> &PointsPolicy {
        &self.policy
    }

    /// Credits `amount` points to `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::InvalidAmount`] if `amount <= 0` (nothing is
    /// read or written), [`LoyaltyError::BalanceOverflow`] if the balance
    /// would leave the `i64` range, or [`LoyaltyError::PersistenceFailure`]
    /// if the store fails.
    pub async fn add_points(
        &self,
        user_id: &UserId,
        amount: i64,
        reason: &str,
    ) -> Result<PointsUpdate, LoyaltyError> {
        if amount <= 0 {
            return Err(LoyaltyError::InvalidAmount(amount));
        }
        let tx = PointTransaction::credit(user_id.clone(), amount, reason, self.clock.now());
        self.append(tx).await
    }

    /// Debits `amount` points from `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::InvalidAmount`] if `amount <= 0`,
    /// [`LoyaltyError::InsufficientPoints`] if the policy rejects negative
    /// balances and the debit exceeds the balance,
    /// [`LoyaltyError::BalanceOverflow`] if the totals would leave the `i64`
    /// range, or [`LoyaltyError::PersistenceFailure`] if the store fails.
    pub async fn remove_points(
        &self,
        user_id: &UserId,
        amount: i64,
        reason: &str,
    ) -> Result<PointsUpdate, LoyaltyError> {
        if amount <= 0 {
            return Err(LoyaltyError::InvalidAmount(amount));
        }
        let tx = PointTransaction::debit(user_id.clone(), amount, reason, self.clock.now());
        self.append(tx).await
    }

    /// Awards the course completion bonus.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::InvalidRequest`] if `course_id` is blank,
    /// [`LoyaltyError::InvalidAmount`] if the configured award is not
    /// positive, [`LoyaltyError::BalanceOverflow`] if the balance would
    /// leave the `i64` range, or [`LoyaltyError::PersistenceFailure`] if the
    /// store fails.
    pub async fn add_points_for_course_completion(
        &self,
        course_id: &str,
        course_title: &str,
        is_premium_course: bool,
        user_id: &UserId,
    ) -> Result<PointsUpdate, LoyaltyError> {
        let course_id = course_id.trim();
        if course_id.is_empty() {
            return Err(LoyaltyError::InvalidRequest(
                "course id must not be empty".to_string(),
            ));
        }
        let (amount, reason) = if is_premium_course {
            (
                self.policy.premium_course_points,
                format!("Completed premium course: {course_title}"),
            )
        } else {
            (
                self.policy.course_completion_points,
                format!("Completed course: {course_title}"),
            )
        };
        if amount <= 0 {
            return Err(LoyaltyError::InvalidAmount(amount));
        }
        let tx = PointTransaction::credit(user_id.clone(), amount, &reason, self.clock.now())
            .with_reference(course_id);
        self.append(tx).await
    }

    /// Recomputes a user's record from history. Users without history get
    /// a zero-balance record.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::PersistenceFailure`] if the store read fails, or
    /// [`LoyaltyError::BalanceOverflow`] if the stored history overflows.
    pub async fn get_user_points(
        &self,
        user_id: &UserId,
    ) -> Result<UserLoyaltyRecord, LoyaltyError> {
        let ledger = self.ledger.load().await?;
        ledger.record_for(user_id, &self.levels)
    }

    /// Returns the key of the user's current level.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::PersistenceFailure`] if the store read fails, or
    /// [`LoyaltyError::BalanceOverflow`] if the stored history overflows.
    pub async fn get_current_level(&self, user_id: &UserId) -> Result<String, LoyaltyError> {
        Ok(self.get_user_points(user_id).await?.current_level)
    }

    /// Returns the user's full level definition.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::PersistenceFailure`] if the store read fails, or
    /// [`LoyaltyError::BalanceOverflow`] if the stored history overflows.
    pub async fn get_level_info(&self, user_id: &UserId) -> Result<LevelDefinition, LoyaltyError> {
        let ledger = self.ledger.load().await?;
        Ok(self.levels.level_for(ledger.balance_of(user_id)?).clone())
    }

    /// Returns progress towards the next level.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::PersistenceFailure`] if the store read fails, or
    /// [`LoyaltyError::BalanceOverflow`] if the stored history overflows.
    pub async fn get_level_progress(&self, user_id: &UserId) -> Result<LevelProgress, LoyaltyError> {
        let ledger = self.ledger.load().await?;
        Ok(self.levels.progress(ledger.balance_of(user_id)?))
    }

    /// Returns the store discount the user's level grants, in percent.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::PersistenceFailure`] if the store read fails, or
    /// [`LoyaltyError::BalanceOverflow`] if the stored history overflows.
    pub async fn get_discount_percent(&self, user_id: &UserId) -> Result<u8, LoyaltyError> {
        Ok(self.get_level_info(user_id).await?.discount_percent)
    }

    /// Returns a user's transactions, newest first, at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::PersistenceFailure`] if the store read fails.
    pub async fn get_transaction_history(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<PointTransaction>, LoyaltyError> {
        let ledger = self.ledger.load().await?;
        Ok(ledger.history_of(user_id).rev().take(limit).cloned().collect())
    }

    /// Returns one record per distinct user in history, sorted by user id.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::PersistenceFailure`] if the store read fails, or
    /// [`LoyaltyError::BalanceOverflow`] if the stored history overflows.
    pub async fn get_all_users_with_points(&self) -> Result<Vec<UserLoyaltyRecord>, LoyaltyError> {
        let ledger = self.ledger.load().await?;
        ledger
            .user_ids()
            .iter()
            .map(|id| ledger.record_for(id, &self.levels))
            .collect()
    }

    async fn append(&self, tx: PointTransaction) -> Result<PointsUpdate, LoyaltyError> {
        let guard = self.write_lock.lock().await;
        let mut ledger = self.ledger.load().await?;

        let before = ledger.balance_of(&tx.user_id)?;
        if tx.amount < 0
            && self.policy.negative_balance == NegativeBalancePolicy::Reject
            && before.checked_add(tx.amount).is_none_or(|after| after < 0)
        {
            return Err(LoyaltyError::InsufficientPoints {
                available: before,
                requested: tx.amount.saturating_neg(),
            });
        }

        let after = ledger.append(tx.clone())?;
        self.ledger.save(&ledger).await?;
        drop(guard);

        let old_level = self.levels.level_for(before).key.clone();
        let new_level = self.levels.level_for(after).key.clone();
        let level_changed = old_level != new_level;

        let points_event = if tx.is_credit() {
            LoyaltyEvent::PointsAdded {
                user_id: tx.user_id.clone(),
                amount: tx.amount,
                reason: tx.reason.clone(),
                new_balance: after,
                timestamp: tx.timestamp,
            }
        } else {
            LoyaltyEvent::PointsRemoved {
                user_id: tx.user_id.clone(),
                amount: tx.amount.saturating_neg(),
                reason: tx.reason.clone(),
                new_balance: after,
                timestamp: tx.timestamp,
            }
        };
        let level_event = level_changed.then(|| LoyaltyEvent::LevelChanged {
            user_id: tx.user_id.clone(),
            old_level: old_level.clone(),
            new_level: new_level.clone(),
            timestamp: tx.timestamp,
        });
        self.event_bus
            .publish_batch(std::iter::once(points_event).chain(level_event));
        if level_changed {
            tracing::info!(user_id = %tx.user_id, %old_level, %new_level, "level changed");
        }

        tracing::info!(
            user_id = %tx.user_id,
            amount = tx.amount,
            new_balance = after,
            reason = %tx.reason,
            "points transaction recorded"
        );

        Ok(PointsUpdate {
            success: true,
            transaction: tx,
            new_balance: after,
            level: new_level,
            level_changed,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::ManualClock;
    use crate::persistence::{KeyValueStore, LEDGER_KEY, MemoryStore};

    fn uid(raw: &str) -> UserId {
        let Ok(id) = UserId::new(raw) else {
            panic!("valid id");
        };
        id
    }

    fn make_service_with(store: Arc<dyn KeyValueStore>, policy: PointsPolicy) -> LoyaltyService {
        LoyaltyService::new(
            LedgerRepository::new(store, ""),
            LevelTable::default(),
            policy,
            Arc::new(ManualClock::default()),
            EventBus::new(100),
        )
    }

    fn make_service() -> LoyaltyService {
        make_service_with(Arc::new(MemoryStore::new()), PointsPolicy::default())
    }

    #[tokio::test]
    async fn add_points_returns_new_balance() {
        let service = make_service();
        let Ok(update) = service.add_points(&uid("u"), 250, "course").await else {
            panic!("add failed");
        };
        assert!(update.success);
        assert_eq!(update.new_balance, 250);
        assert_eq!(update.level, "bronze");
        assert!(!update.level_changed);
    }

    #[tokio::test]
    async fn non_positive_amounts_are_rejected_without_writes() {
        let store = Arc::new(MemoryStore::new());
        let service = make_service_with(
            Arc::clone(&store) as Arc<dyn KeyValueStore>,
            PointsPolicy::default(),
        );
        let u = uid("u");
        assert!(matches!(
            service.add_points(&u, 0, "x").await,
            Err(LoyaltyError::InvalidAmount(0))
        ));
        assert!(matches!(
            service.add_points(&u, -5, "x").await,
            Err(LoyaltyError::InvalidAmount(-5))
        ));
        assert!(matches!(
            service.remove_points(&u, 0, "x").await,
            Err(LoyaltyError::InvalidAmount(0))
        ));
        let Ok(stored) = store.get(LEDGER_KEY).await else {
            panic!("get failed");
        };
        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn debits_may_go_negative_by_default() {
        let service = make_service();
        let u = uid("u");
        let _ = service.add_points(&u, 20, "x").await;
        let Ok(update) = service.remove_points(&u, 50, "adjust").await else {
            panic!("remove failed");
        };
        assert_eq!(update.new_balance, -30);
        assert_eq!(update.transaction.amount, -50);
    }

    #[tokio::test]
    async fn reject_policy_keeps_floor_at_zero() {
        let policy = PointsPolicy {
            negative_balance: NegativeBalancePolicy::Reject,
            ..PointsPolicy::default()
        };
        let service = make_service_with(Arc::new(MemoryStore::new()), policy);
        let u = uid("u");
        let _ = service.add_points(&u, 40, "x").await;

        let result = service.remove_points(&u, 50, "too much").await;
        assert!(matches!(
            result,
            Err(LoyaltyError::InsufficientPoints {
                available: 40,
                requested: 50
            })
        ));
        let Ok(exact) = service.remove_points(&u, 40, "all").await else {
            panic!("exact debit rejected");
        };
        assert_eq!(exact.new_balance, 0);
    }

    #[tokio::test]
    async fn course_completion_awards_policy_points() {
        let service = make_service();
        let u = uid("u");
        let Ok(update) = service
            .add_points_for_course_completion("c1", "Curso", false, &u)
            .await
        else {
            panic!("award failed");
        };
        assert_eq!(update.new_balance, 100);
        assert_eq!(update.transaction.reason, "Completed course: Curso");
        assert_eq!(update.transaction.reference.as_deref(), Some("c1"));

        let Ok(update) = service
            .add_points_for_course_completion("c2", "Avanzado", true, &u)
            .await
        else {
            panic!("award failed");
        };
        assert_eq!(update.new_balance, 300);
        assert!(update.level_changed);
    }

    #[tokio::test]
    async fn course_completion_requires_course_id() {
        let service = make_service();
        let result = service
            .add_points_for_course_completion("  ", "Curso", false, &uid("u"))
            .await;
        assert!(matches!(result, Err(LoyaltyError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn level_crossing_emits_level_changed() {
        let service = make_service();
        let mut rx = service.event_bus().subscribe();
        let _ = service.add_points(&uid("u"), 300, "big").await;

        let Ok(first) = rx.recv().await else {
            panic!("expected points event");
        };
        assert_eq!(first.event_type_str(), "points_added");
        let Ok(second) = rx.recv().await else {
            panic!("expected level event");
        };
        assert_eq!(second.event_type_str(), "level_changed");
    }

    #[tokio::test]
    async fn history_is_newest_first_and_limited() {
        let service = make_service();
        let u = uid("u");
        for n in 1..=5 {
            let _ = service.add_points(&u, n, &format!("tx{n}")).await;
        }
        let Ok(history) = service.get_transaction_history(&u, 2).await else {
            panic!("history failed");
        };
        let reasons: Vec<&str> = history.iter().map(|t| t.reason.as_str()).collect();
        assert_eq!(reasons, vec!["tx5", "tx4"]);
    }

    #[tokio::test]
    async fn get_user_points_is_idempotent() {
        let service = make_service();
        let u = uid("u");
        let _ = service.add_points(&u, 70, "x").await;
        let (Ok(a), Ok(b)) = (service.get_user_points(&u).await, service.get_user_points(&u).await)
        else {
            panic!("query failed");
        };
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_persistence_failure() {
        let service = make_service_with(Arc::new(MemoryStore::with_quota(16)), PointsPolicy::default());
        let result = service.add_points(&uid("u"), 10, "x").await;
        assert!(matches!(result, Err(LoyaltyError::PersistenceFailure(_))));
        let Ok(record) = service.get_user_points(&uid("u")).await else {
            panic!("query failed");
        };
        assert_eq!(record.available_points, 0);
    }

    #[tokio::test]
    async fn discount_follows_level() {
        let service = make_service();
        let u = uid("u");
        let _ = service.add_points(&u, 1000, "x").await;
        let Ok(discount) = service.get_discount_percent(&u).await else {
            panic!("query failed");
        };
        assert_eq!(discount, 10);
    }

    #[tokio::test]
    async fn overflowing_credit_is_rejected_and_balance_kept() {
        let service = make_service();
        let u = uid("u");
        tokio_test::assert_ok!(service.add_points(&u, i64::MAX - 10, "import").await);

        let result = service.add_points(&u, 11, "course").await;
        assert!(matches!(result, Err(LoyaltyError::BalanceOverflow(_))));

        let Ok(record) = service.get_user_points(&u).await else {
            panic!("read failed");
        };
        assert_eq!(record.available_points, i64::MAX - 10);
        assert_eq!(record.transaction_count, 1);
    }
}
