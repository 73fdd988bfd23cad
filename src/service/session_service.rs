//! Session service: per-user session accrual with persisted totals.
//!
//! [`SessionService`] keeps one [`SessionState`] per logged-in user behind
//! its own lock, drives the state machine from explicit calls and from the
//! periodic ticker, and writes the running total to the profile store
//! after every fold that moved it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use utoipa::ToSchema;

use crate::domain::{
    Clock, EventBus, FoldOutcome, LoyaltyEvent, SessionState, StartOutcome, TickOutcome,
    TrackerStatus, UserId,
};
use crate::error::LoyaltyError;
use crate::persistence::ProfileRepository;

/// Point-in-time view of a user's session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SessionSnapshot {
    /// Tracked user.
    pub user_id: UserId,
    /// Tracker status.
    pub status: TrackerStatus,
    /// Whether the user is logged in.
    pub authenticated: bool,
    /// Whether tracking is paused because the window is hidden.
    pub paused: bool,
    /// Start of the open segment.
    pub session_start: Option<DateTime<Utc>>,
    /// Length of the open segment in milliseconds.
    pub current_session_ms: u64,
    /// Folded total plus the open segment, in milliseconds.
    pub total_usage_ms: u64,
}

/// Counters of one ticker pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Sessions folded and kept open.
    pub folded: usize,
    /// Sessions stopped because the user logged out.
    pub stopped: usize,
    /// Folds whose persistence failed (kept in memory, retried next fold).
    pub failed: usize,
}

/// Handle of the background fold ticker. Aborts the task when dropped.
#[derive(Debug)]
pub struct TickerHandle {
    handle: JoinHandle<()>,
}

impl TickerHandle {
    /// Stops the ticker.
    pub fn stop(self) {
        self.handle.abort();
    }

    /// Returns `true` once the ticker task has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

type SharedState = Arc<Mutex<SessionState>>;

/// Session accrual coordinator.
#[derive(Debug)]
pub struct SessionService {
    sessions: RwLock<HashMap<UserId, SharedState>>,
    profiles: ProfileRepository,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
}

impl SessionService {
    /// Creates a new `SessionService`.
    #[must_use]
    pub fn new(profiles: ProfileRepository, clock: Arc<dyn Clock>, event_bus: EventBus) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            profiles,
            clock,
            event_bus,
        }
    }

    /// Returns a reference to the inner [`EventBus`].
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Marks `user_id` as authenticated, restoring the persisted total the
    /// first time the user is seen.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::PersistenceFailure`] if the profile read fails.
    pub async fn login(&self, user_id: &UserId) -> Result<SessionSnapshot, LoyaltyError> {
        loop {
            let state = self.state_or_restore(user_id).await?;
            let mut guard = state.lock().await;
            // Released while we waited for the lock: restore a fresh entry.
            if !self.is_registered(user_id, &state).await {
                continue;
            }
            guard.login();
            tracing::info!(%user_id, "session user authenticated");
            return Ok(self.snapshot_of(&guard));
        }
    }

    /// Clears authentication. The next tick folds and stops tracking; a
    /// session that is not tracking leaves the registry right away.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::NotAuthenticated`] if the user never logged in.
    pub async fn logout(&self, user_id: &UserId) -> Result<SessionSnapshot, LoyaltyError> {
        let state = self.state(user_id).await?;
        let mut guard = state.lock().await;
        guard.logout();
        tracing::info!(%user_id, "session user logged out");
        let snapshot = self.snapshot_of(&guard);
        self.evict_if_idle(user_id, &state, &guard).await;
        Ok(snapshot)
    }

    /// Opens a session segment. Idempotent while a segment is open.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::NotAuthenticated`] if the user is not logged in.
    pub async fn start(&self, user_id: &UserId) -> Result<SessionSnapshot, LoyaltyError> {
        let state = self.state(user_id).await?;
        let mut state = state.lock().await;
        if let StartOutcome::Started(at) = state.start(self.clock.now())? {
            let _ = self.event_bus.publish(LoyaltyEvent::SessionStarted {
                user_id: user_id.clone(),
                timestamp: at,
            });
            tracing::info!(%user_id, "session tracking started");
        }
        Ok(self.snapshot_of(&state))
    }

    /// Folds remaining time and stops tracking. No-op when already stopped.
    /// A logged-out user leaves the registry once stopped.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::NotAuthenticated`] if the user is unknown, or
    /// [`LoyaltyError::PersistenceFailure`] if the fold cannot be saved.
    pub async fn stop(&self, user_id: &UserId) -> Result<SessionSnapshot, LoyaltyError> {
        let state = self.state(user_id).await?;
        let mut guard = state.lock().await;
        let now = self.clock.now();
        if let Some(outcome) = guard.stop(now) {
            self.persist_fold(user_id, outcome, now).await?;
            self.publish_stopped(user_id, outcome, now);
        }
        let snapshot = self.snapshot_of(&guard);
        self.evict_if_idle(user_id, &state, &guard).await;
        Ok(snapshot)
    }

    /// Window visibility changed: hiding folds and pauses, showing resumes.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::NotAuthenticated`] if the user is unknown, or
    /// [`LoyaltyError::PersistenceFailure`] if the fold cannot be saved.
    pub async fn visibility_changed(
        &self,
        user_id: &UserId,
        hidden: bool,
    ) -> Result<SessionSnapshot, LoyaltyError> {
        let state = self.state(user_id).await?;
        let mut state = state.lock().await;
        let now = self.clock.now();
        if hidden {
            if let Some(outcome) = state.hide(now) {
                self.persist_fold(user_id, outcome, now).await?;
            }
        } else if state.show(now) {
            let _ = self.event_bus.publish(LoyaltyEvent::SessionStarted {
                user_id: user_id.clone(),
                timestamp: now,
            });
        }
        Ok(self.snapshot_of(&state))
    }

    /// Page unload: best-effort final fold.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::NotAuthenticated`] if the user is unknown, or
    /// [`LoyaltyError::PersistenceFailure`] if the fold cannot be saved.
    pub async fn unload(&self, user_id: &UserId) -> Result<SessionSnapshot, LoyaltyError> {
        let state = self.state(user_id).await?;
        let mut state = state.lock().await;
        let now = self.clock.now();
        if let Some(outcome) = state.unload(now) {
            self.persist_fold(user_id, outcome, now).await?;
        }
        Ok(self.snapshot_of(&state))
    }

    /// Unloads every session, e.g. on shutdown. Failures are logged.
    pub async fn unload_all(&self) {
        for (user_id, state) in self.all_states().await {
            let mut state = state.lock().await;
            let now = self.clock.now();
            if let Some(outcome) = state.unload(now)
                && let Err(err) = self.persist_fold(&user_id, outcome, now).await
            {
                tracing::warn!(%user_id, error = %err, "final session save failed");
            }
        }
    }

    /// One periodic pass over all sessions. Authentication is re-checked
    /// for each; persistence failures are logged and counted, not raised.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        for (user_id, state) in self.all_states().await {
            let mut guard = state.lock().await;
            let now = self.clock.now();
            let (outcome, stopped) = match guard.tick(now) {
                TickOutcome::Idle => continue,
                TickOutcome::Folded(outcome) => (outcome, false),
                TickOutcome::Stopped(outcome) => (outcome, true),
            };
            let persisted = match self.persist_fold(&user_id, outcome, now).await {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(%user_id, error = %err, "session fold not persisted");
                    report.failed = report.failed.saturating_add(1);
                    false
                }
            };
            if stopped {
                self.publish_stopped(&user_id, outcome, now);
                report.stopped = report.stopped.saturating_add(1);
                // An unsaved total stays in memory until the next login.
                if persisted {
                    self.evict_if_idle(&user_id, &state, &guard).await;
                }
            } else {
                report.folded = report.folded.saturating_add(1);
            }
        }
        report
    }

    /// Spawns a task calling [`Self::tick`] every `period`.
    pub fn spawn_ticker(self: &Arc<Self>, period: Duration) -> TickerHandle {
        let service = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let report = service.tick().await;
                tracing::debug!(
                    folded = report.folded,
                    stopped = report.stopped,
                    failed = report.failed,
                    "session tick"
                );
            }
        });
        tracing::info!(period_secs = period.as_secs(), "session ticker started");
        TickerHandle { handle }
    }

    /// Returns the user's live session view.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::NotAuthenticated`] if the user is unknown.
    pub async fn snapshot(&self, user_id: &UserId) -> Result<SessionSnapshot, LoyaltyError> {
        let state = self.state(user_id).await?;
        let state = state.lock().await;
        Ok(self.snapshot_of(&state))
    }

    /// Length of the open segment in milliseconds, `0` if none.
    pub async fn current_session_duration(&self, user_id: &UserId) -> u64 {
        let Some(state) = self.sessions.read().await.get(user_id).cloned() else {
            return 0;
        };
        let state = state.lock().await;
        state.current_session_ms(self.clock.now())
    }

    /// Folded total plus the open segment. Users without a live session
    /// report their persisted total.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::PersistenceFailure`] if the profile read fails.
    pub async fn total_usage_time(&self, user_id: &UserId) -> Result<u64, LoyaltyError> {
        let live = self.sessions.read().await.get(user_id).cloned();
        if let Some(state) = live {
            let state = state.lock().await;
            return Ok(state.total_usage_ms(self.clock.now()));
        }
        Ok(self
            .profiles
            .load(user_id)
            .await?
            .map_or(0, |p| p.total_session_time))
    }

    /// Number of users currently held in memory.
    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn state(&self, user_id: &UserId) -> Result<SharedState, LoyaltyError> {
        self.sessions
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| LoyaltyError::NotAuthenticated(user_id.clone()))
    }

    async fn state_or_restore(&self, user_id: &UserId) -> Result<SharedState, LoyaltyError> {
        if let Some(state) = self.sessions.read().await.get(user_id).cloned() {
            return Ok(state);
        }
        let persisted = self
            .profiles
            .load(user_id)
            .await?
            .map_or(0, |p| p.total_session_time);
        let mut map = self.sessions.write().await;
        let state = map
            .entry(user_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(SessionState::new(user_id.clone(), persisted))));
        Ok(Arc::clone(state))
    }

    async fn is_registered(&self, user_id: &UserId, shared: &SharedState) -> bool {
        self.sessions
            .read()
            .await
            .get(user_id)
            .is_some_and(|current| Arc::ptr_eq(current, shared))
    }

    /// Drops a stopped, logged-out session. Its total is already in the
    /// profile store, which `login` restores from.
    async fn evict_if_idle(&self, user_id: &UserId, shared: &SharedState, state: &SessionState) {
        if state.is_authenticated() || state.status() != TrackerStatus::Stopped {
            return;
        }
        let mut sessions = self.sessions.write().await;
        if sessions
            .get(user_id)
            .is_some_and(|current| Arc::ptr_eq(current, shared))
        {
            sessions.remove(user_id);
            tracing::debug!(%user_id, "idle session released");
        }
    }

    async fn all_states(&self) -> Vec<(UserId, SharedState)> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(id, state)| (id.clone(), Arc::clone(state)))
            .collect()
    }

    async fn persist_fold(
        &self,
        user_id: &UserId,
        outcome: FoldOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), LoyaltyError> {
        if outcome.elapsed_ms == 0 {
            return Ok(());
        }
        self.profiles
            .record_session_total(user_id, outcome.total_ms, now)
            .await?;
        let _ = self.event_bus.publish(LoyaltyEvent::SessionFolded {
            user_id: user_id.clone(),
            elapsed_ms: outcome.elapsed_ms,
            total_ms: outcome.total_ms,
            timestamp: now,
        });
        tracing::debug!(
            %user_id,
            elapsed_ms = outcome.elapsed_ms,
            total_ms = outcome.total_ms,
            "session time folded"
        );
        Ok(())
    }

    fn publish_stopped(&self, user_id: &UserId, outcome: FoldOutcome, now: DateTime<Utc>) {
        let _ = self.event_bus.publish(LoyaltyEvent::SessionStopped {
            user_id: user_id.clone(),
            total_ms: outcome.total_ms,
            timestamp: now,
        });
        tracing::info!(%user_id, total_ms = outcome.total_ms, "session tracking stopped");
    }

    fn snapshot_of(&self, state: &SessionState) -> SessionSnapshot {
        let now = self.clock.now();
        SessionSnapshot {
            user_id: state.user_id().clone(),
            status: state.status(),
            authenticated: state.is_authenticated(),
            paused: state.is_paused(),
            session_start: state.session_start(),
            current_session_ms: state.current_session_ms(now),
            total_usage_ms: state.total_usage_ms(now),
        }
    }
}
