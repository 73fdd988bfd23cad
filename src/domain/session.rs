//! Session time accrual state machine.
//!
//! [`SessionState`] is pure: every transition takes `now` explicitly and
//! reports what happened, leaving persistence and event emission to
//! [`crate::service::SessionService`].
//!
//! ```text
//!            start (authenticated, no open session)
//!   Stopped ─────────────────────────────────────────▶ Tracking
//!      ▲                                                │  ▲
//!      │ stop / tick after logout (fold + close)        │  │ tick: fold, reopen at now
//!      └────────────────────────────────────────────────┘──┘
//! ```
//!
//! While tracking, hiding the window folds and closes the open segment
//! without leaving `Tracking`; showing it again reopens a segment.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::UserId;
use crate::error::LoyaltyError;

/// Coarse tracker status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TrackerStatus {
    /// No session is being tracked.
    Stopped,
    /// A session is being tracked (possibly paused while hidden).
    Tracking,
}

/// Result of folding the open segment into the running total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct FoldOutcome {
    /// Milliseconds moved into the total by this fold.
    pub elapsed_ms: u64,
    /// Running total after the fold.
    pub total_ms: u64,
}

/// What a periodic tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not tracking; nothing to do.
    Idle,
    /// Still authenticated; elapsed time folded and a new segment opened.
    Folded(FoldOutcome),
    /// Authentication was lost; elapsed time folded and tracking stopped.
    Stopped(FoldOutcome),
}

/// What a start request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new segment was opened at the given instant.
    Started(DateTime<Utc>),
    /// A segment was already open since the given instant.
    AlreadyTracking(DateTime<Utc>),
}

/// Per-user session accrual state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    user_id: UserId,
    authenticated: bool,
    tracking: bool,
    session_start: Option<DateTime<Utc>>,
    total_session_ms: u64,
}

impl SessionState {
    /// Creates a stopped, unauthenticated state carrying a persisted total.
    #[must_use]
    pub fn new(user_id: UserId, total_session_ms: u64) -> Self {
        Self {
            user_id,
            authenticated: false,
            tracking: false,
            session_start: None,
            total_session_ms,
        }
    }

    /// The tracked user.
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Whether the user is currently logged in.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> TrackerStatus {
        if self.tracking {
            TrackerStatus::Tracking
        } else {
            TrackerStatus::Stopped
        }
    }

    /// `true` while tracking with no open segment (window hidden).
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.tracking && self.session_start.is_none()
    }

    /// Start of the open segment, if any.
    #[must_use]
    pub const fn session_start(&self) -> Option<DateTime<Utc>> {
        self.session_start
    }

    /// Folded total, excluding the open segment.
    #[must_use]
    pub const fn total_session_ms(&self) -> u64 {
        self.total_session_ms
    }

    /// Marks the user as logged in.
    pub fn login(&mut self) {
        self.authenticated = true;
    }

    /// Marks the user as logged out. Tracking continues until the next
    /// tick notices and stops it.
    pub fn logout(&mut self) {
        self.authenticated = false;
    }

    /// Opens a segment if the user is authenticated and none is open.
    ///
    /// # Errors
    ///
    /// Returns [`LoyaltyError::NotAuthenticated`] when the user is logged out.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<StartOutcome, LoyaltyError> {
        if !self.authenticated {
            return Err(LoyaltyError::NotAuthenticated(self.user_id.clone()));
        }
        if let Some(started) = self.session_start {
            return Ok(StartOutcome::AlreadyTracking(started));
        }
        self.tracking = true;
        self.session_start = Some(now);
        Ok(StartOutcome::Started(now))
    }

    /// Periodic fold. Re-checks authentication on every call.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        if !self.tracking {
            return TickOutcome::Idle;
        }
        if self.authenticated {
            TickOutcome::Folded(self.fold(now, true))
        } else {
            let outcome = self.fold(now, false);
            self.tracking = false;
            TickOutcome::Stopped(outcome)
        }
    }

    /// Folds the open segment and stops tracking. `None` if already stopped.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Option<FoldOutcome> {
        if !self.tracking {
            return None;
        }
        let outcome = self.fold(now, false);
        self.tracking = false;
        Some(outcome)
    }

    /// Window hidden: folds and closes the open segment, keeps tracking.
    pub fn hide(&mut self, now: DateTime<Utc>) -> Option<FoldOutcome> {
        if !self.tracking {
            return None;
        }
        Some(self.fold(now, false))
    }

    /// Window visible again: reopens a segment only if none is open and
    /// the user is still authenticated. Returns `true` if one was opened.
    pub fn show(&mut self, now: DateTime<Utc>) -> bool {
        if !self.authenticated || self.session_start.is_some() {
            return false;
        }
        self.tracking = true;
        self.session_start = Some(now);
        true
    }

    /// Page unload: best-effort fold that leaves the state untouched otherwise.
    pub fn unload(&mut self, now: DateTime<Utc>) -> Option<FoldOutcome> {
        if self.session_start.is_none() {
            return None;
        }
        Some(self.fold(now, true))
    }

    /// Length of the open segment, `0` when none is open.
    #[must_use]
    pub fn current_session_ms(&self, now: DateTime<Utc>) -> u64 {
        self.session_start
            .map_or(0, |start| elapsed_ms(start, now))
    }

    /// Folded total plus the open segment, for live display without a fold.
    #[must_use]
    pub fn total_usage_ms(&self, now: DateTime<Utc>) -> u64 {
        self.total_session_ms
            .saturating_add(self.current_session_ms(now))
    }

    /// Moves `now - session_start` into the total. The segment is reopened
    /// at `now` when `reopen` is set, otherwise closed.
    fn fold(&mut self, now: DateTime<Utc>, reopen: bool) -> FoldOutcome {
        let elapsed = self
            .session_start
            .map_or(0, |start| elapsed_ms(start, now));
        self.total_session_ms = self.total_session_ms.saturating_add(elapsed);
        self.session_start = if reopen && self.session_start.is_some() {
            Some(now)
        } else {
            None
        };
        FoldOutcome {
            elapsed_ms: elapsed,
            total_ms: self.total_session_ms,
        }
    }
}

/// Non-negative milliseconds between two instants; a backwards clock yields 0.
fn elapsed_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    u64::try_from((to - from).num_milliseconds()).unwrap_or(0)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn logged_in() -> SessionState {
        let Ok(id) = UserId::new("learner") else {
            panic!("valid id");
        };
        let mut state = SessionState::new(id, 0);
        state.login();
        state
    }

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default() + TimeDelta::seconds(secs)
    }

    #[test]
    fn start_requires_authentication() {
        let Ok(id) = UserId::new("anon") else {
            panic!("valid id");
        };
        let mut state = SessionState::new(id, 0);
        assert!(matches!(
            state.start(t(0)),
            Err(LoyaltyError::NotAuthenticated(_))
        ));
        assert_eq!(state.status(), TrackerStatus::Stopped);
    }

    #[test]
    fn second_start_keeps_original_segment() {
        let mut state = logged_in();
        assert_eq!(state.start(t(0)).ok(), Some(StartOutcome::Started(t(0))));
        assert_eq!(
            state.start(t(5)).ok(),
            Some(StartOutcome::AlreadyTracking(t(0)))
        );
    }

    #[test]
    fn tick_folds_and_reopens() {
        let mut state = logged_in();
        let _ = state.start(t(0));
        let outcome = state.tick(t(30));
        assert_eq!(
            outcome,
            TickOutcome::Folded(FoldOutcome {
                elapsed_ms: 30_000,
                total_ms: 30_000
            })
        );
        assert_eq!(state.session_start(), Some(t(30)));
        assert_eq!(state.status(), TrackerStatus::Tracking);
    }

    #[test]
    fn tick_after_logout_folds_then_stops() {
        let mut state = logged_in();
        let _ = state.start(t(0));
        state.logout();
        let outcome = state.tick(t(10));
        assert_eq!(
            outcome,
            TickOutcome::Stopped(FoldOutcome {
                elapsed_ms: 10_000,
                total_ms: 10_000
            })
        );
        assert_eq!(state.status(), TrackerStatus::Stopped);
        assert_eq!(state.tick(t(20)), TickOutcome::Idle);
        assert_eq!(state.total_session_ms(), 10_000);
    }

    #[test]
    fn immediate_stop_leaves_total_unchanged() {
        let mut state = logged_in();
        let _ = state.start(t(0));
        let outcome = state.stop(t(0));
        assert_eq!(
            outcome,
            Some(FoldOutcome {
                elapsed_ms: 0,
                total_ms: 0
            })
        );
        assert_eq!(state.stop(t(1)), None);
    }

    #[test]
    fn hide_pauses_and_show_resumes() {
        let mut state = logged_in();
        let _ = state.start(t(0));
        let hidden = state.hide(t(12));
        assert_eq!(hidden.map(|o| o.total_ms), Some(12_000));
        assert!(state.is_paused());
        assert_eq!(state.status(), TrackerStatus::Tracking);

        // Time spent hidden is not accrued.
        assert_eq!(state.tick(t(100)), TickOutcome::Folded(FoldOutcome {
            elapsed_ms: 0,
            total_ms: 12_000
        }));
        assert!(state.show(t(100)));
        assert!(!state.show(t(101)));
        let _ = state.stop(t(108));
        assert_eq!(state.total_session_ms(), 20_000);
    }

    #[test]
    fn unload_folds_but_keeps_tracking() {
        let mut state = logged_in();
        let _ = state.start(t(0));
        assert_eq!(state.unload(t(7)).map(|o| o.elapsed_ms), Some(7_000));
        assert_eq!(state.session_start(), Some(t(7)));
        assert_eq!(state.status(), TrackerStatus::Tracking);
    }

    #[test]
    fn live_queries_include_open_segment() {
        let mut state = logged_in();
        let _ = state.start(t(0));
        let _ = state.tick(t(30));
        assert_eq!(state.current_session_ms(t(45)), 15_000);
        assert_eq!(state.total_usage_ms(t(45)), 45_000);
        let _ = state.stop(t(45));
        assert_eq!(state.current_session_ms(t(99)), 0);
    }

    #[test]
    fn three_folds_equal_one_fold_of_the_sum() {
        let mut split = logged_in();
        let _ = split.start(t(0));
        let _ = split.tick(t(3));
        let _ = split.tick(t(10));
        let _ = split.stop(t(31));

        let mut whole = logged_in();
        let _ = whole.start(t(0));
        let _ = whole.stop(t(31));

        assert_eq!(split.total_session_ms(), whole.total_session_ms());
    }

    #[test]
    fn backwards_clock_never_reduces_total() {
        let mut state = logged_in();
        let _ = state.start(t(10));
        let outcome = state.tick(t(5));
        assert_eq!(outcome, TickOutcome::Folded(FoldOutcome {
            elapsed_ms: 0,
            total_ms: 0
        }));
    }
}
