//! Daily time-tracking state and the reminder monitor.
//!
//! # State Machine
//!
//! ```text
//!            mark_started
//! NotStarted ────────────▶ Started
//!     ▲                       │
//!     └───── reset_cycle ─────┘
//! ```
//!
//! [`TrackingState`] is the single shared flag. [`ReminderMonitor`] pairs it
//! with a [`Notifier`] and implements the three daily operations:
//!
//! - [`ReminderMonitor::mark_started`] - record that tracking began today
//! - [`ReminderMonitor::check_and_notify`] - send the reminder if it did not
//! - [`ReminderMonitor::reset_cycle`] - clear the flag for the next day
//!
//! Notifier calls are dispatched on a background task with a timeout. Their
//! outcome is logged and never affects the flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::notifier::{Notifier, Reminder};

/// Default upper bound on a single notifier call.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Observable phase of the daily cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingPhase {
    /// No start signal since the last reset.
    NotStarted,
    /// Tracking was reported as started.
    Started,
}

/// Process-wide "tracking started" flag.
///
/// Cloning is cheap and every clone observes the same flag.
#[derive(Debug, Clone, Default)]
pub struct TrackingState {
    started: Arc<AtomicBool>,
}

impl TrackingState {
    /// Creates a new state in the [`TrackingPhase::NotStarted`] phase.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag. Returns `true` if this call moved the state out of
    /// `NotStarted`.
    pub fn mark_started(&self) -> bool {
        let transitioned = !self.started.swap(true, Ordering::SeqCst);
        if transitioned {
            info!("Tracking started");
        } else {
            debug!("Tracking already started");
        }
        transitioned
    }

    /// Clears the flag. Returns `true` if it was set.
    pub fn reset(&self) -> bool {
        self.started.swap(false, Ordering::SeqCst)
    }

    /// Returns whether tracking has started since the last reset.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> TrackingPhase {
        if self.is_started() {
            TrackingPhase::Started
        } else {
            TrackingPhase::NotStarted
        }
    }
}

/// Drives the daily reminder cycle for a single user.
///
/// # Example
///
/// ```rust,ignore
/// use timify_server::notifier::{Reminder, ResendNotifier};
/// use timify_server::tracking::ReminderMonitor;
///
/// let notifier = ResendNotifier::new(url, key, timeout)?;
/// let monitor = ReminderMonitor::new(notifier, Reminder::daily("example.com", "me@example.com"));
///
/// monitor.mark_started();
/// assert!(monitor.check_and_notify().is_none());
/// monitor.reset_cycle();
/// ```
pub struct ReminderMonitor<N> {
    state: TrackingState,
    notifier: Arc<N>,
    reminder: Reminder,
    notify_timeout: Duration,
}

impl<N: Notifier> ReminderMonitor<N> {
    /// Creates a monitor with a fresh [`TrackingState`].
    #[must_use]
    pub fn new(notifier: N, reminder: Reminder) -> Self {
        Self::with_state(TrackingState::new(), notifier, reminder)
    }

    /// Creates a monitor over an existing state, e.g. one shared with the router.
    #[must_use]
    pub fn with_state(state: TrackingState, notifier: N, reminder: Reminder) -> Self {
        Self {
            state,
            notifier: Arc::new(notifier),
            reminder,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    /// Overrides the notifier timeout.
    #[must_use]
    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    /// Returns the shared tracking state.
    pub fn state(&self) -> &TrackingState {
        &self.state
    }

    /// Returns the reminder sent by [`Self::check_and_notify`].
    pub fn reminder(&self) -> &Reminder {
        &self.reminder
    }

    /// Records that tracking started. Idempotent.
    pub fn mark_started(&self) {
        self.state.mark_started();
    }

    /// Sends the reminder if tracking has not started.
    ///
    /// Returns the handle of the spawned delivery task, or `None` when no
    /// reminder was needed. Dropping the handle detaches the task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn check_and_notify(&self) -> Option<JoinHandle<()>> {
        if self.state.is_started() {
            debug!("Tracking already started, no reminder needed");
            return None;
        }

        info!(
            recipients = self.reminder.to.len(),
            subject = %self.reminder.subject,
            "Tracking not started, dispatching reminder"
        );

        let notifier = Arc::clone(&self.notifier);
        let reminder = self.reminder.clone();
        let timeout = self.notify_timeout;

        Some(tokio::spawn(async move {
            match tokio::time::timeout(timeout, notifier.send(&reminder)).await {
                Ok(Ok(())) => info!("Reminder notification sent"),
                Ok(Err(err)) => warn!(error = %err, "Reminder notification failed"),
                Err(_) => warn!(
                    timeout_secs = timeout.as_secs_f64(),
                    "Reminder notification failed: timed out"
                ),
            }
        }))
    }

    /// Clears the flag for the next daily cycle.
    pub fn reset_cycle(&self) {
        let was_started = self.state.reset();
        info!(was_started = was_started, "Tracking state reset");
    }
}

impl<N> Clone for ReminderMonitor<N> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            notifier: Arc::clone(&self.notifier),
            reminder: self.reminder.clone(),
            notify_timeout: self.notify_timeout,
        }
    }
}

impl<N> std::fmt::Debug for ReminderMonitor<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReminderMonitor")
            .field("state", &self.state)
            .field("notifier", &"<Notifier>")
            .field("reminder", &self.reminder)
            .field("notify_timeout", &self.notify_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::sync::Mutex;

    use crate::notifier::NotifyError;

    /// How a [`RecordingNotifier`] answers.
    #[derive(Clone, Copy)]
    enum Outcome {
        Succeed,
        Fail,
        Hang,
    }

    struct RecordingNotifier {
        sent: Arc<Mutex<Vec<Reminder>>>,
        outcome: Outcome,
    }

    impl RecordingNotifier {
        fn new(outcome: Outcome) -> (Self, Arc<Mutex<Vec<Reminder>>>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    sent: Arc::clone(&sent),
                    outcome,
                },
                sent,
            )
        }
    }

    impl Notifier for RecordingNotifier {
        fn send(
            &self,
            reminder: &Reminder,
        ) -> impl Future<Output = Result<(), NotifyError>> + Send {
            self.sent.lock().unwrap().push(reminder.clone());
            let outcome = self.outcome;
            async move {
                match outcome {
                    Outcome::Succeed => Ok(()),
                    Outcome::Fail => Err(NotifyError::Unavailable("boom".to_string())),
                    Outcome::Hang => {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Ok(())
                    }
                }
            }
        }
    }

    fn monitor(outcome: Outcome) -> (ReminderMonitor<RecordingNotifier>, Arc<Mutex<Vec<Reminder>>>) {
        let (notifier, sent) = RecordingNotifier::new(outcome);
        let monitor = ReminderMonitor::new(notifier, Reminder::daily("example.com", "me@example.com"));
        (monitor, sent)
    }

    async fn check(monitor: &ReminderMonitor<RecordingNotifier>) {
        if let Some(handle) = monitor.check_and_notify() {
            handle.await.expect("delivery task panicked");
        }
    }

    // ==================== TrackingState ====================

    #[test]
    fn state_starts_not_started() {
        let state = TrackingState::new();
        assert!(!state.is_started());
        assert_eq!(state.phase(), TrackingPhase::NotStarted);
    }

    #[test]
    fn mark_started_is_idempotent() {
        let state = TrackingState::new();

        assert!(state.mark_started());
        assert!(!state.mark_started());
        assert!(state.is_started());
        assert_eq!(state.phase(), TrackingPhase::Started);
    }

    #[test]
    fn reset_always_clears() {
        let state = TrackingState::new();
        assert!(!state.reset());
        assert!(!state.is_started());

        state.mark_started();
        assert!(state.reset());
        assert!(!state.is_started());
    }

    #[test]
    fn clones_share_the_flag() {
        let state = TrackingState::new();
        let other = state.clone();

        other.mark_started();
        assert!(state.is_started());

        state.reset();
        assert!(!other.is_started());
    }

    #[test]
    fn phase_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&TrackingPhase::NotStarted).unwrap(),
            "\"not_started\""
        );
    }

    #[test]
    fn flag_holds_for_interleaved_sequences() {
        let state = TrackingState::new();
        let ops = [true, false, true, true, false, false, true, false, true];
        let mut expected = false;

        for mark in ops {
            if mark {
                state.mark_started();
                expected = true;
            } else {
                state.reset();
                expected = false;
            }
            assert_eq!(state.is_started(), expected);
        }
    }

    // ==================== ReminderMonitor ====================

    #[tokio::test]
    async fn check_notifies_once_when_not_started() {
        let (monitor, sent) = monitor(Outcome::Succeed);

        check(&monitor).await;

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Track Time now!");
        assert_eq!(sent[0].to, vec!["me@example.com".to_string()]);
    }

    #[tokio::test]
    async fn check_is_silent_when_started() {
        let (monitor, sent) = monitor(Outcome::Succeed);

        monitor.mark_started();
        assert!(monitor.check_and_notify().is_none());

        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reset_reenables_reminder() {
        let (monitor, sent) = monitor(Outcome::Succeed);

        monitor.mark_started();
        monitor.reset_cycle();
        check(&monitor).await;

        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn check_does_not_change_state() {
        let (monitor, _sent) = monitor(Outcome::Succeed);

        check(&monitor).await;
        assert!(!monitor.state().is_started());

        monitor.mark_started();
        check(&monitor).await;
        assert!(monitor.state().is_started());
    }

    #[tokio::test]
    async fn failed_notification_leaves_state_untouched() {
        let (monitor, sent) = monitor(Outcome::Fail);

        check(&monitor).await;

        assert_eq!(sent.lock().unwrap().len(), 1);
        assert!(!monitor.state().is_started());
    }

    #[tokio::test]
    async fn hanging_notifier_is_bounded_by_timeout() {
        let (monitor, sent) = monitor(Outcome::Hang);
        let monitor = monitor.with_notify_timeout(Duration::from_millis(50));

        let handle = monitor.check_and_notify().expect("reminder should be dispatched");
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("delivery task should finish after the notifier timeout")
            .expect("delivery task panicked");

        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn shared_state_is_visible_to_monitor() {
        let state = TrackingState::new();
        let (notifier, sent) = RecordingNotifier::new(Outcome::Succeed);
        let monitor = ReminderMonitor::with_state(
            state.clone(),
            notifier,
            Reminder::daily("example.com", "me@example.com"),
        );

        state.mark_started();
        check(&monitor).await;

        assert!(sent.lock().unwrap().is_empty());
    }

    #[test]
    fn debug_hides_notifier() {
        let (monitor, _sent) = monitor(Outcome::Succeed);
        let debug = format!("{monitor:?}");
        assert!(debug.contains("ReminderMonitor"));
        assert!(debug.contains("<Notifier>"));
    }
}
