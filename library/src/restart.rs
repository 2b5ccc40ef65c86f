use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use crate::platform::{Attempt, TimerId};

/// Stop requests that were issued but not processed yet.
///
/// Shared between a viewer and whoever forwards commands to it, so that a
/// stop requested while a failure is being handled already suppresses the
/// restart that failure would schedule.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Rc<Cell<u32>>);

impl StopSignal {
    pub fn request(&self) {
        self.0.set(self.0.get().saturating_add(1));
    }

    pub fn acknowledge(&self) {
        self.0.set(self.0.get().saturating_sub(1));
    }

    pub fn is_pending(&self) -> bool {
        self.0.get() > 0
    }
}

/// Outcome of [`RestartPolicy::next_restart`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextRestart {
    /// Arm a timer for this id, then report it with
    /// [`RestartPolicy::restart_scheduled`].
    Schedule(TimerId),
    /// Stopped, or a stop is on its way.
    Suppressed,
    AlreadyPending,
}

/// Attempt numbering and restart bookkeeping of one viewer.
///
/// Tracks which attempt is live, the one restart timer that may be pending
/// and whether the viewer was stopped. Arming and cancelling the timer is
/// left to the caller.
#[derive(Debug)]
pub struct RestartPolicy {
    delay: Duration,
    attempt: Attempt,
    live: bool,
    stopped: bool,
    pending: Option<TimerId>,
    next_timer: u64,
    stop_signal: StopSignal,
}

impl RestartPolicy {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            attempt: Attempt::default(),
            live: false,
            stopped: false,
            pending: None,
            next_timer: 0,
            stop_signal: StopSignal::default(),
        }
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    #[must_use]
    pub fn attempt(&self) -> Attempt {
        self.attempt
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    #[must_use]
    pub fn has_pending_restart(&self) -> bool {
        self.pending.is_some()
    }

    #[must_use]
    pub fn stop_signal(&self) -> StopSignal {
        self.stop_signal.clone()
    }

    /// Whether results of `attempt` should still be acted upon.
    #[must_use]
    pub fn is_current(&self, attempt: Attempt) -> bool {
        self.live && !self.stopped && attempt == self.attempt
    }

    /// Undo a stop. Returns the pending timer the caller must cancel.
    pub fn rearm(&mut self) -> Option<TimerId> {
        self.stopped = false;
        self.pending.take()
    }

    pub fn begin_attempt(&mut self) -> Attempt {
        self.attempt = self.attempt.next();
        self.live = true;
        self.attempt
    }

    pub fn end_attempt(&mut self) {
        self.live = false;
    }

    /// Ends `attempt` if it is the live one; `false` for stale failures.
    pub fn fail(&mut self, attempt: Attempt) -> bool {
        if !self.is_current(attempt) {
            return false;
        }
        self.end_attempt();
        true
    }

    pub fn next_restart(&mut self) -> NextRestart {
        if self.stopped || self.stop_signal.is_pending() {
            return NextRestart::Suppressed;
        }
        if self.pending.is_some() {
            return NextRestart::AlreadyPending;
        }
        let timer = TimerId::new(self.next_timer);
        self.next_timer = self.next_timer.wrapping_add(1);
        NextRestart::Schedule(timer)
    }

    /// The timer returned by [`Self::next_restart`] is armed.
    pub fn restart_scheduled(&mut self, timer: TimerId) {
        self.pending = Some(timer);
    }

    /// `timer` fired; `true` if a new attempt should be made.
    pub fn restart_due(&mut self, timer: TimerId) -> bool {
        if self.pending != Some(timer) {
            return false;
        }
        self.pending = None;
        !self.stopped && !self.stop_signal.is_pending()
    }

    /// Returns the pending timer the caller must cancel.
    pub fn stop(&mut self) -> Option<TimerId> {
        self.stopped = true;
        self.live = false;
        self.pending.take()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn failed() -> (RestartPolicy, TimerId) {
        let mut policy = RestartPolicy::new(Duration::from_millis(5000));
        let attempt = policy.begin_attempt();
        assert!(policy.fail(attempt));
        let NextRestart::Schedule(timer) = policy.next_restart() else {
            panic!("restart expected");
        };
        policy.restart_scheduled(timer);
        (policy, timer)
    }

    #[test]
    fn one_restart_per_failure() {
        let (mut policy, timer) = failed();
        assert_eq!(policy.next_restart(), NextRestart::AlreadyPending);
        assert!(policy.has_pending_restart());

        assert!(policy.restart_due(timer));
        assert!(!policy.restart_due(timer));
        assert!(!policy.has_pending_restart());
    }

    #[test]
    fn stale_attempts_are_not_current() {
        let mut policy = RestartPolicy::new(Duration::from_millis(10));
        let first = policy.begin_attempt();
        let second = policy.begin_attempt();

        assert!(!policy.is_current(first));
        assert!(!policy.fail(first));
        assert!(policy.is_current(second));
        assert!(policy.fail(second));
        assert!(!policy.fail(second));
    }

    #[test]
    fn stop_cancels_the_pending_restart() {
        let (mut policy, timer) = failed();

        assert_eq!(policy.stop(), Some(timer));
        assert!(!policy.restart_due(timer));
        assert_eq!(policy.next_restart(), NextRestart::Suppressed);
    }

    #[test]
    fn requested_stop_wins_over_failure() {
        let mut policy = RestartPolicy::new(Duration::from_millis(10));
        let attempt = policy.begin_attempt();
        let signal = policy.stop_signal();
        signal.request();

        assert!(policy.fail(attempt));
        assert_eq!(policy.next_restart(), NextRestart::Suppressed);

        signal.acknowledge();
        assert!(matches!(policy.next_restart(), NextRestart::Schedule(_)));
    }

    #[test]
    fn timer_firing_during_a_requested_stop_does_not_restart() {
        let (mut policy, timer) = failed();
        policy.stop_signal().request();
        assert!(!policy.restart_due(timer));
    }

    #[test]
    fn rearm_after_stop() {
        let (mut policy, _) = failed();
        policy.stop();
        assert!(policy.is_stopped());

        assert_eq!(policy.rearm(), None);
        let attempt = policy.begin_attempt();
        assert!(policy.is_current(attempt));
        assert!(matches!(policy.next_restart(), NextRestart::Schedule(_)));
    }

    #[test]
    fn unarmed_timer_is_not_pending() {
        let mut policy = RestartPolicy::new(Duration::from_millis(10));
        policy.begin_attempt();
        let NextRestart::Schedule(timer) = policy.next_restart() else {
            panic!("restart expected");
        };

        assert!(!policy.has_pending_restart());
        assert!(!policy.restart_due(timer));
        assert!(matches!(policy.next_restart(), NextRestart::Schedule(_)));
    }
}
