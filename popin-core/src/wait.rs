//! Call-acceptance wait session state machine.
//!
//! A [`WaitSession`] tracks one polling run against the connection update
//! endpoint. It does no I/O and keeps no clock of its own: the driver feeds
//! it the elapsed time before each poll ([`WaitSession::advance`]) and every
//! decoded [`StatusUpdate`] ([`WaitSession::apply`]), and forwards the
//! returned [`WaitEvent`]s to whoever is listening.
//!
//! Flow: `Idle → Running → {Stopped, Accepted, Missed}`

use crate::types::{CallId, CallQueueId, StatusUpdate};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Delay between two polls. Fixed, no backoff.
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// How long to wait for an agent before giving up.
pub const MAX_WAIT_DURATION: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitState {
    /// No session has been started.
    #[default]
    Idle,
    Running,
    /// Cancelled by the owner.
    Stopped,
    Accepted,
    Missed,
}

impl WaitState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Accepted or Missed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Missed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    /// The server reported the call as missed.
    Reported,
    /// [`MAX_WAIT_DURATION`] elapsed without a terminal status.
    TimedOut,
}

/// Listener-visible outcome of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitEvent {
    QueuePositionChanged(u32),
    CallAccepted(CallId),
    CallMissed(MissReason),
}

#[derive(Debug, Clone)]
pub struct WaitSession {
    call_queue_id: CallQueueId,
    started_at: DateTime<Utc>,
    elapsed: Duration,
    last_known_position: Option<u32>,
    state: WaitState,
}

impl WaitSession {
    /// Creates a running session.
    pub fn start(call_queue_id: CallQueueId) -> Self {
        Self {
            call_queue_id,
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
            last_known_position: None,
            state: WaitState::Running,
        }
    }

    pub fn call_queue_id(&self) -> CallQueueId {
        self.call_queue_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Last position reported to the listener, `None` until the first one.
    pub fn last_known_position(&self) -> Option<u32> {
        self.last_known_position
    }

    pub fn state(&self) -> WaitState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Records the time since start and ends the session once the maximum
    /// wait is reached. Called before every poll.
    ///
    /// `elapsed` never moves backwards; a smaller value is ignored.
    pub fn advance(&mut self, elapsed: Duration) -> Option<WaitEvent> {
        if !self.is_running() {
            return None;
        }
        self.elapsed = self.elapsed.max(elapsed);
        if self.elapsed >= MAX_WAIT_DURATION {
            self.state = WaitState::Missed;
            return Some(WaitEvent::CallMissed(MissReason::TimedOut));
        }
        None
    }

    /// Applies one poll result.
    pub fn apply(&mut self, update: &StatusUpdate) -> Option<WaitEvent> {
        if !self.is_running() {
            return None;
        }
        match update {
            StatusUpdate::Queued { position, .. } => {
                let position = (*position)?;
                if self.last_known_position == Some(position) {
                    return None;
                }
                self.last_known_position = Some(position);
                Some(WaitEvent::QueuePositionChanged(position))
            }
            StatusUpdate::Accepted { call_id, .. } => {
                self.state = WaitState::Accepted;
                Some(WaitEvent::CallAccepted(*call_id))
            }
            StatusUpdate::Missed { .. } => {
                self.state = WaitState::Missed;
                Some(WaitEvent::CallMissed(MissReason::Reported))
            }
        }
    }

    /// Cancels a running session. Returns `false` if it had already ended.
    pub fn stop(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.state = WaitState::Stopped;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_repeated_positions_are_reported_once() {
        let mut session = WaitSession::start(42);
        let events: Vec<_> = [5, 5, 2, 2, 5]
            .into_iter()
            .filter_map(|p| session.apply(&StatusUpdate::queued(p)))
            .collect();
        assert_eq!(
            events,
            vec![
                WaitEvent::QueuePositionChanged(5),
                WaitEvent::QueuePositionChanged(2),
                WaitEvent::QueuePositionChanged(5),
            ]
        );
        assert_eq!(session.last_known_position(), Some(5));
        assert!(session.is_running());
    }

    #[test]
    fn test_queued_without_position_keeps_running() {
        let mut session = WaitSession::start(1);
        let update = StatusUpdate::Queued {
            position: None,
            message: Some("hold on".into()),
        };
        assert_eq!(session.apply(&update), None);
        assert_eq!(session.last_known_position(), None);
        assert!(session.is_running());
    }

    #[test]
    fn test_accepted_is_terminal() {
        let mut session = WaitSession::start(7);
        assert_eq!(
            session.apply(&StatusUpdate::accepted(99)),
            Some(WaitEvent::CallAccepted(99))
        );
        assert_eq!(session.state(), WaitState::Accepted);
        assert!(session.state().is_terminal());

        // Nothing after a terminal outcome.
        assert_eq!(session.apply(&StatusUpdate::accepted(99)), None);
        assert_eq!(session.apply(&StatusUpdate::queued(1)), None);
        assert_eq!(session.advance(secs(400)), None);
        assert!(!session.stop());
    }

    #[test]
    fn test_reported_miss() {
        let mut session = WaitSession::start(7);
        assert_eq!(
            session.apply(&StatusUpdate::missed()),
            Some(WaitEvent::CallMissed(MissReason::Reported))
        );
        assert_eq!(session.state(), WaitState::Missed);
    }

    #[test]
    fn test_timeout_at_max_duration() {
        let mut session = WaitSession::start(7);
        assert_eq!(session.advance(secs(297)), None);
        assert_eq!(
            session.advance(MAX_WAIT_DURATION),
            Some(WaitEvent::CallMissed(MissReason::TimedOut))
        );
        assert_eq!(session.state(), WaitState::Missed);
    }

    #[test]
    fn test_elapsed_is_monotonic() {
        let mut session = WaitSession::start(7);
        session.advance(secs(30));
        session.advance(secs(10));
        assert_eq!(session.elapsed(), secs(30));
    }

    #[test]
    fn test_stop_ends_session() {
        let mut session = WaitSession::start(7);
        assert!(session.stop());
        assert_eq!(session.state(), WaitState::Stopped);
        assert!(!session.state().is_terminal());
        assert_eq!(session.apply(&StatusUpdate::queued(3)), None);
        assert!(!session.stop());
    }
}
